//! The crate's single entry point (C8): owns the transport, codec,
//! scheduler, registry, and every connected device, and is the only
//! thing an embedder needs to hold onto.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{info, warn};

use crate::avtp::{iter_acf_blocks, parse_ntscf_frame};
use crate::config::SdrigConfig;
use crate::dbc::{self, Codec};
use crate::device::{Device, DeviceRuntime, ELoadDevice, IfMuxDevice, UioDevice};
use crate::discovery;
use crate::error::{CoreError, CoreResult};
use crate::metrics::Metrics;
use crate::registry::{ModuleInfo, Registry};
use crate::scheduler::Scheduler;
use crate::transport::{EthernetPort, MacAddr, RecvCallback};

/// Host-side control point for the module fleet. Construct one per
/// physical interface; `connect_*` opens a logical connection to one
/// module, `disconnect` tears it down, and the instance as a whole owns
/// the background receiver and scheduler threads for its lifetime.
///
/// Connected devices are tracked twice: once in a type-erased map used
/// for frame dispatch and lifecycle, and once per variant so `connect_*`
/// can hand callers back the concrete type they asked for instead of a
/// `dyn Device`.
pub struct Sdrig {
    config: SdrigConfig,
    transport: Arc<dyn EthernetPort>,
    codec: Arc<Codec>,
    metrics: Arc<Metrics>,
    registry: Arc<Registry>,
    scheduler: Arc<Scheduler>,
    dispatch: Mutex<HashMap<MacAddr, Arc<dyn Device>>>,
    uio: Mutex<HashMap<MacAddr, Arc<UioDevice>>>,
    eload: Mutex<HashMap<MacAddr, Arc<ELoadDevice>>>,
    ifmux: Mutex<HashMap<MacAddr, Arc<IfMuxDevice>>>,
    receiving: std::sync::atomic::AtomicBool,
}

impl Sdrig {
    /// Builds the engine from a validated config, an already-open
    /// transport, and the DBC catalog at `config.dbc_path`.
    pub fn new(config: SdrigConfig, transport: Arc<dyn EthernetPort>) -> CoreResult<Arc<Self>> {
        config.validate()?;
        let codec = Arc::new(dbc::load_codec(&config.dbc_path)?);
        let metrics = Arc::new(Metrics::new());
        let scheduler = Arc::new(Scheduler::new(Arc::clone(&metrics)));
        scheduler.start();

        let sdrig = Arc::new(Self {
            config,
            transport,
            codec,
            metrics,
            registry: Arc::new(Registry::new()),
            scheduler,
            dispatch: Mutex::new(HashMap::new()),
            uio: Mutex::new(HashMap::new()),
            eload: Mutex::new(HashMap::new()),
            ifmux: Mutex::new(HashMap::new()),
            receiving: std::sync::atomic::AtomicBool::new(false),
        });
        sdrig.start_receiving()?;
        Ok(sdrig)
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Runs discovery (C7) against the segment and returns every module
    /// heard back from, by MAC.
    pub fn discover(&self, timeout: Duration) -> HashMap<MacAddr, ModuleInfo> {
        discovery::discover(
            self.transport.as_ref(),
            &self.codec,
            &self.registry,
            &self.metrics,
            self.config.stream_id,
            timeout,
        )
    }

    fn new_runtime(&self, mac: MacAddr) -> Arc<DeviceRuntime> {
        Arc::new(DeviceRuntime::new(
            mac,
            Arc::clone(&self.transport),
            Arc::clone(&self.codec),
            Arc::clone(&self.metrics),
            self.config.stream_id,
        ))
    }

    /// Opens a logical UIO connection to `mac`. Idempotent: a second
    /// call for an already-connected MAC logs a warning and returns the
    /// existing device rather than replacing it.
    pub fn connect_uio(&self, mac: MacAddr) -> Arc<UioDevice> {
        let mut typed = self.uio.lock().unwrap();
        if let Some(existing) = typed.get(&mac) {
            warn!(mac = %mac, "connect_uio called for an already-connected device, reusing it");
            return Arc::clone(existing);
        }
        let device = UioDevice::new(self.new_runtime(mac));
        self.register(mac, Arc::clone(&device) as Arc<dyn Device>);
        typed.insert(mac, Arc::clone(&device));
        device
    }

    pub fn connect_eload(&self, mac: MacAddr) -> Arc<ELoadDevice> {
        let mut typed = self.eload.lock().unwrap();
        if let Some(existing) = typed.get(&mac) {
            warn!(mac = %mac, "connect_eload called for an already-connected device, reusing it");
            return Arc::clone(existing);
        }
        let device = ELoadDevice::new(self.new_runtime(mac));
        self.register(mac, Arc::clone(&device) as Arc<dyn Device>);
        typed.insert(mac, Arc::clone(&device));
        device
    }

    pub fn connect_ifmux(&self, mac: MacAddr) -> Arc<IfMuxDevice> {
        let mut typed = self.ifmux.lock().unwrap();
        if let Some(existing) = typed.get(&mac) {
            warn!(mac = %mac, "connect_ifmux called for an already-connected device, reusing it");
            return Arc::clone(existing);
        }
        let device = IfMuxDevice::new(self.new_runtime(mac), self.config.lin_enabled);
        self.register(mac, Arc::clone(&device) as Arc<dyn Device>);
        typed.insert(mac, Arc::clone(&device));
        device
    }

    /// Looks up an already-connected UIO device by MAC (§7).
    pub fn uio(&self, mac: MacAddr) -> CoreResult<Arc<UioDevice>> {
        self.uio.lock().unwrap().get(&mac).cloned().ok_or_else(|| CoreError::UnknownDevice(mac.to_string()))
    }

    /// Looks up an already-connected ELoad device by MAC (§7).
    pub fn eload(&self, mac: MacAddr) -> CoreResult<Arc<ELoadDevice>> {
        self.eload.lock().unwrap().get(&mac).cloned().ok_or_else(|| CoreError::UnknownDevice(mac.to_string()))
    }

    /// Looks up an already-connected IfMux device by MAC (§7).
    pub fn ifmux(&self, mac: MacAddr) -> CoreResult<Arc<IfMuxDevice>> {
        self.ifmux.lock().unwrap().get(&mac).cloned().ok_or_else(|| CoreError::UnknownDevice(mac.to_string()))
    }

    fn register(&self, mac: MacAddr, device: Arc<dyn Device>) {
        device.start(&self.scheduler);
        self.dispatch.lock().unwrap().insert(mac, device);
    }

    /// Closes a logical connection: unregisters its scheduler tasks and
    /// drops the engine's reference to it. A device with outstanding
    /// `Arc` clones held by the caller keeps working until those are
    /// dropped too; this only releases the facade's bookkeeping.
    pub fn disconnect(&self, mac: MacAddr) {
        let device = self.dispatch.lock().unwrap().remove(&mac);
        self.uio.lock().unwrap().remove(&mac);
        self.eload.lock().unwrap().remove(&mac);
        self.ifmux.lock().unwrap().remove(&mac);
        if let Some(device) = device {
            device.stop(&self.scheduler);
        }
    }

    /// Disconnects every connected device, in MAC order for determinism.
    pub fn disconnect_all(&self) {
        let macs: Vec<MacAddr> = {
            let mut macs: Vec<MacAddr> = self.dispatch.lock().unwrap().keys().copied().collect();
            macs.sort();
            macs
        };
        for mac in macs {
            self.disconnect(mac);
        }
    }

    fn start_receiving(self: &Arc<Self>) -> CoreResult<()> {
        let this = Arc::clone(self);
        let callback: RecvCallback = Arc::new(move |frame: &[u8]| this.on_frame(frame));
        self.transport.start_receiving(true, callback)?;
        self.receiving.store(true, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }

    /// Demultiplexes one inbound frame to the connected device whose MAC
    /// matches its source address, feeding each ACF-CAN block in turn.
    /// A frame or block addressed to no connected device is silently
    /// dropped, matching §4.6's absorb-don't-propagate failure model.
    fn on_frame(&self, frame: &[u8]) {
        let Some(parsed) = parse_ntscf_frame(frame, &self.metrics) else { return };
        let device = self.dispatch.lock().unwrap().get(&parsed.src_mac).cloned();
        let Some(device) = device else { return };
        for block in iter_acf_blocks(parsed.acf_payload, &self.metrics) {
            device.on_can_block(block.bus_id, block.can_id, &block.data);
        }
    }
}

impl Drop for Sdrig {
    fn drop(&mut self) {
        if self.receiving.swap(false, std::sync::atomic::Ordering::SeqCst) {
            self.transport.stop_receiving();
        }
        self.disconnect_all();
        self.scheduler.stop();
        info!("sdrig engine shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct NullPort {
        sent: StdMutex<Vec<Vec<u8>>>,
        local: MacAddr,
    }

    impl EthernetPort for NullPort {
        fn send(&self, frame: &[u8]) -> CoreResult<()> {
            self.sent.lock().unwrap().push(frame.to_vec());
            Ok(())
        }
        fn local_mac(&self) -> MacAddr {
            self.local
        }
        fn start_receiving(&self, _filter: bool, _cb: RecvCallback) -> CoreResult<()> {
            Ok(())
        }
        fn stop_receiving(&self) {}
    }

    /// An empty catalog is enough here: these tests exercise connection
    /// bookkeeping, not encode/decode, and the scheduler's periodic
    /// tasks run on multi-second periods that never fire within a test.
    fn sample_dbc_path() -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("sdrig-facade-test-{:?}.dbc", std::thread::current().id()));
        std::fs::write(&path, "").unwrap();
        path
    }

    fn test_config(dbc_path: std::path::PathBuf) -> SdrigConfig {
        SdrigConfig::default()
            .with_iface("eth0")
            .with_stream_id(0x1234)
            .with_dbc_path(dbc_path)
    }

    #[test]
    fn connect_uio_twice_reuses_the_same_device() {
        let path = sample_dbc_path();
        let transport: Arc<dyn EthernetPort> =
            Arc::new(NullPort { sent: StdMutex::new(Vec::new()), local: MacAddr([0; 6]) });
        let sdrig = Sdrig::new(test_config(path), transport).unwrap();

        let mac = MacAddr([1, 2, 3, 4, 5, 6]);
        let first = sdrig.connect_uio(mac);
        let second = sdrig.connect_uio(mac);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn disconnect_removes_the_device_from_dispatch() {
        let path = sample_dbc_path();
        let transport: Arc<dyn EthernetPort> =
            Arc::new(NullPort { sent: StdMutex::new(Vec::new()), local: MacAddr([0; 6]) });
        let sdrig = Sdrig::new(test_config(path), transport).unwrap();

        let mac = MacAddr([9, 9, 9, 9, 9, 9]);
        sdrig.connect_eload(mac);
        assert!(sdrig.dispatch.lock().unwrap().contains_key(&mac));
        sdrig.disconnect(mac);
        assert!(!sdrig.dispatch.lock().unwrap().contains_key(&mac));
    }

    #[test]
    fn lookup_by_mac_finds_connected_devices_and_rejects_unknown_ones() {
        let path = sample_dbc_path();
        let transport: Arc<dyn EthernetPort> =
            Arc::new(NullPort { sent: StdMutex::new(Vec::new()), local: MacAddr([0; 6]) });
        let sdrig = Sdrig::new(test_config(path), transport).unwrap();

        let uio_mac = MacAddr([1, 1, 1, 1, 1, 1]);
        let connected = sdrig.connect_uio(uio_mac);
        let looked_up = sdrig.uio(uio_mac).unwrap();
        assert!(Arc::ptr_eq(&connected, &looked_up));

        let unknown = MacAddr([0xFF; 6]);
        assert!(matches!(sdrig.uio(unknown), Err(CoreError::UnknownDevice(_))));
        assert!(matches!(sdrig.eload(unknown), Err(CoreError::UnknownDevice(_))));
        assert!(matches!(sdrig.ifmux(unknown), Err(CoreError::UnknownDevice(_))));
    }
}
