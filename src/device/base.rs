//! The runtime shared by every device variant: health tracking, the
//! inbound message callback table, and the encode-and-send path common
//! to UIO/ELoad/IfMux (§4.6, §4.8).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::avtp::{build_ntscf_frame, AcfCanBrief};
use crate::dbc::Codec;
use crate::error::CoreResult;
use crate::id;
use crate::metrics::Metrics;
use crate::registry::DeviceType;
use crate::transport::{EthernetPort, MacAddr};

/// Module auto-disable threshold from §4.6: a device that has not been
/// heard from in this long is considered dormant.
pub const AUTO_DISABLE_THRESHOLD: Duration = Duration::from_secs(4);

/// Per-device liveness bookkeeping, mirroring the source's `DeviceHealth`.
#[derive(Default)]
pub struct DeviceHealth {
    last_seen: Mutex<Option<Instant>>,
    message_count: std::sync::atomic::AtomicU64,
    error_count: std::sync::atomic::AtomicU64,
    active: std::sync::atomic::AtomicBool,
}

impl DeviceHealth {
    pub fn mark_seen(&self) {
        *self.last_seen.lock().unwrap() = Some(Instant::now());
        self.message_count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn mark_error(&self) {
        self.error_count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn is_alive(&self) -> bool {
        if !self.active.load(std::sync::atomic::Ordering::SeqCst) {
            return false;
        }
        match *self.last_seen.lock().unwrap() {
            Some(seen) => Instant::now().duration_since(seen) < AUTO_DISABLE_THRESHOLD,
            None => false,
        }
    }

    pub fn message_count(&self) -> u64 {
        self.message_count.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn error_count(&self) -> u64 {
        self.error_count.load(std::sync::atomic::Ordering::SeqCst)
    }
}

pub type MessageCallback = Arc<dyn Fn(&HashMap<String, f64>) + Send + Sync>;

/// State and machinery shared by every concrete device.
pub struct DeviceRuntime {
    pub mac: MacAddr,
    transport: Arc<dyn EthernetPort>,
    codec: Arc<Codec>,
    metrics: Arc<Metrics>,
    stream_id: u64,
    sequence: std::sync::atomic::AtomicU8,
    callbacks: RwLock<HashMap<u32, Vec<MessageCallback>>>,
    pub health: DeviceHealth,
}

impl DeviceRuntime {
    pub fn new(mac: MacAddr, transport: Arc<dyn EthernetPort>, codec: Arc<Codec>, metrics: Arc<Metrics>, stream_id: u64) -> Self {
        Self {
            mac,
            transport,
            codec,
            metrics,
            stream_id,
            sequence: std::sync::atomic::AtomicU8::new(0),
            callbacks: RwLock::new(HashMap::new()),
            health: DeviceHealth::default(),
        }
    }

    /// Encodes `signals` against `message_name` and sends it as a single
    /// ACF-CAN Brief frame. The wire id uses `source_addr`/`destination_addr`;
    /// the DBC lookup for encode is resolved by message name, not id, so
    /// PGN collisions between device types never surface here (DESIGN.md).
    pub fn send_can_message(
        &self,
        pgn: u32,
        message_name: &str,
        signals: &HashMap<String, f64>,
        source_addr: u8,
        destination_addr: u8,
        priority: u8,
    ) -> CoreResult<()> {
        let (_, data) = self.codec.encode(message_name, signals).map_err(|e| {
            debug!(pgn = format!("{pgn:#x}"), message = message_name, error = %e, "encode failed, dropping send");
            e
        })?;
        let can_id = id::build(pgn, source_addr, destination_addr, priority);
        let block = AcfCanBrief {
            bus_id: 0,
            can_id,
            data,
            extended: true,
            fdf: true,
            brs: false,
            esi: false,
            timestamp_valid: false,
        };
        let sequence = self.sequence.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let frame = build_ntscf_frame(MacAddr::BROADCAST, self.transport.local_mac(), self.stream_id, sequence, &[block]);
        self.transport.send(&frame)
    }

    pub fn register_message_callback(&self, pgn: u32, callback: MessageCallback) {
        self.callbacks.write().unwrap().entry(pgn).or_default().push(callback);
    }

    pub fn unregister_message_callbacks(&self, pgn: u32) {
        self.callbacks.write().unwrap().remove(&pgn);
    }

    /// Decodes one already-PGN-routed signal set and invokes any
    /// registered callbacks for it, outside of the callback-table lock.
    pub fn dispatch_callbacks(&self, pgn: u32, signals: &HashMap<String, f64>) {
        let listeners = { self.callbacks.read().unwrap().get(&pgn).cloned().unwrap_or_default() };
        for listener in listeners {
            listener(signals);
        }
    }

    pub fn decode(&self, can_id: u32, data: &[u8]) -> HashMap<String, f64> {
        let decoded = self.codec.decode(can_id, data);
        if decoded.is_empty() {
            self.metrics.mark_decode_drop();
        }
        decoded
    }
}

/// The behavior every device variant implements; the facade drives
/// devices purely through this trait.
pub trait Device: Send + Sync {
    fn mac(&self) -> MacAddr;
    fn device_type(&self) -> DeviceType;

    /// Registers this device's periodic tasks on the shared scheduler
    /// and marks it active. Called once by the facade at connect time.
    fn start(&self, scheduler: &crate::scheduler::Scheduler);

    /// Unregisters this device's periodic tasks and marks it inactive.
    fn stop(&self, scheduler: &crate::scheduler::Scheduler);

    fn is_alive(&self) -> bool;

    /// Feeds one already-validated ACF-CAN block addressed to this
    /// device's MAC into its dispatch table. `bus_id` is the physical
    /// CAN bus the block was tunneled on, needed by IfMux's raw-CAN
    /// passthrough. Decode/dispatch failures are absorbed here, never
    /// propagated (§4.6 failure semantics).
    fn on_can_block(&self, bus_id: u8, can_id: u32, data: &[u8]);
}

/// Catches a dispatch panic the way the source's callback map caught a
/// Python exception per-listener: logs, counts, and never aborts the
/// caller.
pub fn guard_dispatch(health: &DeviceHealth, f: impl FnOnce() + std::panic::UnwindSafe) {
    if std::panic::catch_unwind(f).is_err() {
        health.mark_error();
        warn!("a device message callback panicked; continuing");
    }
}
