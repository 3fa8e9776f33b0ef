//! IfMux: eight-channel CAN/LIN interface multiplexer (§3 "IfMux
//! shadow", §4.6).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use tracing::info;

use crate::device::base::{guard_dispatch, Device, DeviceRuntime};
use crate::error::{CoreError, CoreResult};
use crate::pgn;
use crate::registry::DeviceType;
use crate::scheduler::Scheduler;
use crate::transport::MacAddr;

pub const CHANNEL_COUNT: usize = 8;
pub const LIN_FRAME_COUNT: usize = 62;

const MODULE_INFO_HEARTBEAT_PERIOD_MS: u64 = 9_000;
const PARAMETER_SNAPSHOT_PERIOD_MS: u64 = 3_000;

/// The four non-system PGNs an IfMux channel answers inbound itself;
/// everything else is forwarded to the raw-CAN callback (§4.6 item 6).
fn is_system_pgn(pgn_value: u32) -> bool {
    pgn_value == pgn::MODULE_INFO_ANS
        || pgn_value == pgn::MODULE_INFO_EX
        || pgn_value == pgn::CAN_INFO_ANS
        || pgn_value == pgn::CAN_STATE_ANS
        || pgn_value == pgn::CAN_MUX_ANS
        || pgn_value == pgn::LIN_FRAME_RCVD_ANS
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CanChannelState {
    pub classic_speed: u8,
    pub fd_speed: u8,
    pub controller_state: u8,
    pub lec: u8,
    pub tx_count: u32,
    pub rx_count: u32,
    pub error_count: u32,
    pub internal_relay: bool,
    pub external_relay_mask: u8,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LinFrameDescriptor {
    pub enable: bool,
    pub direction_transmit: bool,
    pub checksum_classic: bool,
    pub length: u8,
}

#[derive(Debug, Clone, Default)]
struct IfMuxShadow {
    channels: [CanChannelState; CHANNEL_COUNT],
    classic_speed_set: [u8; CHANNEL_COUNT],
    fd_speed_set: [u8; CHANNEL_COUNT],
    internal_relay_set: [bool; CHANNEL_COUNT],
    external_relay_set: [u8; CHANNEL_COUNT],
    lin_enabled: bool,
    lin_frames: Vec<LinFrameDescriptor>,
}

impl IfMuxShadow {
    fn new(lin_enabled: bool) -> Self {
        Self { lin_enabled, lin_frames: vec![LinFrameDescriptor::default(); LIN_FRAME_COUNT], ..Default::default() }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct LastSent {
    classic_speed: [u8; CHANNEL_COUNT],
    fd_speed: [u8; CHANNEL_COUNT],
    internal_relay: [bool; CHANNEL_COUNT],
    external_relay: [u8; CHANNEL_COUNT],
    lin_frame: Vec<LinFrameDescriptor>,
}

impl PartialEq for LinFrameDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.enable == other.enable
            && self.direction_transmit == other.direction_transmit
            && self.checksum_classic == other.checksum_classic
            && self.length == other.length
    }
}

pub type RawCanCallback = Arc<dyn Fn(u8, u32, &[u8]) + Send + Sync>;

pub struct IfMuxDevice {
    runtime: Arc<DeviceRuntime>,
    shadow: Mutex<IfMuxShadow>,
    last_sent: Mutex<LastSent>,
    raw_can_callback: RwLock<Option<RawCanCallback>>,
    self_ref: std::sync::Weak<IfMuxDevice>,
}

impl IfMuxDevice {
    pub fn new(runtime: Arc<DeviceRuntime>, lin_enabled: bool) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            runtime,
            shadow: Mutex::new(IfMuxShadow::new(lin_enabled)),
            last_sent: Mutex::new(LastSent { lin_frame: vec![LinFrameDescriptor::default(); LIN_FRAME_COUNT], ..Default::default() }),
            raw_can_callback: RwLock::new(None),
            self_ref: weak.clone(),
        })
    }

    /// Registers the callback that receives every inbound CAN block
    /// whose PGN is not one of this device's own system messages.
    pub fn on_raw_can<F>(&self, callback: F)
    where
        F: Fn(u8, u32, &[u8]) + Send + Sync + 'static,
    {
        *self.raw_can_callback.write().unwrap() = Some(Arc::new(callback));
    }

    fn check_channel(channel: usize) -> CoreResult<()> {
        if channel >= CHANNEL_COUNT {
            return Err(CoreError::OutOfRange(format!("channel {channel} out of range 0..{CHANNEL_COUNT}")));
        }
        Ok(())
    }

    pub fn set_speed(&self, channel: usize, classic_speed: u8, fd_speed: u8) -> CoreResult<()> {
        Self::check_channel(channel)?;
        if classic_speed > 3 {
            return Err(CoreError::OutOfRange(format!("classic speed code {classic_speed} outside 0..=3")));
        }
        if fd_speed > 5 {
            return Err(CoreError::OutOfRange(format!("fd speed code {fd_speed} outside 0..=5")));
        }
        {
            let mut shadow = self.shadow.lock().unwrap();
            shadow.classic_speed_set[channel] = classic_speed;
            shadow.fd_speed_set[channel] = fd_speed;
        }
        self.send_changed()
    }

    pub fn set_internal_relay(&self, channel: usize, closed: bool) -> CoreResult<()> {
        Self::check_channel(channel)?;
        self.shadow.lock().unwrap().internal_relay_set[channel] = closed;
        self.send_changed()
    }

    pub fn set_external_relay_mask(&self, channel: usize, mask: u8) -> CoreResult<()> {
        Self::check_channel(channel)?;
        self.shadow.lock().unwrap().external_relay_set[channel] = mask;
        self.send_changed()
    }

    pub fn get_state(&self, channel: usize) -> CoreResult<CanChannelState> {
        Self::check_channel(channel)?;
        Ok(self.shadow.lock().unwrap().channels[channel])
    }

    pub fn set_lin_frame(&self, index: usize, descriptor: LinFrameDescriptor) -> CoreResult<()> {
        if index >= LIN_FRAME_COUNT {
            return Err(CoreError::OutOfRange(format!("lin frame index {index} out of range 0..{LIN_FRAME_COUNT}")));
        }
        {
            let mut shadow = self.shadow.lock().unwrap();
            if !shadow.lin_enabled {
                return Err(CoreError::Config("LIN is not enabled on this connection".to_string()));
            }
            shadow.lin_frames[index] = descriptor;
        }
        self.send_changed()
    }

    /// Sends a one-shot LIN frame payload; unlike the other setters this
    /// is not part of the shadow/change-detection machinery since it is
    /// an explicit transmit action, not a persistent parameter.
    pub fn send_lin_frame(&self, index: usize, data: &[u8]) -> CoreResult<()> {
        if index >= LIN_FRAME_COUNT {
            return Err(CoreError::OutOfRange(format!("lin frame index {index} out of range 0..{LIN_FRAME_COUNT}")));
        }
        if !self.shadow.lock().unwrap().lin_enabled {
            return Err(CoreError::Config("LIN is not enabled on this connection".to_string()));
        }
        let mut signals = HashMap::new();
        signals.insert("lin_frame_id".to_string(), index as f64);
        for (i, byte) in data.iter().enumerate().take(8) {
            signals.insert(format!("lin_frame_data{i}"), *byte as f64);
        }
        self.runtime.send_can_message(pgn::LIN_FRAME_SET_REQ, "LIN_FRAME_SET_REQ", &signals, 0x00, 0xFF, 3)
    }

    fn send_changed(&self) -> CoreResult<()> {
        let (classic_speed, fd_speed, internal_relay, external_relay, lin_frames, lin_enabled) = {
            let shadow = self.shadow.lock().unwrap();
            (
                shadow.classic_speed_set,
                shadow.fd_speed_set,
                shadow.internal_relay_set,
                shadow.external_relay_set,
                shadow.lin_frames.clone(),
                shadow.lin_enabled,
            )
        };

        let mut last = self.last_sent.lock().unwrap();
        if classic_speed != last.classic_speed || fd_speed != last.fd_speed {
            self.send_can_info_req(&classic_speed, &fd_speed)?;
            last.classic_speed = classic_speed;
            last.fd_speed = fd_speed;
        }
        if internal_relay != last.internal_relay || external_relay != last.external_relay {
            self.send_can_mux_req(&internal_relay, &external_relay)?;
            last.internal_relay = internal_relay;
            last.external_relay = external_relay;
        }
        if lin_enabled && lin_frames != last.lin_frame {
            self.send_lin_cfg_req(&lin_frames)?;
            last.lin_frame = lin_frames;
        }
        Ok(())
    }

    fn send_can_info_req(&self, classic_speed: &[u8; CHANNEL_COUNT], fd_speed: &[u8; CHANNEL_COUNT]) -> CoreResult<()> {
        let mut signals = HashMap::new();
        for channel in 0..CHANNEL_COUNT {
            signals.insert(pgn::can_speed_signal(channel as u8 + 1, false), classic_speed[channel] as f64);
            signals.insert(pgn::can_speed_signal(channel as u8 + 1, true), fd_speed[channel] as f64);
        }
        self.runtime.send_can_message(pgn::CAN_INFO_REQ, "CAN_INFO_REQ", &signals, 0x00, 0xFF, 3)
    }

    fn send_can_mux_req(&self, internal_relay: &[bool; CHANNEL_COUNT], external_relay: &[u8; CHANNEL_COUNT]) -> CoreResult<()> {
        let mut signals = HashMap::new();
        for channel in 0..CHANNEL_COUNT {
            signals.insert(pgn::can_mux_internal_signal(channel as u8 + 1), internal_relay[channel] as u8 as f64);
            signals.insert(pgn::can_mux_external_signal(channel as u8 + 1), external_relay[channel] as f64);
        }
        self.runtime.send_can_message(pgn::CAN_MUX_REQ, "CAN_MUX_REQ", &signals, 0x00, 0xFF, 3)
    }

    fn send_lin_cfg_req(&self, frames: &[LinFrameDescriptor]) -> CoreResult<()> {
        let mut signals = HashMap::new();
        for (index, frame) in frames.iter().enumerate() {
            signals.insert(pgn::lin_cfg_signal(index as u8, "enable"), frame.enable as u8 as f64);
            signals.insert(pgn::lin_cfg_signal(index as u8, "dir_transmit"), frame.direction_transmit as u8 as f64);
            signals.insert(pgn::lin_cfg_signal(index as u8, "cst_classic"), frame.checksum_classic as u8 as f64);
            signals.insert(pgn::lin_cfg_signal(index as u8, "len"), frame.length as f64);
        }
        self.runtime.send_can_message(pgn::LIN_CFG_REQ, "LIN_CFG_REQ", &signals, 0x00, 0xFF, 3)
    }

    fn send_all_parameters(&self) -> CoreResult<()> {
        let (classic_speed, fd_speed, internal_relay, external_relay, lin_frames, lin_enabled) = {
            let shadow = self.shadow.lock().unwrap();
            (
                shadow.classic_speed_set,
                shadow.fd_speed_set,
                shadow.internal_relay_set,
                shadow.external_relay_set,
                shadow.lin_frames.clone(),
                shadow.lin_enabled,
            )
        };
        self.send_can_info_req(&classic_speed, &fd_speed)?;
        self.send_can_mux_req(&internal_relay, &external_relay)?;
        if lin_enabled {
            self.send_lin_cfg_req(&lin_frames)?;
        }
        Ok(())
    }

    fn request_module_info(&self) -> CoreResult<()> {
        self.runtime.send_can_message(pgn::MODULE_INFO_REQ, "MODULE_INFO_REQ", &HashMap::new(), 0x00, 0xFF, 3)
    }

    fn handle_decoded(&self, channel_hint: u8, pgn_value: u32, signals: &HashMap<String, f64>) {
        if pgn_value != pgn::CAN_STATE_ANS {
            return;
        }
        let channel = channel_hint as usize;
        if channel >= CHANNEL_COUNT {
            return;
        }
        let mut shadow = self.shadow.lock().unwrap();
        let ch = &mut shadow.channels[channel];
        let field = |key: &str| signals.get(key).copied().unwrap_or(0.0);
        ch.controller_state = field("controller_state") as u8;
        ch.lec = field("lec") as u8;
        ch.tx_count = field("tx_count") as u32;
        ch.rx_count = field("rx_count") as u32;
        ch.error_count = field("error_count") as u32;
    }
}

impl Device for IfMuxDevice {
    fn mac(&self) -> MacAddr {
        self.runtime.mac
    }

    fn device_type(&self) -> DeviceType {
        DeviceType::IfMux
    }

    fn start(&self, scheduler: &Scheduler) {
        let mac = self.runtime.mac.to_string();
        info!(mac = %mac, "starting IfMux periodic tasks");
        self.runtime.health.set_active(true);

        let this = self.self_ref.upgrade().expect("device outlives its own start() call");
        scheduler.add_task_ms(
            &format!("{mac}/module_info"),
            MODULE_INFO_HEARTBEAT_PERIOD_MS,
            Box::new(move || this.request_module_info().map_err(|e| e.to_string())),
        );
        let this = self.self_ref.upgrade().expect("device outlives its own start() call");
        scheduler.add_task_ms(
            &format!("{mac}/parameters"),
            PARAMETER_SNAPSHOT_PERIOD_MS,
            Box::new(move || this.send_all_parameters().map_err(|e| e.to_string())),
        );
    }

    fn stop(&self, scheduler: &Scheduler) {
        let mac = self.runtime.mac.to_string();
        scheduler.remove_task(&format!("{mac}/module_info"));
        scheduler.remove_task(&format!("{mac}/parameters"));
        self.runtime.health.set_active(false);
    }

    fn is_alive(&self) -> bool {
        self.runtime.health.is_alive()
    }

    fn on_can_block(&self, bus_id: u8, can_id: u32, data: &[u8]) {
        let pgn_value = crate::id::extract_pgn(can_id);
        if !is_system_pgn(pgn_value) {
            let listener = self.raw_can_callback.read().unwrap().clone();
            if let Some(listener) = listener {
                guard_dispatch(&self.runtime.health, std::panic::AssertUnwindSafe(|| listener(bus_id, can_id, data)));
            }
            return;
        }
        let signals = self.runtime.decode(can_id, data);
        if signals.is_empty() {
            return;
        }
        guard_dispatch(&self.runtime.health, std::panic::AssertUnwindSafe(|| {
            self.handle_decoded(bus_id, pgn_value, &signals);
            self.runtime.dispatch_callbacks(pgn_value, &signals);
        }));
    }
}
