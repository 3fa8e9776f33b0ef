//! ELoad: eight-channel electronic load / power source (§3 "ELoad
//! shadow", §4.6).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::device::base::{guard_dispatch, Device, DeviceRuntime};
use crate::device::shadow::{FeatureState, ValuePair};
use crate::error::{CoreError, CoreResult};
use crate::pgn;
use crate::registry::DeviceType;
use crate::scheduler::Scheduler;
use crate::transport::MacAddr;

pub const CHANNEL_COUNT: usize = 8;
pub const DOUT_COUNT: usize = 4;

/// Advisory per-channel and aggregate power limits (§3). The core never
/// enforces these; callers who care must check `power()` themselves.
pub const PER_CHANNEL_LIMIT_WATTS: f64 = 200.0;
pub const AGGREGATE_LIMIT_WATTS: f64 = 600.0;

const MODULE_INFO_HEARTBEAT_PERIOD_MS: u64 = 9_000;
const PARAMETER_SNAPSHOT_PERIOD_MS: u64 = 3_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    GetVoltage,
    SetVoltage,
    GetCurrent,
    SetCurrent,
}

impl Feature {
    const ALL: [Feature; 4] = [Feature::GetVoltage, Feature::SetVoltage, Feature::GetCurrent, Feature::SetCurrent];

    fn prefix(self) -> &'static str {
        match self {
            Feature::GetVoltage => "vlt_i",
            Feature::SetVoltage => "vlt_o",
            Feature::GetCurrent => "cur_i",
            Feature::SetCurrent => "cur_o",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChannelState {
    features: [FeatureState; 4],
    pub voltage: ValuePair,
    pub current: ValuePair,
    pub temperature: f64,
}

impl ChannelState {
    pub fn power(&self) -> f64 {
        self.voltage.measured * self.current.measured
    }

    fn feature(&self, f: Feature) -> FeatureState {
        self.features[f as usize]
    }
}

#[derive(Debug, Clone, Default)]
struct ELoadShadow {
    channels: [ChannelState; CHANNEL_COUNT],
    douts: [bool; DOUT_COUNT],
}

#[derive(Debug, Clone, Default, PartialEq)]
struct LastSent {
    op_modes: [[FeatureState; 4]; CHANNEL_COUNT],
    voltages_out: [f64; CHANNEL_COUNT],
    currents_out: [f64; CHANNEL_COUNT],
    douts: [bool; DOUT_COUNT],
}

pub struct ELoadDevice {
    runtime: Arc<DeviceRuntime>,
    shadow: Mutex<ELoadShadow>,
    last_sent: Mutex<LastSent>,
    self_ref: std::sync::Weak<ELoadDevice>,
}

impl ELoadDevice {
    pub fn new(runtime: Arc<DeviceRuntime>) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            runtime,
            shadow: Mutex::new(ELoadShadow::default()),
            last_sent: Mutex::new(LastSent::default()),
            self_ref: weak.clone(),
        })
    }

    fn check_channel(channel: usize) -> CoreResult<()> {
        if channel >= CHANNEL_COUNT {
            return Err(CoreError::OutOfRange(format!("channel {channel} out of range 0..{CHANNEL_COUNT}")));
        }
        Ok(())
    }

    /// Enters current-sink mode: forces the voltage-source feature off
    /// and zeroes its set-value, the mutual-exclusion rule from §3/§4.6.
    pub fn set_current(&self, channel: usize, milliamps: f64) -> CoreResult<()> {
        Self::check_channel(channel)?;
        if !(0.0..=10_000.0).contains(&milliamps) {
            return Err(CoreError::OutOfRange(format!("current {milliamps} outside 0..=10000 mA")));
        }
        {
            let mut shadow = self.shadow.lock().unwrap();
            let ch = &mut shadow.channels[channel];
            ch.features[Feature::SetVoltage as usize] = FeatureState::Disabled;
            ch.voltage.set = 0.0;
            ch.features[Feature::SetCurrent as usize] = FeatureState::Operate;
            ch.features[Feature::GetCurrent as usize] = FeatureState::Operate;
            ch.current.set = milliamps;
        }
        self.send_changed()
    }

    /// Enters voltage-source mode: forces the current-sink feature off
    /// and zeroes its set-value.
    pub fn set_voltage(&self, channel: usize, volts: f64) -> CoreResult<()> {
        Self::check_channel(channel)?;
        if !(0.0..=24.0).contains(&volts) {
            return Err(CoreError::OutOfRange(format!("voltage {volts} outside 0..=24.0")));
        }
        {
            let mut shadow = self.shadow.lock().unwrap();
            let ch = &mut shadow.channels[channel];
            ch.features[Feature::SetCurrent as usize] = FeatureState::Disabled;
            ch.current.set = 0.0;
            ch.features[Feature::SetVoltage as usize] = FeatureState::Operate;
            ch.features[Feature::GetVoltage as usize] = FeatureState::Operate;
            ch.voltage.set = volts;
        }
        self.send_changed()
    }

    pub fn get_voltage(&self, channel: usize) -> CoreResult<f64> {
        Self::check_channel(channel)?;
        Ok(self.shadow.lock().unwrap().channels[channel].voltage.measured)
    }

    pub fn get_current(&self, channel: usize) -> CoreResult<f64> {
        Self::check_channel(channel)?;
        Ok(self.shadow.lock().unwrap().channels[channel].current.measured)
    }

    pub fn get_temperature(&self, channel: usize) -> CoreResult<f64> {
        Self::check_channel(channel)?;
        Ok(self.shadow.lock().unwrap().channels[channel].temperature)
    }

    pub fn get_power(&self, channel: usize) -> CoreResult<f64> {
        Self::check_channel(channel)?;
        let power = self.shadow.lock().unwrap().channels[channel].power();
        if power > PER_CHANNEL_LIMIT_WATTS {
            warn!(channel, power, limit = PER_CHANNEL_LIMIT_WATTS, "channel power above advisory limit");
        }
        Ok(power)
    }

    pub fn get_feature_state(&self, channel: usize, feature: Feature) -> CoreResult<FeatureState> {
        Self::check_channel(channel)?;
        Ok(self.shadow.lock().unwrap().channels[channel].feature(feature))
    }

    pub fn set_dout(&self, index: usize, enabled: bool) -> CoreResult<()> {
        if index >= DOUT_COUNT {
            return Err(CoreError::OutOfRange(format!("dout {index} out of range 0..{DOUT_COUNT}")));
        }
        self.shadow.lock().unwrap().douts[index] = enabled;
        self.send_changed()
    }

    fn send_changed(&self) -> CoreResult<()> {
        let (op_modes, voltages_out, currents_out, douts) = {
            let shadow = self.shadow.lock().unwrap();
            let mut op_modes = [[FeatureState::Unknown; 4]; CHANNEL_COUNT];
            let mut voltages_out = [0.0; CHANNEL_COUNT];
            let mut currents_out = [0.0; CHANNEL_COUNT];
            for (i, ch) in shadow.channels.iter().enumerate() {
                op_modes[i] = ch.features;
                voltages_out[i] = ch.voltage.set;
                currents_out[i] = ch.current.set;
            }
            (op_modes, voltages_out, currents_out, shadow.douts)
        };

        let mut last = self.last_sent.lock().unwrap();
        if op_modes != last.op_modes {
            self.send_op_mode_req(&op_modes)?;
            last.op_modes = op_modes;
        }
        if voltages_out != last.voltages_out {
            self.send_voltage_out_req(&voltages_out)?;
            last.voltages_out = voltages_out;
        }
        if currents_out != last.currents_out {
            self.send_current_out_req(&currents_out)?;
            last.currents_out = currents_out;
        }
        if douts != last.douts {
            self.send_dout_req(&douts)?;
            last.douts = douts;
        }
        Ok(())
    }

    fn send_op_mode_req(&self, op_modes: &[[FeatureState; 4]; CHANNEL_COUNT]) -> CoreResult<()> {
        let mut signals = HashMap::new();
        for prefix in pgn::OP_MODE_PREFIXES {
            for channel in 0..CHANNEL_COUNT {
                signals.insert(pgn::op_mode_signal(prefix, channel as u8 + 1), FeatureState::Disabled.wire_value() as f64);
            }
        }
        for (channel, features) in op_modes.iter().enumerate() {
            for feature in Feature::ALL {
                let value = features[feature as usize];
                signals.insert(pgn::op_mode_signal(feature.prefix(), channel as u8 + 1), value.wire_value() as f64);
            }
        }
        self.runtime.send_can_message(pgn::OP_MODE_REQ, "OP_MODE_REQ", &signals, 0x00, 0xFF, 3)
    }

    fn send_voltage_out_req(&self, voltages_out: &[f64; CHANNEL_COUNT]) -> CoreResult<()> {
        let mut signals = HashMap::new();
        for (channel, v) in voltages_out.iter().enumerate() {
            signals.insert(pgn::voltage_out_signal(channel as u8 + 1), *v);
        }
        self.runtime.send_can_message(pgn::VOLTAGE_ELM_OUT_REQ, "VOLTAGE_ELM_OUT_VAL_REQ", &signals, 0x00, 0xFF, 3)
    }

    fn send_current_out_req(&self, currents_out: &[f64; CHANNEL_COUNT]) -> CoreResult<()> {
        let mut signals = HashMap::new();
        for (channel, c) in currents_out.iter().enumerate() {
            signals.insert(pgn::current_elm_signal(channel as u8 + 1), *c);
        }
        self.runtime.send_can_message(pgn::CUR_ELM_OUT_REQ, "CUR_ELM_OUT_VAL_REQ", &signals, 0x00, 0xFF, 3)
    }

    fn send_dout_req(&self, douts: &[bool; DOUT_COUNT]) -> CoreResult<()> {
        let mut signals = HashMap::new();
        for (index, enabled) in douts.iter().enumerate() {
            signals.insert(pgn::dout_elm_enable_signal(index as u8 + 1), *enabled as u8 as f64);
        }
        self.runtime.send_can_message(pgn::SWITCH_ELM_DOUT_REQ, "SWITCH_ELM_DOUT_REQ", &signals, 0x00, 0xFF, 3)
    }

    fn send_all_parameters(&self) -> CoreResult<()> {
        let (op_modes, voltages_out, currents_out, douts) = {
            let shadow = self.shadow.lock().unwrap();
            let mut op_modes = [[FeatureState::Unknown; 4]; CHANNEL_COUNT];
            let mut voltages_out = [0.0; CHANNEL_COUNT];
            let mut currents_out = [0.0; CHANNEL_COUNT];
            for (i, ch) in shadow.channels.iter().enumerate() {
                op_modes[i] = ch.features;
                voltages_out[i] = ch.voltage.set;
                currents_out[i] = ch.current.set;
            }
            (op_modes, voltages_out, currents_out, shadow.douts)
        };
        self.send_op_mode_req(&op_modes)?;
        self.send_voltage_out_req(&voltages_out)?;
        self.send_current_out_req(&currents_out)?;
        self.send_dout_req(&douts)?;
        Ok(())
    }

    fn request_module_info(&self) -> CoreResult<()> {
        self.runtime.send_can_message(pgn::MODULE_INFO_REQ, "MODULE_INFO_REQ", &HashMap::new(), 0x00, 0xFF, 3)
    }

    fn handle_decoded(&self, pgn_value: u32, signals: &HashMap<String, f64>) {
        let mut shadow = self.shadow.lock().unwrap();
        match pgn_value {
            p if p == pgn::VOLTAGE_IN_ANS => {
                for channel in 0..CHANNEL_COUNT {
                    if let Some(v) = signals.get(&pgn::voltage_out_signal(channel as u8 + 1)) {
                        shadow.channels[channel].voltage.measured = *v;
                    }
                }
            }
            p if p == pgn::CUR_ELM_IN_ANS => {
                for channel in 0..CHANNEL_COUNT {
                    if let Some(v) = signals.get(&pgn::current_elm_signal(channel as u8 + 1)) {
                        shadow.channels[channel].current.measured = *v;
                    }
                }
            }
            p if p == pgn::TEMP_ELM_IN_ANS => {
                for channel in 0..CHANNEL_COUNT {
                    if let Some(v) = signals.get(&pgn::temp_elm_signal(channel as u8 + 1)) {
                        shadow.channels[channel].temperature = *v;
                    }
                }
            }
            _ => {}
        }
    }
}

impl Device for ELoadDevice {
    fn mac(&self) -> MacAddr {
        self.runtime.mac
    }

    fn device_type(&self) -> DeviceType {
        DeviceType::ELoad
    }

    fn start(&self, scheduler: &Scheduler) {
        let mac = self.runtime.mac.to_string();
        info!(mac = %mac, "starting ELoad periodic tasks");
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

    fn on_can_block(&self, _bus_id: u8, can_id: u32, data: &[u8]) {
        let pgn_value = crate::id::extract_pgn(can_id);
        let signals = self.runtime.decode(can_id, data);
        if signals.is_empty() {
            return;
        }
        guard_dispatch(&self.runtime.health, std::panic::AssertUnwindSafe(|| {
            self.handle_decoded(pgn_value, &signals);
            self.runtime.dispatch_callbacks(pgn_value, &signals);
        }));
    }
}
