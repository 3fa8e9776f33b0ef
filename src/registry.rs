//! Module registry: a mutable map keyed by source MAC, populated by
//! discovery and kept current by MODULE_INFO traffic, plus classification
//! of a registry entry's device type from its app name (§4.7).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::transport::MacAddr;

/// The module dormancy threshold from §4.6: a registry entry not heard
/// from within this long is considered inactive.
pub const DORMANCY_THRESHOLD: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    Uio,
    ELoad,
    IfMux,
    Unknown,
}

/// Classifies a device by its uppercased app name, matching substrings
/// in the fixed order the source's device manager uses.
pub fn classify(app_name: &str) -> DeviceType {
    let upper = app_name.to_uppercase();
    if upper.contains("UIO") {
        DeviceType::Uio
    } else if upper.contains("ELOAD") || upper.contains("LOAD") {
        DeviceType::ELoad
    } else if upper.contains("IFMUX") || upper.contains("MUX") {
        DeviceType::IfMux
    } else {
        DeviceType::Unknown
    }
}

/// One registry entry, built from MODULE_INFO / MODULE_INFO_EX.
#[derive(Debug, Clone, Default)]
pub struct ModuleInfo {
    pub mac: Option<MacAddr>,
    pub app_name: String,
    pub hw_name: String,
    pub version: String,
    pub build_date: String,
    pub crc: u32,
    pub ip_address: Option<[u8; 4]>,
    pub chip_uid: Option<(u64, u64)>,
    pub last_seen: Option<Instant>,
    pub message_count: u64,
    pub error_count: u64,
}

impl ModuleInfo {
    pub fn device_type(&self) -> DeviceType {
        classify(&self.app_name)
    }

    pub fn is_alive(&self, now: Instant) -> bool {
        match self.last_seen {
            Some(seen) => now.duration_since(seen) < DORMANCY_THRESHOLD,
            None => false,
        }
    }
}

/// The facade-owned registry: every module ever heard from, keyed by MAC.
#[derive(Default)]
pub struct Registry {
    entries: Mutex<HashMap<MacAddr, ModuleInfo>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or updates an entry, bumping `last_seen`/`message_count`.
    pub fn record(&self, mac: MacAddr, mut info: ModuleInfo) {
        let mut entries = self.entries.lock().unwrap();
        let message_count = entries.get(&mac).map(|e| e.message_count + 1).unwrap_or(1);
        info.mac = Some(mac);
        info.last_seen = Some(Instant::now());
        info.message_count = message_count;
        entries.insert(mac, info);
    }

    pub fn mark_error(&self, mac: MacAddr) {
        if let Some(entry) = self.entries.lock().unwrap().get_mut(&mac) {
            entry.error_count += 1;
        }
    }

    pub fn get(&self, mac: &MacAddr) -> Option<ModuleInfo> {
        self.entries.lock().unwrap().get(mac).cloned()
    }

    pub fn snapshot(&self) -> HashMap<MacAddr, ModuleInfo> {
        self.entries.lock().unwrap().clone()
    }

    pub fn is_alive(&self, mac: &MacAddr) -> bool {
        self.get(mac).map(|e| e.is_alive(Instant::now())).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_prefers_uio_over_generic_substrings() {
        assert_eq!(classify("UIO-App"), DeviceType::Uio);
        assert_eq!(classify("eload-v2"), DeviceType::ELoad);
        assert_eq!(classify("power-load-ctrl"), DeviceType::ELoad);
        assert_eq!(classify("ifmux-8ch"), DeviceType::IfMux);
        assert_eq!(classify("can-mux"), DeviceType::IfMux);
        assert_eq!(classify("bootloader"), DeviceType::Unknown);
    }

    #[test]
    fn fresh_entry_is_alive_stale_entry_is_not() {
        let registry = Registry::new();
        let mac = MacAddr([0; 6]);
        registry.record(mac, ModuleInfo { app_name: "UIO".into(), ..Default::default() });
        assert!(registry.is_alive(&mac));

        let mut entry = registry.get(&mac).unwrap();
        entry.last_seen = Some(Instant::now() - Duration::from_secs(20));
        assert!(!entry.is_alive(Instant::now()));
    }

    #[test]
    fn unknown_mac_is_not_alive() {
        let registry = Registry::new();
        assert!(!registry.is_alive(&MacAddr([9; 6])));
    }

    #[test]
    fn record_increments_message_count() {
        let registry = Registry::new();
        let mac = MacAddr([1; 6]);
        registry.record(mac, ModuleInfo { app_name: "UIO".into(), ..Default::default() });
        registry.record(mac, ModuleInfo { app_name: "UIO".into(), ..Default::default() });
        assert_eq!(registry.get(&mac).unwrap().message_count, 2);
    }
}
