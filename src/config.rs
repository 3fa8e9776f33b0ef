//! Runtime configuration (§6): the interface, stream id, and DBC catalog
//! path a [`crate::facade::Sdrig`] needs to start, loaded from TOML or
//! built programmatically.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Top-level settings recognized by the engine (§6 Configuration).
///
/// `iface`, `stream_id`, and `dbc_path` have no sensible default and are
/// left blank/zero here; [`SdrigConfig::validate`] is what actually
/// enforces they were set before the facade uses them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SdrigConfig {
    /// Network interface to open the raw AVTP socket on, e.g. `"eth0"`.
    pub iface: String,

    /// AVTP stream id this connection filters inbound frames on.
    pub stream_id: u64,

    /// Path to the DBC catalog describing every message this engine speaks.
    pub dbc_path: PathBuf,

    /// Whether LIN frame configuration/forwarding is enabled for IfMux
    /// connections opened under this configuration.
    pub lin_enabled: bool,

    /// Enables verbose diagnostic logging (mapped to a `tracing`
    /// `EnvFilter` directive by the caller, not interpreted here).
    pub debug: bool,
}

impl Default for SdrigConfig {
    fn default() -> Self {
        Self {
            iface: String::new(),
            stream_id: 0,
            dbc_path: PathBuf::new(),
            lin_enabled: false,
            debug: false,
        }
    }
}

impl SdrigConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("reading {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(content: &str) -> CoreResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| CoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the options with no usable default were actually
    /// supplied (§6: `iface`, `stream_id`, `dbc_path` are required for
    /// operation).
    pub fn validate(&self) -> CoreResult<()> {
        if self.iface.is_empty() {
            return Err(CoreError::Config("iface is required".to_string()));
        }
        if self.dbc_path.as_os_str().is_empty() {
            return Err(CoreError::Config("dbc_path is required".to_string()));
        }
        if self.stream_id == 0 {
            return Err(CoreError::Config("stream_id must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Builder-style override, for callers constructing a config
    /// programmatically instead of from a file.
    pub fn with_iface(mut self, iface: impl Into<String>) -> Self {
        self.iface = iface.into();
        self
    }

    pub fn with_stream_id(mut self, stream_id: u64) -> Self {
        self.stream_id = stream_id;
        self
    }

    pub fn with_dbc_path(mut self, dbc_path: impl Into<PathBuf>) -> Self {
        self.dbc_path = dbc_path.into();
        self
    }

    pub fn with_lin_enabled(mut self, lin_enabled: bool) -> Self {
        self.lin_enabled = lin_enabled;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_toml() {
        let toml = r#"
            iface = "eth0"
            stream_id = 42
            dbc_path = "/etc/sdrig/catalog.dbc"
        "#;
        let config = SdrigConfig::from_toml(toml).unwrap();
        assert_eq!(config.iface, "eth0");
        assert_eq!(config.stream_id, 42);
        assert_eq!(config.dbc_path, PathBuf::from("/etc/sdrig/catalog.dbc"));
        assert!(!config.lin_enabled);
        assert!(!config.debug);
    }

    #[test]
    fn missing_iface_is_rejected() {
        let toml = r#"
            stream_id = 42
            dbc_path = "/etc/sdrig/catalog.dbc"
        "#;
        assert!(matches!(SdrigConfig::from_toml(toml), Err(CoreError::Config(_))));
    }

    #[test]
    fn missing_stream_id_is_rejected() {
        let toml = r#"
            iface = "eth0"
            dbc_path = "/etc/sdrig/catalog.dbc"
        "#;
        assert!(matches!(SdrigConfig::from_toml(toml), Err(CoreError::Config(_))));
    }

    #[test]
    fn builder_round_trip() {
        let config = SdrigConfig::default()
            .with_iface("eth1")
            .with_stream_id(7)
            .with_dbc_path("/tmp/catalog.dbc")
            .with_lin_enabled(true)
            .with_debug(true);
        assert!(config.validate().is_ok());
        assert_eq!(config.iface, "eth1");
        assert!(config.lin_enabled);
        assert!(config.debug);
    }

    #[test]
    fn malformed_toml_is_rejected() {
        assert!(matches!(SdrigConfig::from_toml("not = [valid"), Err(CoreError::Config(_))));
    }
}
