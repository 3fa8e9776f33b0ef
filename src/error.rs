//! Error types surfaced at the core boundary.
//!
//! Failures the core is expected to absorb internally — malformed frames,
//! decode misses, unknown PGNs, callback panics — are never represented
//! here; they are counted in [`crate::metrics`] instead (see spec §7).

use thiserror::Error;

/// Errors returned by setter APIs, transport setup, and the encode path.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    /// A caller-supplied value fell outside the documented range for the
    /// parameter (voltage, current, PWM, pin/channel index, relay).
    #[error("value out of range: {0}")]
    OutOfRange(String),

    /// An operation targeted a MAC address with no connected device.
    #[error("no device connected for {0}")]
    UnknownDevice(String),

    /// The DBC catalog has no message with the requested name.
    #[error("DBC catalog has no message named {0:?}")]
    EncodeUnknownMessage(String),

    /// The network interface's MAC address could not be resolved.
    #[error("could not resolve MAC address for interface {0:?}")]
    MacUnavailable(String),

    /// The raw socket for the configured interface could not be opened.
    #[error("failed to open raw interface {0:?}: {1}")]
    InterfaceOpenFailed(String, String),

    /// The receiver thread did not join within the shutdown bound.
    #[error("receiver thread did not shut down within the timeout")]
    ReceiverShutdownTimeout,

    /// A config file could not be read or parsed.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The DBC catalog file could not be parsed.
    #[error("invalid DBC catalog: {0}")]
    InvalidCatalog(String),
}

/// Result alias used throughout the core.
pub type CoreResult<T> = Result<T, CoreError>;
