//! Host-side control library for a fleet of UIO/ELoad/IfMux embedded I/O
//! modules, addressed over IEEE 1722 AVTP NTSCF frames carrying
//! J1939-style CAN traffic in ACF-CAN Brief blocks.
//!
//! [`facade::Sdrig`] is the entry point: it owns the raw-Ethernet
//! transport, the DBC signal codec, the periodic-task scheduler, and
//! every connected device, and is the only type most embedders need.

pub mod avtp;
pub mod config;
pub mod dbc;
pub mod device;
pub mod discovery;
pub mod error;
pub mod facade;
pub mod id;
pub mod metrics;
pub mod pgn;
pub mod registry;
pub mod scheduler;
pub mod transport;

pub use config::SdrigConfig;
pub use error::{CoreError, CoreResult};
pub use facade::Sdrig;
