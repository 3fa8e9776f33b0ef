//! Device engine (§4.6): the shared runtime plus the three concrete
//! module variants built on top of it.

pub mod base;
pub mod eload;
pub mod ifmux;
pub mod shadow;
pub mod uio;

pub use base::{Device, DeviceHealth, DeviceRuntime};
pub use eload::ELoadDevice;
pub use ifmux::IfMuxDevice;
pub use uio::UioDevice;
