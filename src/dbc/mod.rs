//! DBC-driven signal codec (C3): load a catalog, then encode/decode
//! whole-message signal sets by name or by normalized CAN id.

pub mod catalog;
pub mod codec;
pub mod parser;

pub use catalog::{Catalog, Message, Signal};
pub use codec::Codec;

use crate::error::CoreResult;

/// Loads a DBC file from disk and builds a ready-to-use [`Codec`].
pub fn load_codec(path: &std::path::Path) -> CoreResult<Codec> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| crate::error::CoreError::InvalidCatalog(format!("{}: {e}", path.display())))?;
    let catalog = parser::parse(&text)?;
    Ok(Codec::new(catalog))
}
