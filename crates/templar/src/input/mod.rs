//! Input readers - parse template source into IR.

#[cfg(feature = "read-liquid")]
pub mod liquid;

#[cfg(feature = "read-liquid")]
pub use liquid::{LIQUID_READER, LiquidReader, read_liquid};

#[cfg(feature = "read-nunjucks")]
pub mod nunjucks;

#[cfg(feature = "read-nunjucks")]
pub use nunjucks::{NUNJUCKS_READER, NunjucksReader, read_nunjucks};
