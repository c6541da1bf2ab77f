//! Liquid front-end.

pub mod syntax;

mod read;

pub use read::{LIQUID_READER, LiquidReader, read_liquid};
