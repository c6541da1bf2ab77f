//! Nunjucks front-end.

pub mod preprocess;
pub mod syntax;

mod read;

pub use read::{NUNJUCKS_READER, NunjucksReader, read_nunjucks};
