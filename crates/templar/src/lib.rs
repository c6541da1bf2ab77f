//! Template translation between Liquid and Nunjucks.
//!
//! `templar` parses a template into a small language-neutral IR and renders
//! that IR in another template language. Translation is structural: control
//! flow, output, filters and operators are mapped; what the target cannot
//! express is reported as an error instead of being approximated.
//!
//! # Architecture
//!
//! ```text
//! Source Languages        IR              Target Languages
//! ────────────────    ─────────────    ────────────────────
//! Liquid          ─┐                ┌─> Liquid
//! Nunjucks        ─┼─> IrNode ──────┼─> Nunjucks
//! (custom)        ─┘    (ir.rs)     └─> (custom)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use templar::{TranslateArgs, translate};
//!
//! let args = TranslateArgs::new()
//!     .from("nunjucks")
//!     .to("liquid")
//!     .input("{{ (price + tax) * quantity }}");
//! assert_eq!(translate(&args)?, "{{ price | plus: tax | times: quantity }}");
//! ```
//!
//! # Expressions
//!
//! Liquid has no parentheses and evaluates boolean operators right to left;
//! Nunjucks has conventional precedence. Both are lowered into one left-to-right
//! pipeline (see [`ir::IrExpression`]) and each writer rebuilds its own
//! grouping from it.

pub mod expr;
pub mod input;
pub mod ir;
pub mod output;
pub mod registry;
pub mod traits;
pub mod translate;

// Re-exports: IR types
pub use ir::{
    Branch, ConditionalVariant, FilterName, IrExpression, IrFilter, IrNode, PostfixPart,
    StructureEq, Trim,
};

// Re-exports: Expressions
pub use expr::{Builtin, Operator};

// Re-exports: Traits
pub use traits::{FnReader, FnWriter, ReadError, Reader, WriteError, Writer};

// Re-exports: Translation
pub use translate::{TranslateArgs, TranslateError, ValidationError, translate};

// Re-exports: Registry
pub use registry::{
    Registry, languages, reader_for_extension, reader_for_language, writer_for_language,
};

// Re-exports: Built-in readers
#[cfg(feature = "read-liquid")]
pub use input::{LiquidReader, read_liquid};
#[cfg(feature = "read-nunjucks")]
pub use input::{NunjucksReader, read_nunjucks};

// Re-exports: Built-in writers
#[cfg(feature = "write-liquid")]
pub use output::{LiquidWriter, LiquidWriterImpl};
#[cfg(feature = "write-nunjucks")]
pub use output::{NunjucksWriter, NunjucksWriterImpl};
