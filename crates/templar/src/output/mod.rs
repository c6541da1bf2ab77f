//! Output writers - render IR as template source.

use crate::ir::Trim;

#[cfg(feature = "write-liquid")]
pub mod liquid;

#[cfg(feature = "write-liquid")]
pub use liquid::{LIQUID_WRITER, LiquidSyntax, LiquidWriter, LiquidWriterImpl};

#[cfg(feature = "write-nunjucks")]
pub mod nunjucks;

#[cfg(feature = "write-nunjucks")]
pub use nunjucks::{NUNJUCKS_WRITER, NunjucksSyntax, NunjucksWriter, NunjucksWriterImpl};

/// `{% body %}`, with `-` markers per `trim`.
#[allow(dead_code)]
pub(crate) fn tag(body: &str, trim: Trim) -> String {
    delimit("{%", "%}", body, trim)
}

/// `{{ body }}`, with `-` markers per `trim`.
#[allow(dead_code)]
pub(crate) fn output(body: &str, trim: Trim) -> String {
    delimit("{{", "}}", body, trim)
}

fn delimit(open: &str, close: &str, body: &str, trim: Trim) -> String {
    let left = if trim.trim_left { "-" } else { "" };
    let right = if trim.trim_right { "-" } else { "" };
    format!("{open}{left} {body} {right}{close}")
}
