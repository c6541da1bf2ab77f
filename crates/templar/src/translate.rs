//! The `translate` entry point.

use crate::ir::IrNode;
use crate::registry::Registry;
use crate::traits::{FnReader, FnWriter, ReadError, Reader, WriteError, Writer};

/// Every argument problem found before translating.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", .violations.join("\n"))]
pub struct ValidationError {
    pub violations: Vec<String>,
}

/// Error that can occur during [`translate`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranslateError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Write(#[from] WriteError),
}

/// Arguments to [`translate`].
///
/// ```ignore
/// let args = TranslateArgs::new()
///     .from("liquid")
///     .to("nunjucks")
///     .input("Hello {{ name | upcase }}!");
/// assert_eq!(translate(&args)?, "Hello {{ name | upper }}!");
/// ```
#[derive(Default)]
pub struct TranslateArgs {
    pub from: Option<String>,
    pub to: Option<String>,
    pub input: Option<String>,
    custom_readers: Vec<Box<dyn Reader>>,
    custom_writers: Vec<Box<dyn Writer>>,
}

impl TranslateArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from(mut self, language: impl Into<String>) -> Self {
        self.from = Some(language.into());
        self
    }

    pub fn to(mut self, language: impl Into<String>) -> Self {
        self.to = Some(language.into());
        self
    }

    pub fn input(mut self, source: impl Into<String>) -> Self {
        self.input = Some(source.into());
        self
    }

    /// Add a reader for this call only.
    pub fn reader(mut self, reader: impl Reader + 'static) -> Self {
        self.custom_readers.push(Box::new(reader));
        self
    }

    /// Add a writer for this call only.
    pub fn writer(mut self, writer: impl Writer + 'static) -> Self {
        self.custom_writers.push(Box::new(writer));
        self
    }

    /// Add a reader backed by a parse function.
    pub fn custom_parser<F>(self, language: impl Into<String>, parse: F) -> Self
    where
        F: Fn(&str) -> Result<Vec<IrNode>, ReadError> + Send + Sync + 'static,
    {
        self.reader(FnReader::new(language, parse))
    }

    /// Add a writer backed by a render function.
    pub fn custom_renderer<F>(self, language: impl Into<String>, render: F) -> Self
    where
        F: Fn(&[IrNode]) -> Result<String, WriteError> + Send + Sync + 'static,
    {
        self.writer(FnWriter::new(language, render))
    }

    /// Built-ins merged with this call's custom entries.
    pub fn registry(&self) -> Registry<'_> {
        let mut registry = Registry::builtin();
        for reader in &self.custom_readers {
            registry = registry.with_reader(reader.as_ref());
        }
        for writer in &self.custom_writers {
            registry = registry.with_writer(writer.as_ref());
        }
        registry
    }
}

/// Translate `args.input` from `args.from` to `args.to`.
///
/// Arguments are validated up front and every violation is reported at once.
/// Nothing is emitted unless both the read and the write succeed.
pub fn translate(args: &TranslateArgs) -> Result<String, TranslateError> {
    let registry = args.registry();
    let (reader, writer, input) = validate(args, &registry)?;

    tracing::debug!(
        from = reader.language(),
        to = writer.language(),
        bytes = input.len(),
        "translating"
    );

    let nodes = reader.read(input)?;
    Ok(writer.write(&nodes)?)
}

fn validate<'a>(
    args: &'a TranslateArgs,
    registry: &Registry<'a>,
) -> Result<(&'a dyn Reader, &'a dyn Writer, &'a str), ValidationError> {
    let mut violations = Vec::new();

    let from = non_empty(&args.from);
    let to = non_empty(&args.to);

    if from.is_none() {
        violations.push(r#"Invalid argument "from": expected string (e.g. "nunjucks")"#.to_string());
    }
    if to.is_none() {
        violations.push(r#"Invalid argument "to": expected string (e.g. "liquid")"#.to_string());
    }
    if args.input.is_none() {
        violations
            .push(r#"Invalid argument "input": expected string (the template content)"#.to_string());
    }

    let reader = from.and_then(|name| {
        let reader = registry.reader(name);
        if reader.is_none() {
            violations.push(unsupported(name, &registry.reader_languages()));
        }
        reader
    });
    let writer = to.and_then(|name| {
        let writer = registry.writer(name);
        if writer.is_none() {
            violations.push(unsupported(name, &registry.writer_languages()));
        }
        writer
    });

    match (reader, writer, args.input.as_deref()) {
        (Some(reader), Some(writer), Some(input)) if violations.is_empty() => {
            Ok((reader, writer, input))
        }
        _ => Err(ValidationError { violations }),
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

fn unsupported(name: &str, supported: &[&str]) -> String {
    format!(
        r#"unsupported language "{name}". Supported: {}"#,
        supported.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_every_violation() {
        let err = translate(&TranslateArgs::new()).unwrap_err();
        let TranslateError::Validation(validation) = err else {
            panic!("expected validation error, got {err:?}");
        };
        assert_eq!(validation.violations.len(), 3);
        assert!(validation.violations[0].contains(r#""from""#));
        assert!(validation.violations[1].contains(r#""to""#));
        assert!(validation.violations[2].contains(r#""input""#));
    }

    #[test]
    fn unknown_languages_list_alternatives() {
        let args = TranslateArgs::new()
            .from("mustache")
            .to("handlebars")
            .input("");
        let err = translate(&args).unwrap_err();
        assert_eq!(
            err.to_string(),
            "unsupported language \"mustache\". Supported: liquid, nunjucks\n\
             unsupported language \"handlebars\". Supported: liquid, nunjucks"
        );
    }

    #[test]
    fn empty_input_is_valid() {
        let args = TranslateArgs::new().from("liquid").to("nunjucks").input("");
        assert_eq!(translate(&args).unwrap(), "");
    }

    #[test]
    fn custom_entries_resolve() {
        let args = TranslateArgs::new()
            .from("shout")
            .to("nunjucks")
            .input("hi")
            .custom_parser("shout", |source| Ok(vec![IrNode::text(source.to_uppercase())]));
        assert_eq!(translate(&args).unwrap(), "HI");
    }
}
