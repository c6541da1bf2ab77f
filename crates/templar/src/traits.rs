//! Traits for template readers and writers.

use crate::ir::IrNode;

/// Error that can occur when reading template source into IR.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReadError {
    /// The source does not lex or parse.
    #[error("syntax error at byte {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("unsupported syntax: {0}")]
    Unsupported(String),

    #[error("expected {expected}, got {got}")]
    UnexpectedNode { expected: String, got: String },
}

impl ReadError {
    pub fn syntax(offset: usize, message: impl Into<String>) -> Self {
        ReadError::Syntax {
            offset,
            message: message.into(),
        }
    }
}

/// Error that can occur when rendering IR into a target grammar.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WriteError {
    /// The IR holds a construct the target grammar cannot express.
    #[error("{language} does not support {construct}{}", hint_suffix(.hint))]
    Unsupported {
        language: &'static str,
        construct: String,
        hint: Option<String>,
    },

    /// The IR violates its own shape contract.
    #[error("malformed IR: {0}")]
    Malformed(String),
}

impl WriteError {
    pub fn unsupported(language: &'static str, construct: impl Into<String>) -> Self {
        WriteError::Unsupported {
            language,
            construct: construct.into(),
            hint: None,
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        WriteError::Malformed(message.into())
    }

    pub fn with_hint(self, text: impl Into<String>) -> Self {
        match self {
            WriteError::Unsupported {
                language,
                construct,
                ..
            } => WriteError::Unsupported {
                language,
                construct,
                hint: Some(text.into()),
            },
            other => other,
        }
    }
}

fn hint_suffix(hint: &Option<String>) -> String {
    hint.as_deref().map(|h| format!(". {h}")).unwrap_or_default()
}

/// A reader parses template source into the IR.
pub trait Reader: Send + Sync {
    /// Language identifier (e.g., "liquid", "nunjucks").
    fn language(&self) -> &str;

    /// File extensions this reader handles (e.g., &["liquid"]).
    fn extensions(&self) -> &[&str] {
        &[]
    }

    /// Parse template source into the IR.
    fn read(&self, source: &str) -> Result<Vec<IrNode>, ReadError>;
}

/// A writer renders the IR as template source in a target language.
pub trait Writer: Send + Sync {
    /// Language identifier (e.g., "liquid", "nunjucks").
    fn language(&self) -> &str;

    /// File extension for output (e.g., "njk").
    fn extension(&self) -> &str {
        ""
    }

    /// Render the IR, failing on constructs the language cannot express.
    fn write(&self, nodes: &[IrNode]) -> Result<String, WriteError>;
}

/// A reader backed by a closure.
pub struct FnReader<F> {
    language: String,
    read: F,
}

impl<F> FnReader<F>
where
    F: Fn(&str) -> Result<Vec<IrNode>, ReadError> + Send + Sync,
{
    pub fn new(language: impl Into<String>, read: F) -> Self {
        Self {
            language: language.into(),
            read,
        }
    }
}

impl<F> Reader for FnReader<F>
where
    F: Fn(&str) -> Result<Vec<IrNode>, ReadError> + Send + Sync,
{
    fn language(&self) -> &str {
        &self.language
    }

    fn read(&self, source: &str) -> Result<Vec<IrNode>, ReadError> {
        (self.read)(source)
    }
}

/// A writer backed by a closure.
pub struct FnWriter<F> {
    language: String,
    write: F,
}

impl<F> FnWriter<F>
where
    F: Fn(&[IrNode]) -> Result<String, WriteError> + Send + Sync,
{
    pub fn new(language: impl Into<String>, write: F) -> Self {
        Self {
            language: language.into(),
            write,
        }
    }
}

impl<F> Writer for FnWriter<F>
where
    F: Fn(&[IrNode]) -> Result<String, WriteError> + Send + Sync,
{
    fn language(&self) -> &str {
        &self.language
    }

    fn write(&self, nodes: &[IrNode]) -> Result<String, WriteError> {
        (self.write)(nodes)
    }
}
