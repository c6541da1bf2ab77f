//! Registry for readers and writers.
//!
//! Built-in entries are fixed per build by cargo features. Custom entries are
//! layered onto a [`Registry`] value for a single call and shadow built-ins of
//! the same name; nothing is registered globally.

use crate::traits::{Reader, Writer};

/// Readers compiled into this build.
pub fn builtin_readers() -> Vec<&'static dyn Reader> {
    #[allow(unused_mut)]
    let mut readers: Vec<&'static dyn Reader> = Vec::new();
    #[cfg(feature = "read-liquid")]
    {
        readers.push(&crate::input::liquid::LIQUID_READER);
    }
    #[cfg(feature = "read-nunjucks")]
    {
        readers.push(&crate::input::nunjucks::NUNJUCKS_READER);
    }
    readers
}

/// Writers compiled into this build.
pub fn builtin_writers() -> Vec<&'static dyn Writer> {
    #[allow(unused_mut)]
    let mut writers: Vec<&'static dyn Writer> = Vec::new();
    #[cfg(feature = "write-liquid")]
    {
        writers.push(&crate::output::liquid::LIQUID_WRITER);
    }
    #[cfg(feature = "write-nunjucks")]
    {
        writers.push(&crate::output::nunjucks::NUNJUCKS_WRITER);
    }
    writers
}

/// Get a built-in reader by language name.
pub fn reader_for_language(lang: &str) -> Option<&'static dyn Reader> {
    builtin_readers().into_iter().find(|r| r.language() == lang)
}

/// Get a built-in writer by language name.
pub fn writer_for_language(lang: &str) -> Option<&'static dyn Writer> {
    builtin_writers().into_iter().find(|w| w.language() == lang)
}

/// Get a built-in reader by file extension.
pub fn reader_for_extension(ext: &str) -> Option<&'static dyn Reader> {
    builtin_readers()
        .into_iter()
        .find(|r| r.extensions().contains(&ext))
}

/// Names of every built-in language, readable or writable.
pub fn languages() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = builtin_readers()
        .into_iter()
        .map(|r| r.language())
        .chain(builtin_writers().into_iter().map(|w| w.language()))
        .collect();
    names.sort_unstable();
    names.dedup();
    names
}

/// Readers and writers visible to one translation.
#[derive(Clone)]
pub struct Registry<'a> {
    readers: Vec<&'a dyn Reader>,
    writers: Vec<&'a dyn Writer>,
}

impl<'a> Registry<'a> {
    /// Registry holding only the built-in languages.
    pub fn builtin() -> Self {
        Self {
            readers: builtin_readers().into_iter().map(|r| r as &dyn Reader).collect(),
            writers: builtin_writers().into_iter().map(|w| w as &dyn Writer).collect(),
        }
    }

    /// Add a reader that shadows any existing one for its language.
    pub fn with_reader(mut self, reader: &'a dyn Reader) -> Self {
        self.readers.insert(0, reader);
        self
    }

    /// Add a writer that shadows any existing one for its language.
    pub fn with_writer(mut self, writer: &'a dyn Writer) -> Self {
        self.writers.insert(0, writer);
        self
    }

    pub fn reader(&self, lang: &str) -> Option<&'a dyn Reader> {
        self.readers.iter().copied().find(|r| r.language() == lang)
    }

    pub fn writer(&self, lang: &str) -> Option<&'a dyn Writer> {
        self.writers.iter().copied().find(|w| w.language() == lang)
    }

    /// Readable language names, without duplicates.
    pub fn reader_languages(&self) -> Vec<&str> {
        dedup(self.readers.iter().map(|r| r.language()))
    }

    /// Writable language names, without duplicates.
    pub fn writer_languages(&self) -> Vec<&str> {
        dedup(self.writers.iter().map(|w| w.language()))
    }
}

impl Default for Registry<'_> {
    fn default() -> Self {
        Self::builtin()
    }
}

fn dedup<'s>(names: impl Iterator<Item = &'s str>) -> Vec<&'s str> {
    let mut seen: Vec<&str> = Vec::new();
    for name in names {
        if !seen.contains(&name) {
            seen.push(name);
        }
    }
    seen
}
