//! Configuration for the templar CLI.
//!
//! Loads defaults from `--config <path>`, else `templar.toml` in the working
//! directory when it exists.
//!
//! Example templar.toml:
//! ```toml
//! from = "liquid"
//! to = "nunjucks"
//! ```

use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// File looked up in the working directory when no `--config` is given.
pub const DEFAULT_FILE: &str = "templar.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Default source language.
    pub from: Option<String>,
    /// Default target language.
    pub to: Option<String>,
}

impl Config {
    /// Load the explicit file, or the default file from `cwd` if present.
    ///
    /// A missing explicit file is an error; a missing default file is not.
    pub fn load(explicit: Option<&Path>, cwd: &Path) -> anyhow::Result<Self> {
        match explicit {
            Some(path) => Self::load_file(path),
            None => {
                let path = cwd.join(DEFAULT_FILE);
                if path.is_file() {
                    Self::load_file(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    fn load_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("invalid config {}", path.display()))?;
        tracing::debug!(path = %path.display(), ?config, "loaded config");
        Ok(config)
    }

    /// `--from`/`--to` flags override the file.
    pub fn resolve(&self, from: Option<String>, to: Option<String>) -> (Option<String>, Option<String>) {
        (from.or_else(|| self.from.clone()), to.or_else(|| self.to.clone()))
    }
}

/// Current directory, for locating the default config.
pub fn working_dir() -> anyhow::Result<PathBuf> {
    std::env::current_dir().context("failed to determine the working directory")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_default_file_is_empty_config() {
        let dir = TempDir::new().unwrap();
        assert_eq!(Config::load(None, dir.path()).unwrap(), Config::default());
    }

    #[test]
    fn default_file_is_picked_up() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(DEFAULT_FILE), "from = \"liquid\"\n").unwrap();
        let config = Config::load(None, dir.path()).unwrap();
        assert_eq!(config.from.as_deref(), Some("liquid"));
        assert_eq!(config.to, None);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "form = \"liquid\"\n").unwrap();
        let err = Config::load(Some(&path), dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains("unknown field"), "{err:#}");
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(Config::load(Some(&dir.path().join("nope.toml")), dir.path()).is_err());
    }

    #[test]
    fn flags_override_file() {
        let config = Config {
            from: Some("liquid".into()),
            to: Some("nunjucks".into()),
        };
        assert_eq!(
            config.resolve(Some("nunjucks".into()), None),
            (Some("nunjucks".into()), Some("nunjucks".into()))
        );
    }
}
