//! Library configuration.
//!
//! A library can be described by a small TOML manifest:
//!
//! ```toml
//! name = "mylib"
//! root = "."           # relative to the manifest
//! source_dir = "core"  # optional: resolve from <root>/core
//!
//! [limits]
//! max_operations = 50000
//! ```

use std::path::{Path, PathBuf};

use hakoniwa_rhai::ScriptLimits;
use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Everything needed to bind one library.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Importable name.
    pub name: String,
    /// Library directory.
    pub root: PathBuf,
    /// Sub-directory of `root` that holds the resolvable tree.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_dir: Option<PathBuf>,
    /// Limits for every script the library materializes.
    pub limits: ScriptLimits,
}

impl LibraryConfig {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            ..Self::default()
        }
    }

    /// Parse a manifest. Paths are taken as written.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigurationError> {
        toml::from_str(text).map_err(|e| ConfigurationError::manifest(Path::new("<inline>"), e))
    }

    /// Read a manifest file.
    ///
    /// A relative (or missing) `root` is resolved against the manifest's
    /// directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let text =
            std::fs::read_to_string(path).map_err(|e| ConfigurationError::manifest(path, e))?;
        let mut config: Self =
            toml::from_str(&text).map_err(|e| ConfigurationError::manifest(path, e))?;

        if config.root.is_relative() {
            let base = path.parent().unwrap_or_else(|| Path::new("."));
            config.root = base.join(&config.root);
        }
        tracing::debug!(manifest = %path.display(), name = %config.name, "loaded library manifest");
        Ok(config)
    }

    /// Directory the root namespace resolves against.
    pub fn source_root(&self) -> PathBuf {
        match &self.source_dir {
            Some(dir) => self.root.join(dir),
            None => self.root.clone(),
        }
    }
}
