//! Loader registry.
//!
//! Maps a file extension to a [`Loader`] that turns raw bytes into a
//! [`Value`]. The registry is insertion-ordered; that order is also the
//! tie-break order when one base name matches several data files.
//!
//! A process-wide registry lives behind [`global`]. Libraries snapshot it
//! when they are bound, so registrations must happen before binding.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::error::BoxError;
use crate::naming::normalize_extension;
use crate::value::Value;

/// Parses file contents into a value tree.
pub trait Loader: Send + Sync {
    /// Format name, used in parse errors (`json`, `yaml`, ...).
    fn format(&self) -> &str;

    /// Parse raw bytes.
    fn load(&self, bytes: &[u8]) -> Result<Value, BoxError>;
}

/// A loader built from a closure.
pub struct FnLoader<F> {
    format: String,
    f: F,
}

impl<F> Loader for FnLoader<F>
where
    F: Fn(&[u8]) -> Result<Value, BoxError> + Send + Sync,
{
    fn format(&self) -> &str {
        &self.format
    }

    fn load(&self, bytes: &[u8]) -> Result<Value, BoxError> {
        (self.f)(bytes)
    }
}

/// Wrap a closure as a loader.
pub fn loader_fn<F>(format: impl Into<String>, f: F) -> Arc<dyn Loader>
where
    F: Fn(&[u8]) -> Result<Value, BoxError> + Send + Sync + 'static,
{
    Arc::new(FnLoader {
        format: format.into(),
        f,
    })
}

// ============================================================================
// Built-in loaders
// ============================================================================

/// JSON via `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLoader;

impl Loader for JsonLoader {
    fn format(&self) -> &str {
        "json"
    }

    fn load(&self, bytes: &[u8]) -> Result<Value, BoxError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// YAML via `serde_yaml`.
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlLoader;

impl Loader for YamlLoader {
    fn format(&self) -> &str {
        "yaml"
    }

    fn load(&self, bytes: &[u8]) -> Result<Value, BoxError> {
        Ok(serde_yaml::from_slice(bytes)?)
    }
}

/// TOML via the `toml` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct TomlLoader;

impl Loader for TomlLoader {
    fn format(&self) -> &str {
        "toml"
    }

    fn load(&self, bytes: &[u8]) -> Result<Value, BoxError> {
        let text = std::str::from_utf8(bytes)?;
        Ok(toml::from_str::<Value>(text)?)
    }
}

/// Plain text; the whole file becomes one string value.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextLoader;

impl Loader for TextLoader {
    fn format(&self) -> &str {
        "text"
    }

    fn load(&self, bytes: &[u8]) -> Result<Value, BoxError> {
        Ok(Value::String(String::from_utf8(bytes.to_vec())?))
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Extension → loader table.
#[derive(Clone, Default)]
pub struct LoaderRegistry {
    loaders: IndexMap<String, Arc<dyn Loader>>,
}

impl LoaderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in formats, in tie-break order:
    /// `json`, `yaml`, `yml`, `toml`, `txt`, `md`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("json", Arc::new(JsonLoader));
        registry.register("yaml", Arc::new(YamlLoader));
        registry.register("yml", Arc::new(YamlLoader));
        registry.register("toml", Arc::new(TomlLoader));
        registry.register("txt", Arc::new(TextLoader));
        registry.register("md", Arc::new(TextLoader));
        registry
    }

    /// Register a loader for an extension (`"csv"` or `".csv"`).
    ///
    /// Replacing an existing extension keeps its original priority.
    /// Returns the previous loader, if any.
    pub fn register(
        &mut self,
        extension: &str,
        loader: Arc<dyn Loader>,
    ) -> Option<Arc<dyn Loader>> {
        let extension = normalize_extension(extension);
        tracing::debug!(extension = %extension, format = loader.format(), "registered loader");
        self.loaders.insert(extension, loader)
    }

    /// Look up the loader for an extension.
    pub fn lookup(&self, extension: &str) -> Option<Arc<dyn Loader>> {
        self.loaders.get(&normalize_extension(extension)).cloned()
    }

    /// Position of an extension in tie-break order (lower wins).
    pub fn priority(&self, extension: &str) -> Option<usize> {
        self.loaders.get_index_of(&normalize_extension(extension))
    }

    /// Registered extensions in priority order.
    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        self.loaders.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.loaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }
}

impl fmt::Debug for LoaderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.loaders.iter().map(|(ext, l)| (ext, l.format())))
            .finish()
    }
}

static GLOBAL: Lazy<RwLock<LoaderRegistry>> =
    Lazy::new(|| RwLock::new(LoaderRegistry::with_defaults()));

/// The process-wide registry.
pub fn global() -> &'static RwLock<LoaderRegistry> {
    &GLOBAL
}

/// Register a loader in the process-wide registry.
///
/// Libraries bound before this call keep the table they were bound with.
pub fn register_loader(extension: &str, loader: Arc<dyn Loader>) -> Option<Arc<dyn Loader>> {
    GLOBAL.write().register(extension, loader)
}

/// Look up a loader in the process-wide registry.
pub fn lookup_loader(extension: &str) -> Option<Arc<dyn Loader>> {
    GLOBAL.read().lookup(extension)
}

/// Copy of the process-wide registry.
pub fn snapshot() -> LoaderRegistry {
    GLOBAL.read().clone()
}
