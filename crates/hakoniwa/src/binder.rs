//! Root binder.
//!
//! Binding installs a library root under an importable name. The process
//! keeps one [`Library`] per name: the first bind wins, and binding the same
//! name to the same directory again hands back the existing library, so
//! every namespace and value obtained earlier stays valid.
//!
//! ```no_run
//! let lib = hakoniwa::bind("mylib", "/srv/mylib")?;
//! let config = lib.get("config")?;
//! let encoder = hakoniwa::import("mylib").ok_or("mylib is not bound")?.resolve("mylib.models.Encoder")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hakoniwa_rhai::ScriptLimits;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::debug;

use crate::config::LibraryConfig;
use crate::error::{ConfigurationError, ResolveResult};
use crate::fs::{Filesystem, LocalFs};
use crate::loaders::{self, LoaderRegistry};
use crate::materialize::{CodeMaterializer, RhaiMaterializer, resolve_from_root};
use crate::namespace::{Context, Namespace};
use crate::naming::is_member_name;
use crate::value::{Entry, Value};

// ============================================================================
// Library
// ============================================================================

/// A bound library: an importable name plus its root namespace.
pub struct Library {
    name: String,
    root: PathBuf,
    namespace: Arc<Namespace>,
}

impl Library {
    /// Importable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Canonical root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The root namespace.
    pub fn namespace(&self) -> &Arc<Namespace> {
        &self.namespace
    }

    /// Resolve a top-level name.
    pub fn get(&self, name: &str) -> ResolveResult<Entry> {
        self.namespace.get(name)
    }

    /// Resolve a top-level name, mapping "does not exist" to `None`.
    pub fn try_get(&self, name: &str) -> ResolveResult<Option<Entry>> {
        self.namespace.try_get(name)
    }

    /// Returns true if a top-level name resolves.
    pub fn contains(&self, name: &str) -> ResolveResult<bool> {
        self.namespace.contains(name)
    }

    /// Resolve a dotted path. A leading library name is optional:
    /// `mylib.models.Encoder` and `models.Encoder` are the same entry, and
    /// `mylib` alone is the root namespace.
    pub fn resolve(&self, path: &str) -> ResolveResult<Entry> {
        resolve_from_root(&self.namespace, path)
    }

    /// Resolve a dotted path and call what it names.
    pub fn call(&self, path: &str, args: Vec<Value>) -> ResolveResult<Value> {
        self.resolve(path)?.call(args)
    }

    /// Top-level names, sorted.
    pub fn members(&self) -> ResolveResult<Vec<String>> {
        self.namespace.members()
    }
}

impl fmt::Debug for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Library")
            .field("name", &self.name)
            .field("root", &self.root)
            .finish()
    }
}

// ============================================================================
// BindRequest
// ============================================================================

/// Everything a bind needs besides the name table.
pub struct BindRequest {
    config: LibraryConfig,
    fs: Arc<dyn Filesystem>,
    loaders: Option<LoaderRegistry>,
    materializers: Vec<Arc<dyn CodeMaterializer>>,
    default_materializer: bool,
}

impl BindRequest {
    /// Bind `root` on the local disk under `name`.
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self::from_config(LibraryConfig::new(name, root))
    }

    pub fn from_config(config: LibraryConfig) -> Self {
        Self {
            config,
            fs: Arc::new(LocalFs),
            loaders: None,
            materializers: Vec::new(),
            default_materializer: true,
        }
    }

    /// Resolve through another filesystem.
    pub fn filesystem(mut self, fs: Arc<dyn Filesystem>) -> Self {
        self.fs = fs;
        self
    }

    /// Use this loader table instead of a snapshot of the global one.
    pub fn loaders(mut self, loaders: LoaderRegistry) -> Self {
        self.loaders = Some(loaders);
        self
    }

    /// Add a code materializer. It ranks after the ones added before it.
    pub fn materializer(mut self, materializer: Arc<dyn CodeMaterializer>) -> Self {
        self.materializers.push(materializer);
        self
    }

    /// Do not install the stock Rhai materializer.
    pub fn without_default_materializer(mut self) -> Self {
        self.default_materializer = false;
        self
    }

    /// Resolve from a sub-directory of the root.
    pub fn source_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.source_dir = Some(dir.into());
        self
    }

    /// Limits for the stock Rhai materializer.
    pub fn limits(mut self, limits: ScriptLimits) -> Self {
        self.config.limits = limits;
        self
    }

    fn context(self) -> Context {
        let mut materializers: Vec<Arc<dyn CodeMaterializer>> = Vec::new();
        if self.default_materializer {
            materializers.push(Arc::new(RhaiMaterializer::with_limits(self.config.limits)));
        }
        materializers.extend(self.materializers);

        Context {
            fs: self.fs,
            loaders: self.loaders.unwrap_or_else(loaders::snapshot),
            materializers,
        }
    }
}

impl fmt::Debug for BindRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindRequest")
            .field("config", &self.config)
            .field("fs", &self.fs)
            .field("materializers", &self.materializers)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Binder
// ============================================================================

/// Name → library table.
#[derive(Default)]
pub struct Binder {
    libraries: RwLock<HashMap<String, Arc<Library>>>,
}

static GLOBAL: Lazy<Binder> = Lazy::new(Binder::new);

impl Binder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide binder behind [`bind`] and [`import`].
    pub fn global() -> &'static Binder {
        &GLOBAL
    }

    /// Bind a local directory.
    pub fn bind(
        &self,
        name: impl Into<String>,
        root: impl Into<PathBuf>,
    ) -> Result<Arc<Library>, ConfigurationError> {
        self.bind_with(BindRequest::new(name, root))
    }

    /// Bind a library.
    ///
    /// Returns the existing library when `name` is already bound to the same
    /// directory. Fails with [`ConfigurationError::AlreadyBound`] when it is
    /// bound to a different one.
    pub fn bind_with(&self, request: BindRequest) -> Result<Arc<Library>, ConfigurationError> {
        let name = request.config.name.clone();
        if !is_member_name(&name) || name.contains('.') {
            return Err(ConfigurationError::InvalidName(name));
        }

        let root = request.config.source_root();
        if !request.fs.exists(&root) {
            return Err(ConfigurationError::RootMissing(root));
        }
        if !request.fs.is_dir(&root) {
            return Err(ConfigurationError::RootNotADirectory(root));
        }
        let root = request.fs.canonicalize(&root)?;

        let mut libraries = self.libraries.write();
        if let Some(existing) = libraries.get(&name) {
            if existing.root == root {
                debug!(name = %name, "library already bound");
                return Ok(existing.clone());
            }
            return Err(ConfigurationError::AlreadyBound {
                name,
                existing: existing.root.clone(),
            });
        }

        let namespace = Namespace::root(&name, root.clone(), Arc::new(request.context()));
        let library = Arc::new(Library {
            name: name.clone(),
            root,
            namespace,
        });
        debug!(name = %name, root = %library.root.display(), "bound library");
        libraries.insert(name, library.clone());
        Ok(library)
    }

    /// The library bound under `name`.
    pub fn import(&self, name: &str) -> Option<Arc<Library>> {
        self.libraries.read().get(name).cloned()
    }

    /// Remove a binding. Handles already given out stay usable.
    pub fn unbind(&self, name: &str) -> Option<Arc<Library>> {
        let removed = self.libraries.write().remove(name);
        if removed.is_some() {
            debug!(name, "unbound library");
        }
        removed
    }

    /// Remove every binding.
    pub fn clear(&self) {
        self.libraries.write().clear();
    }

    /// Bound names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.libraries.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for Binder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binder")
            .field("libraries", &self.names())
            .finish()
    }
}

/// Bind a local directory in the process-wide binder.
pub fn bind(
    name: impl Into<String>,
    root: impl Into<PathBuf>,
) -> Result<Arc<Library>, ConfigurationError> {
    Binder::global().bind(name, root)
}

/// Bind a library in the process-wide binder.
pub fn bind_with(request: BindRequest) -> Result<Arc<Library>, ConfigurationError> {
    Binder::global().bind_with(request)
}

/// Look up a library in the process-wide binder.
pub fn import(name: &str) -> Option<Arc<Library>> {
    Binder::global().import(name)
}

/// Remove a library from the process-wide binder.
pub fn unbind(name: &str) -> Option<Arc<Library>> {
    Binder::global().unbind(name)
}
