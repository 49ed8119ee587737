//! Code materialization.
//!
//! A [`CodeMaterializer`] turns the source of one code file into a
//! [`CodeObject`]. Namespaces pick the materializer by file extension, in
//! registration order. The stock implementation is [`RhaiMaterializer`].

mod script;

use std::path::PathBuf;
use std::sync::{Arc, Weak};

pub use script::RhaiMaterializer;

use crate::error::{ExecutionError, ResolveError, ResolveResult};
use crate::namespace::Namespace;
use crate::value::{CodeObject, Entry};

/// Turns code files into code objects.
pub trait CodeMaterializer: Send + Sync + std::fmt::Debug {
    /// Materializer name (e.g. "rhai").
    fn name(&self) -> &str;

    /// File extensions handled, lower case, without the dot.
    fn extensions(&self) -> &[&str];

    /// Evaluate a file in a fresh environment.
    fn materialize(&self, request: &MaterializeRequest) -> Result<CodeObject, ExecutionError>;

    /// Returns true if this materializer handles `extension`.
    fn handles(&self, extension: &str) -> bool {
        self.extensions()
            .iter()
            .any(|ext| ext.eq_ignore_ascii_case(extension))
    }
}

/// Everything a materializer gets to know about one file.
#[derive(Debug, Clone)]
pub struct MaterializeRequest {
    /// Absolute file path.
    pub path: PathBuf,
    /// Source text.
    pub source: String,
    /// File stem (`text_encoder`).
    pub stem: String,
    /// Construct name the file is expected to define (`TextEncoder`).
    pub construct_name: String,
    /// Dotted module name (`mylib.models.text_encoder`).
    pub qualified_name: String,
    /// Back-reference into the library.
    pub context: ScriptContext,
    /// Always expose every binding, never a single construct.
    pub as_module: bool,
}

impl MaterializeRequest {
    /// Request for a file outside any library. Back-references fail with
    /// [`ResolveError::Detached`].
    pub fn standalone(path: impl Into<PathBuf>, source: impl Into<String>) -> Self {
        let path = path.into();
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            construct_name: crate::naming::snake_to_camel(&stem),
            qualified_name: stem.clone(),
            context: ScriptContext::detached(&stem),
            source: source.into(),
            stem,
            path,
            as_module: false,
        }
    }

    /// Qualified name of a binding defined by this file.
    ///
    /// A construct replaces the file in the namespace, so it takes the
    /// file's place: `lib.models.text_encoder` defines `lib.models.TextEncoder`.
    pub fn qualify(&self, binding: &str, replaces_file: bool) -> String {
        if replaces_file {
            match self.qualified_name.rsplit_once('.') {
                Some((parent, _)) => format!("{parent}.{binding}"),
                None => binding.to_string(),
            }
        } else {
            format!("{}.{}", self.qualified_name, binding)
        }
    }
}

/// Back-reference capability handed to materialized code.
///
/// Holds weak handles so a script never keeps its library alive.
#[derive(Debug, Clone)]
pub struct ScriptContext {
    module: String,
    root: Weak<Namespace>,
    namespace: Weak<Namespace>,
}

impl ScriptContext {
    pub(crate) fn new(
        module: impl Into<String>,
        root: Weak<Namespace>,
        namespace: Weak<Namespace>,
    ) -> Self {
        Self {
            module: module.into(),
            root,
            namespace,
        }
    }

    /// A context with no library behind it.
    pub fn detached(module: impl Into<String>) -> Self {
        Self::new(module, Weak::new(), Weak::new())
    }

    /// Dotted name of the module this context belongs to.
    pub fn module(&self) -> &str {
        &self.module
    }

    /// The library root.
    pub fn root(&self) -> ResolveResult<Arc<Namespace>> {
        self.root
            .upgrade()
            .ok_or_else(|| ResolveError::Detached(self.module.clone()))
    }

    /// The namespace containing the module.
    pub fn namespace(&self) -> ResolveResult<Arc<Namespace>> {
        self.namespace
            .upgrade()
            .ok_or_else(|| ResolveError::Detached(self.module.clone()))
    }

    /// Resolve a dotted path from the library root.
    ///
    /// A leading segment equal to the library name is skipped, so
    /// `mylib.config` and `config` mean the same thing.
    pub fn resolve(&self, path: &str) -> ResolveResult<Entry> {
        resolve_from_root(&self.root()?, path)
    }

    /// Resolve a dotted path relative to the containing namespace.
    pub fn resolve_sibling(&self, path: &str) -> ResolveResult<Entry> {
        self.namespace()?.resolve_path(path)
    }
}

/// Resolve a dotted path against a library root.
///
/// The bare library name is the root itself. A leading `name.` segment is
/// dropped, so a top-level entry named like the library is only reachable
/// through [`Namespace::get`] or as `name.name`.
pub(crate) fn resolve_from_root(root: &Arc<Namespace>, path: &str) -> ResolveResult<Entry> {
    match strip_root_name(root.name(), path) {
        Some(rest) => root.resolve_path(rest),
        None => Ok(Entry::Namespace(root.clone())),
    }
}

/// Drop a leading `name.` from a dotted path. `None` means the path is the
/// name itself.
fn strip_root_name<'a>(name: &str, path: &'a str) -> Option<&'a str> {
    match path.strip_prefix(name) {
        Some("") => None,
        Some(rest) => Some(rest.strip_prefix('.').unwrap_or(path)),
        None => Some(path),
    }
}
