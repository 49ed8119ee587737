//! Namespace nodes.
//!
//! A [`Namespace`] stands for one directory. Asking it for a name the first
//! time lists the directory, classifies the matching entry and caches the
//! result; every later request for that name is answered from the cache
//! without touching the filesystem.
//!
//! ## Matching
//!
//! A name matches an entry whose stem (file name without its last
//! extension) equals the name. If nothing matches exactly, the snake_case
//! form of a CamelCase name is tried (`TextEncoder` → `text_encoder.rhai`).
//! Entries starting with `.` or `__` are hidden.
//!
//! When several entries share a stem the winner is, in order: a directory,
//! a code file (materializer registration order), a data file (loader
//! registration order). Entries nobody recognizes are ignored.
//!
//! ## Package initializer
//!
//! A directory may hold `__init__.<code-ext>`. It is materialized as a
//! module the first time a lookup misses the cache, before that lookup
//! claims its name, and its bindings answer lookups before the directory
//! entries do.
//!
//! ## Concurrency
//!
//! Each name gets its own [`OnceCell`]: concurrent first lookups of one name
//! see a single winner, different names never wait on each other. Failed
//! resolutions are not cached.

use std::cell::RefCell;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use tracing::{debug, trace};

use crate::error::{AttributeError, ExecutionError, ParseError, ResolveError, ResolveResult};
use crate::fs::{DirEntry, Filesystem};
use crate::loaders::LoaderRegistry;
use crate::materialize::{CodeMaterializer, MaterializeRequest, ScriptContext};
use crate::naming::{camel_to_snake, is_hidden, is_member_name, snake_to_camel, split_file_name};
use crate::value::{CodeObject, Entry, Value};

/// Stem of the package initializer file.
pub const INIT_STEM: &str = "__init__";

/// Resolution machinery shared by every namespace of one library.
#[derive(Debug)]
pub(crate) struct Context {
    pub fs: Arc<dyn Filesystem>,
    pub loaders: LoaderRegistry,
    pub materializers: Vec<Arc<dyn CodeMaterializer>>,
}

impl Context {
    fn materializer_for(&self, extension: &str) -> Option<(usize, &Arc<dyn CodeMaterializer>)> {
        self.materializers
            .iter()
            .enumerate()
            .find(|(_, m)| m.handles(extension))
    }

    fn recognizes(&self, extension: &str) -> bool {
        self.materializer_for(extension).is_some() || self.loaders.priority(extension).is_some()
    }
}

/// How a matching directory entry will be resolved.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Kind {
    Directory,
    Code(usize),
    Data(usize),
}

/// A directory entry chosen to answer a name.
#[derive(Debug)]
struct Candidate<'a> {
    entry: &'a DirEntry,
    stem: &'a str,
    extension: Option<String>,
    kind: Kind,
}

/// One directory, resolved lazily.
pub struct Namespace {
    name: String,
    qualified_name: String,
    path: PathBuf,
    context: Arc<Context>,
    root: Weak<Namespace>,
    this: Weak<Namespace>,
    cache: DashMap<String, Arc<OnceCell<Entry>>>,
    init: OnceCell<Option<Arc<CodeObject>>>,
}

impl Namespace {
    /// Create a library root.
    pub(crate) fn root(name: &str, path: PathBuf, context: Arc<Context>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            name: name.to_string(),
            qualified_name: name.to_string(),
            path,
            context,
            root: this.clone(),
            this: this.clone(),
            cache: DashMap::new(),
            init: OnceCell::new(),
        })
    }

    fn child(&self, dir_name: &str) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            name: dir_name.to_string(),
            qualified_name: format!("{}.{}", self.qualified_name, dir_name),
            path: self.path.join(dir_name),
            context: self.context.clone(),
            root: self.root.clone(),
            this: this.clone(),
            cache: DashMap::new(),
            init: OnceCell::new(),
        })
    }

    /// Directory name (the library name for a root).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dotted name from the library root (`mylib.models`).
    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    /// Directory this namespace resolves against.
    pub fn path(&self) -> &Path {
        &self.path
    }

    // ========================================================================
    // Lookup API
    // ========================================================================

    /// Resolve a name.
    ///
    /// Fails with [`ResolveError::Attribute`] if nothing answers the name.
    pub fn get(&self, name: &str) -> ResolveResult<Entry> {
        if let Some(entry) = self.cached(name) {
            trace!(namespace = %self.qualified_name, name, "cache hit");
            return Ok(entry);
        }
        if !is_member_name(name) {
            return Err(self.missing(name));
        }

        // The initializer may resolve siblings, so it is settled before any
        // name slot is claimed: the lock order is always init, then name.
        self.settle_initializer()?;

        // Clone the slot so the shard lock is released before resolving.
        let slot = self.cache.entry(name.to_string()).or_default().clone();

        let result = ResolutionGuard::enter(self, name)
            .and_then(|_guard| slot.get_or_try_init(|| self.resolve(name)).cloned());

        if result.is_err() {
            // Drop the empty slot unless another caller is waiting on it.
            self.cache
                .remove_if(name, |_, s| s.get().is_none() && Arc::strong_count(s) <= 2);
        }
        result
    }

    /// Resolve a name, mapping "does not exist" to `None`.
    ///
    /// Parse, execution and filesystem failures are still errors.
    pub fn try_get(&self, name: &str) -> ResolveResult<Option<Entry>> {
        match self.get(name) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) if e.is_missing() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Returns true if `name` resolves.
    ///
    /// Resolving is how existence is decided, so a successful check caches
    /// the entry.
    pub fn contains(&self, name: &str) -> ResolveResult<bool> {
        Ok(self.try_get(name)?.is_some())
    }

    /// Resolve a dotted path (`models.bert.config`).
    ///
    /// Segments walk through child namespaces and into script modules.
    pub fn resolve_path(&self, path: &str) -> ResolveResult<Entry> {
        let mut segments = path.split('.');
        let first = segments.next().unwrap_or_default();
        let mut entry = self.get(first)?;
        for segment in segments {
            entry = entry.member(segment)?;
        }
        Ok(entry)
    }

    /// Resolve a dotted path and call the construct or function it names.
    pub fn call(&self, path: &str, args: Vec<Value>) -> ResolveResult<Value> {
        self.resolve_path(path)?.call(args)
    }

    /// Names this namespace can resolve, sorted.
    ///
    /// Lists the directory on every call. Entries are not resolved; only the
    /// package initializer is materialized, if there is one.
    pub fn members(&self) -> ResolveResult<Vec<String>> {
        let listing = self.context.fs.read_dir(&self.path)?;
        let mut names: Vec<String> = listing
            .iter()
            .filter(|entry| !is_hidden(&entry.name))
            .filter_map(|entry| {
                if entry.is_dir() {
                    return Some(entry.name.clone());
                }
                let (stem, extension) = split_file_name(&entry.name);
                let extension = extension?;
                self.context
                    .recognizes(&extension)
                    .then(|| stem.to_string())
            })
            .collect();

        if let Some(init) = self.initializer(&listing)? {
            if let Some(module) = init.as_module() {
                names.extend(module.names().map(str::to_string));
            }
        }

        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Names currently held in the cache, sorted.
    pub fn cached_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .cache
            .iter()
            .filter(|slot| slot.value().get().is_some())
            .map(|slot| slot.key().clone())
            .collect();
        names.sort();
        names
    }

    fn cached(&self, name: &str) -> Option<Entry> {
        self.cache.get(name).and_then(|slot| slot.get().cloned())
    }

    fn missing(&self, name: &str) -> ResolveError {
        AttributeError::new(&self.qualified_name, name).into()
    }

    // ========================================================================
    // Slow path
    // ========================================================================

    #[tracing::instrument(level = "debug", skip(self), fields(namespace = %self.qualified_name))]
    fn resolve(&self, name: &str) -> ResolveResult<Entry> {
        let listing = self.context.fs.read_dir(&self.path)?;

        if let Some(init) = self.initializer(&listing)? {
            if let Some(entry) = init.as_module().and_then(|module| module.get(name)) {
                debug!(kind = entry.kind(), "answered by package initializer");
                return Ok(entry.clone());
            }
        }

        let Some(candidate) = self.select(&listing, name) else {
            trace!("no matching entry");
            return Err(self.missing(name));
        };
        debug!(entry = %candidate.entry.name, kind = ?candidate.kind, "resolving");

        match candidate.kind {
            Kind::Directory => Ok(Entry::Namespace(self.child(&candidate.entry.name))),
            Kind::Data(_) => self.load_data(&candidate),
            Kind::Code(index) => {
                let materializer = &self.context.materializers[index];
                let qualified_name = format!("{}.{}", self.qualified_name, candidate.stem);
                let code = self.materialize(materializer, &candidate, qualified_name, false)?;
                Ok(Entry::Code(Arc::new(code)))
            }
        }
    }

    /// Pick the entry answering `name`: exact stem first, then snake_case.
    fn select<'a>(&self, listing: &'a [DirEntry], name: &str) -> Option<Candidate<'a>> {
        self.best_match(listing, name).or_else(|| {
            let snake = camel_to_snake(name);
            (snake != name)
                .then(|| self.best_match(listing, &snake))
                .flatten()
        })
    }

    fn best_match<'a>(&self, listing: &'a [DirEntry], stem: &str) -> Option<Candidate<'a>> {
        listing
            .iter()
            .filter(|entry| !is_hidden(&entry.name))
            .filter_map(|entry| self.classify(entry))
            .filter(|candidate| candidate.stem == stem)
            .min_by(|a, b| a.kind.cmp(&b.kind))
    }

    fn classify<'a>(&self, entry: &'a DirEntry) -> Option<Candidate<'a>> {
        if entry.is_dir() {
            return Some(Candidate {
                entry,
                stem: &entry.name,
                extension: None,
                kind: Kind::Directory,
            });
        }

        let (stem, extension) = split_file_name(&entry.name);
        let ext = extension.as_deref()?;
        let kind = match self.context.materializer_for(ext) {
            Some((index, _)) => Kind::Code(index),
            None => Kind::Data(self.context.loaders.priority(ext)?),
        };
        Some(Candidate {
            entry,
            stem,
            extension,
            kind,
        })
    }

    fn load_data(&self, candidate: &Candidate<'_>) -> ResolveResult<Entry> {
        let path = self.path.join(&candidate.entry.name);
        let extension = candidate.extension.as_deref().unwrap_or_default();
        let Some(loader) = self.context.loaders.lookup(extension) else {
            return Err(AttributeError::new(&self.qualified_name, candidate.stem).into());
        };

        let bytes = self.context.fs.read(&path)?;
        let value = loader.load(&bytes).map_err(|source| ParseError {
            path: path.clone(),
            format: loader.format().to_string(),
            source,
        })?;
        debug!(path = %path.display(), format = loader.format(), "loaded data file");
        Ok(Entry::Data(Arc::new(value)))
    }

    fn materialize(
        &self,
        materializer: &Arc<dyn CodeMaterializer>,
        candidate: &Candidate<'_>,
        qualified_name: String,
        as_module: bool,
    ) -> ResolveResult<CodeObject> {
        let path = self.path.join(&candidate.entry.name);
        let bytes = self.context.fs.read(&path)?;
        let source = String::from_utf8(bytes)
            .map_err(|e| ExecutionError::new(&path, format!("source is not UTF-8: {e}")))?;

        let request = MaterializeRequest {
            stem: candidate.stem.to_string(),
            construct_name: snake_to_camel(candidate.stem),
            context: ScriptContext::new(&qualified_name, self.root.clone(), self.this.clone()),
            qualified_name,
            source,
            path,
            as_module,
        };
        debug!(
            path = %request.path.display(),
            materializer = materializer.name(),
            "materializing code file"
        );
        Ok(materializer.materialize(&request)?)
    }

    /// Materialize the package initializer unless it is settled already or
    /// is the caller.
    fn settle_initializer(&self) -> ResolveResult<()> {
        if self.init.get().is_some() || ResolutionGuard::is_active(self, INIT_STEM) {
            return Ok(());
        }
        let listing = self.context.fs.read_dir(&self.path)?;
        self.initializer(&listing).map(|_| ())
    }

    /// The package initializer, materialized on first need.
    ///
    /// Lookups made by the initializer itself while it runs see the
    /// directory without it.
    fn initializer(&self, listing: &[DirEntry]) -> ResolveResult<Option<&CodeObject>> {
        if ResolutionGuard::is_active(self, INIT_STEM) {
            return Ok(None);
        }

        let init = self.init.get_or_try_init(|| -> ResolveResult<Option<Arc<CodeObject>>> {
            let _guard = ResolutionGuard::enter(self, INIT_STEM)?;
            let candidate = listing
                .iter()
                .filter(|entry| !entry.is_dir())
                .filter_map(|entry| {
                    let (stem, extension) = split_file_name(&entry.name);
                    let (index, _) = self.context.materializer_for(extension.as_deref()?)?;
                    (stem == INIT_STEM).then_some(Candidate {
                        entry,
                        stem,
                        extension,
                        kind: Kind::Code(index),
                    })
                })
                .min_by(|a, b| a.kind.cmp(&b.kind));

            let Some(candidate) = candidate else {
                return Ok(None);
            };
            let Kind::Code(index) = candidate.kind else {
                return Ok(None);
            };
            let materializer = &self.context.materializers[index];
            let code =
                self.materialize(materializer, &candidate, self.qualified_name.clone(), true)?;
            Ok(Some(Arc::new(code)))
        })?;

        Ok(init.as_deref())
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("qualified_name", &self.qualified_name)
            .field("path", &self.path)
            .field("cached", &self.cache.len())
            .finish()
    }
}

// ============================================================================
// Re-entrancy guard
// ============================================================================

thread_local! {
    static RESOLVING: RefCell<Vec<(usize, String)>> = const { RefCell::new(Vec::new()) };
}

/// Marks `(namespace, name)` as being resolved on this thread.
///
/// A script that asks for the name currently being resolved would otherwise
/// block forever on its own cell.
struct ResolutionGuard {
    key: (usize, String),
}

impl ResolutionGuard {
    fn key(namespace: &Namespace, name: &str) -> (usize, String) {
        (namespace as *const Namespace as usize, name.to_string())
    }

    fn is_active(namespace: &Namespace, name: &str) -> bool {
        let key = Self::key(namespace, name);
        RESOLVING.with(|stack| stack.borrow().contains(&key))
    }

    fn enter(namespace: &Namespace, name: &str) -> ResolveResult<Self> {
        let key = Self::key(namespace, name);
        RESOLVING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.contains(&key) {
                return Err(ResolveError::Cycle(format!(
                    "{}.{}",
                    namespace.qualified_name, name
                )));
            }
            stack.push(key.clone());
            Ok(Self { key })
        })
    }
}

impl Drop for ResolutionGuard {
    fn drop(&mut self) {
        RESOLVING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(pos) = stack.iter().rposition(|k| *k == self.key) {
                stack.remove(pos);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFs;
    use crate::materialize::RhaiMaterializer;
    use crate::value::CodeModule;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Materializer for `.stub` files: every line `key=value` becomes a binding.
    #[derive(Debug, Default)]
    struct StubMaterializer {
        calls: AtomicUsize,
    }

    impl CodeMaterializer for StubMaterializer {
        fn name(&self) -> &str {
            "stub"
        }

        fn extensions(&self) -> &[&str] {
            &["stub"]
        }

        fn materialize(&self, request: &MaterializeRequest) -> Result<CodeObject, ExecutionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut module = CodeModule::new(&request.stem, &request.qualified_name, &request.path);
            for line in request.source.lines() {
                let (key, value) = line
                    .split_once('=')
                    .ok_or_else(|| ExecutionError::new(&request.path, format!("bad line: {line}")))?;
                module.insert_value(key.trim(), json!(value.trim()));
            }
            Ok(CodeObject::Module(module))
        }
    }

    fn library(fs: &Arc<MemoryFs>) -> Arc<Namespace> {
        library_with(fs, vec![Arc::new(RhaiMaterializer::new()) as Arc<dyn CodeMaterializer>])
    }

    fn library_with(
        fs: &Arc<MemoryFs>,
        materializers: Vec<Arc<dyn CodeMaterializer>>,
    ) -> Arc<Namespace> {
        let context = Arc::new(Context {
            fs: fs.clone(),
            loaders: LoaderRegistry::with_defaults(),
            materializers,
        });
        Namespace::root("mylib", PathBuf::from("/mylib"), context)
    }

    #[test]
    fn test_directory_becomes_namespace() {
        let fs = Arc::new(MemoryFs::new());
        fs.write_file("/mylib/models/config.json", r#"{"dim": 8}"#).unwrap();
        let root = library(&fs);

        let models = root.get("models").unwrap();
        let ns = models.as_namespace().expect("namespace");
        assert_eq!(ns.qualified_name(), "mylib.models");
        assert_eq!(ns.path(), Path::new("/mylib/models"));
        assert!(models.ptr_eq(&root.get("models").unwrap()));

        let config = root.resolve_path("models.config").unwrap();
        assert_eq!(config.as_data(), Some(&json!({"dim": 8})));
    }

    #[test]
    fn test_missing_name() {
        let fs = Arc::new(MemoryFs::new());
        fs.write_file("/mylib/sub/x.json", "1").unwrap();
        let root = library(&fs);

        let err = root.get("nope").unwrap_err();
        assert!(err.is_missing());
        assert!(root.resolve_path("sub.nope").unwrap_err().is_missing());
        assert_eq!(root.try_get("nope").unwrap().map(|e| e.kind()), None);
        assert!(!root.contains("nope").unwrap());
        assert!(root.cached_names().is_empty());
    }

    #[test]
    fn test_invalid_names_never_match() {
        let fs = Arc::new(MemoryFs::new());
        fs.write_file("/mylib/.hidden.json", "1").unwrap();
        fs.write_file("/mylib/__private.json", "1").unwrap();
        fs.write_file("/mylib/sub/x.json", "1").unwrap();
        let root = library(&fs);

        for name in ["", ".hidden", "__private", "..", "sub/x", "__init__"] {
            assert!(root.get(name).unwrap_err().is_missing(), "{name}");
        }
        assert!(root.get("hidden").unwrap_err().is_missing());
    }

    #[test]
    fn test_data_cached_after_first_read() {
        let fs = Arc::new(MemoryFs::new());
        fs.write_file("/mylib/config.yaml", "layers: 2\n").unwrap();
        let root = library(&fs);

        let first = root.get("config").unwrap();
        fs.write_file("/mylib/config.yaml", "layers: 99\n").unwrap();
        let second = root.get("config").unwrap();

        assert!(first.ptr_eq(&second));
        assert_eq!(second.as_data(), Some(&json!({"layers": 2})));
        assert_eq!(root.cached_names(), vec!["config"]);
    }

    #[test]
    fn test_parse_error_is_not_cached() {
        let fs = Arc::new(MemoryFs::new());
        fs.write_file("/mylib/config.json", "{broken").unwrap();
        let root = library(&fs);

        let err = root.get("config").unwrap_err();
        assert!(matches!(&err, ResolveError::Parse(p) if p.format == "json"));
        assert!(root.cached_names().is_empty());

        fs.write_file("/mylib/config.json", r#"{"fixed": true}"#).unwrap();
        assert_eq!(
            root.get("config").unwrap().as_data(),
            Some(&json!({"fixed": true}))
        );
    }

    #[test]
    fn test_tie_break_order() {
        let fs = Arc::new(MemoryFs::new());
        fs.write_file("/mylib/thing/inner.txt", "dir").unwrap();
        fs.write_file("/mylib/thing.json", "1").unwrap();
        fs.write_file("/mylib/thing.rhai", "let x = 1;").unwrap();
        fs.write_file("/mylib/both.yaml", "from: yaml").unwrap();
        fs.write_file("/mylib/both.json", r#"{"from": "json"}"#).unwrap();
        fs.write_file("/mylib/both.rhai", "let from = \"rhai\";").unwrap();
        fs.write_file("/mylib/data.txt", "text").unwrap();
        fs.write_file("/mylib/data.json", r#""json""#).unwrap();
        let root = library(&fs);

        assert!(root.get("thing").unwrap().as_namespace().is_some());
        assert_eq!(root.get("both").unwrap().kind(), "module");
        assert_eq!(root.get("data").unwrap().as_data(), Some(&json!("json")));
    }

    #[test]
    fn test_unrecognized_extension_is_missing() {
        let fs = Arc::new(MemoryFs::new());
        fs.write_file("/mylib/weights.bin", vec![0u8, 1, 2]).unwrap();
        fs.write_file("/mylib/README", "no extension").unwrap();
        let root = library(&fs);

        assert!(root.get("weights").unwrap_err().is_missing());
        assert!(root.get("README").unwrap_err().is_missing());
    }

    #[test]
    fn test_camel_case_falls_back_to_snake_case() {
        let fs = Arc::new(MemoryFs::new());
        fs.write_file("/mylib/text_encoder.rhai", "fn TextEncoder(s) { s + \"!\" }").unwrap();
        let root = library(&fs);

        let encoder = root.get("TextEncoder").unwrap();
        assert_eq!(encoder.kind(), "construct");
        assert_eq!(encoder.call(vec![json!("hi")]).unwrap(), json!("hi!"));
        assert_eq!(root.call("text_encoder", vec![json!("a")]).unwrap(), json!("a!"));
    }

    #[test]
    fn test_exact_match_beats_snake_case() {
        let fs = Arc::new(MemoryFs::new());
        fs.write_file("/mylib/Config.json", r#""exact""#).unwrap();
        fs.write_file("/mylib/config.json", r#""snake""#).unwrap();
        let root = library(&fs);

        assert_eq!(root.get("Config").unwrap().as_data(), Some(&json!("exact")));
    }

    #[test]
    fn test_members_lists_resolvable_names() {
        let fs = Arc::new(MemoryFs::new());
        fs.write_file("/mylib/config.yaml", "a: 1").unwrap();
        fs.write_file("/mylib/config.json", "{}").unwrap();
        fs.write_file("/mylib/Encoder.rhai", "fn Encoder() { 1 }").unwrap();
        fs.write_file("/mylib/models/x.json", "1").unwrap();
        fs.write_file("/mylib/weights.bin", "").unwrap();
        fs.write_file("/mylib/.git/HEAD", "").unwrap();
        fs.write_file("/mylib/__cache__/x.json", "1").unwrap();
        let root = library(&fs);

        assert_eq!(root.members().unwrap(), vec!["Encoder", "config", "models"]);
        assert!(root.cached_names().is_empty());
    }

    #[test]
    fn test_package_initializer() {
        let fs = Arc::new(MemoryFs::new());
        fs.write_file("/mylib/models/__init__.stub", "default = bert\nconfig = from-init")
            .unwrap();
        fs.write_file("/mylib/models/config.json", r#""from-file""#).unwrap();
        fs.write_file("/mylib/models/vocab.txt", "a b c").unwrap();
        let stub = Arc::new(StubMaterializer::default());
        let root = library_with(&fs, vec![stub.clone() as Arc<dyn CodeMaterializer>]);

        let models = root.get("models").unwrap();
        let models = models.as_namespace().unwrap();
        assert_eq!(models.get("default").unwrap().as_data(), Some(&json!("bert")));
        assert_eq!(models.get("config").unwrap().as_data(), Some(&json!("from-init")));
        assert_eq!(models.get("vocab").unwrap().as_data(), Some(&json!("a b c")));
        assert_eq!(models.members().unwrap(), vec!["config", "default", "vocab"]);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_initializer_is_retried() {
        let fs = Arc::new(MemoryFs::new());
        fs.write_file("/mylib/__init__.stub", "no equals sign").unwrap();
        fs.write_file("/mylib/data.json", "1").unwrap();
        let root = library_with(&fs, vec![Arc::new(StubMaterializer::default()) as Arc<dyn CodeMaterializer>]);

        assert!(matches!(root.get("data"), Err(ResolveError::Execution(_))));

        fs.write_file("/mylib/__init__.stub", "ok = yes").unwrap();
        assert_eq!(root.get("data").unwrap().as_data(), Some(&json!(1)));
        assert_eq!(root.get("ok").unwrap().as_data(), Some(&json!("yes")));
    }

    #[test]
    fn test_script_initializer_can_read_siblings() {
        let fs = Arc::new(MemoryFs::new());
        fs.write_file("/mylib/__init__.rhai", "let dim = sibling(\"config\").dim * 2;")
            .unwrap();
        fs.write_file("/mylib/config.json", r#"{"dim": 4}"#).unwrap();
        let root = library(&fs);

        assert_eq!(root.get("dim").unwrap().as_data(), Some(&json!(8)));
    }

    /// `__init__.slow` sleeps, then reads `config` through its context.
    #[derive(Debug)]
    struct SlowInitMaterializer;

    impl CodeMaterializer for SlowInitMaterializer {
        fn name(&self) -> &str {
            "slow"
        }

        fn extensions(&self) -> &[&str] {
            &["slow"]
        }

        fn materialize(&self, request: &MaterializeRequest) -> Result<CodeObject, ExecutionError> {
            std::thread::sleep(std::time::Duration::from_millis(300));
            let config = request
                .context
                .resolve_sibling("config")
                .map_err(|e| ExecutionError::new(&request.path, e.to_string()))?;
            let mut module = CodeModule::new(&request.stem, &request.qualified_name, &request.path);
            let dim = config.as_data().and_then(|v| v.get("dim")).cloned();
            module.insert_value("dim", dim.unwrap_or_default());
            Ok(CodeObject::Module(module))
        }
    }

    #[test]
    fn test_initializer_reading_sibling_under_concurrent_lookup() {
        let fs = Arc::new(MemoryFs::new());
        fs.write_file("/mylib/__init__.slow", "").unwrap();
        fs.write_file("/mylib/config.json", r#"{"dim": 4}"#).unwrap();
        let root = library_with(&fs, vec![Arc::new(SlowInitMaterializer) as Arc<dyn CodeMaterializer>]);

        let (tx, rx) = std::sync::mpsc::channel();
        for (delay, name) in [(0, "dim"), (50, "config")] {
            let root = root.clone();
            let tx = tx.clone();
            std::thread::spawn(move || {
                std::thread::sleep(std::time::Duration::from_millis(delay));
                let _ = tx.send((name, root.get(name).map(|e| e.kind())));
            });
        }
        drop(tx);

        let mut done = Vec::new();
        for _ in 0..2 {
            let (name, kind) = rx
                .recv_timeout(std::time::Duration::from_secs(5))
                .expect("lookups did not finish");
            assert_eq!(kind.unwrap(), "data", "{name}");
            done.push(name);
        }
        done.sort();
        assert_eq!(done, vec!["config", "dim"]);
        assert_eq!(root.get("dim").unwrap().as_data(), Some(&json!(4)));
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let fs = Arc::new(MemoryFs::new());
        fs.write_file("/mylib/a.rhai", "let x = lib(\"b\");").unwrap();
        fs.write_file("/mylib/b.rhai", "let y = lib(\"a\");").unwrap();
        let root = library(&fs);

        let err = root.get("a").unwrap_err();
        let ResolveError::Execution(err) = err else {
            panic!("expected an execution error, got {err:?}");
        };
        assert!(err.message.contains("circular"), "{}", err.message);
        assert!(root.cached_names().is_empty());
    }

    #[test]
    fn test_concurrent_first_access_has_one_winner() {
        let fs = Arc::new(MemoryFs::new());
        fs.write_file("/mylib/shared.stub", "k = v").unwrap();
        let stub = Arc::new(StubMaterializer::default());
        let root = library_with(&fs, vec![stub.clone() as Arc<dyn CodeMaterializer>]);

        let entries: Vec<Entry> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8).map(|_| s.spawn(|| root.get("shared").unwrap())).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(entries.iter().all(|e| e.ptr_eq(&entries[0])));
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
    }
}
