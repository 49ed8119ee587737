//! Resolved entries.
//!
//! An [`Entry`] is what a namespace hands back for a name: a child
//! namespace, a parsed data value, or a materialized code object. Entries
//! are reference-counted handles; cloning one never copies the payload, and
//! [`Entry::ptr_eq`] tells whether two lookups produced the same object.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use serde_json::Value;

use crate::error::{AttributeError, ExecutionError, ResolveError, ResolveResult};
use crate::namespace::Namespace;

/// A callable construct produced by a code materializer.
pub trait Callable: Send + Sync + fmt::Debug {
    /// Construct name (`Encoder`).
    fn name(&self) -> &str;

    /// Dotted name within the library (`mylib.models.Encoder`).
    fn qualified_name(&self) -> &str;

    /// Accepted argument counts.
    fn arities(&self) -> &[usize];

    /// Invoke the construct.
    fn call(&self, args: Vec<Value>) -> Result<Value, ExecutionError>;
}

/// Result of materializing a code file.
#[derive(Debug)]
pub enum CodeObject {
    /// The file defines one construct named after the file; it stands in for
    /// the whole file.
    Construct(Arc<dyn Callable>),
    /// Every public top-level binding of the file.
    Module(CodeModule),
}

impl CodeObject {
    /// Module view, if this is a module.
    pub fn as_module(&self) -> Option<&CodeModule> {
        match self {
            CodeObject::Module(module) => Some(module),
            CodeObject::Construct(_) => None,
        }
    }

    /// Callable view, if this is a single construct.
    pub fn as_callable(&self) -> Option<&Arc<dyn Callable>> {
        match self {
            CodeObject::Construct(callable) => Some(callable),
            CodeObject::Module(_) => None,
        }
    }

    /// Dotted name within the library.
    pub fn qualified_name(&self) -> &str {
        match self {
            CodeObject::Construct(callable) => callable.qualified_name(),
            CodeObject::Module(module) => module.qualified_name(),
        }
    }
}

/// The top-level bindings of a script file.
///
/// Members are stored as entries so that repeated lookups of the same
/// member return the same object.
#[derive(Debug)]
pub struct CodeModule {
    name: String,
    qualified_name: String,
    path: PathBuf,
    members: BTreeMap<String, Entry>,
}

impl CodeModule {
    pub fn new(
        name: impl Into<String>,
        qualified_name: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            qualified_name: qualified_name.into(),
            path: path.into(),
            members: BTreeMap::new(),
        }
    }

    /// Add (or shadow) a data binding.
    pub fn insert_value(&mut self, name: impl Into<String>, value: Value) {
        self.members.insert(name.into(), Entry::Data(Arc::new(value)));
    }

    /// Add (or shadow) a function binding.
    pub fn insert_function(&mut self, callable: Arc<dyn Callable>) {
        let name = callable.name().to_string();
        self.members.insert(
            name,
            Entry::Code(Arc::new(CodeObject::Construct(callable))),
        );
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up a member.
    pub fn get(&self, name: &str) -> Option<&Entry> {
        self.members.get(name)
    }

    /// Look up a member, failing with the missing-member signal.
    pub fn member(&self, name: &str) -> Result<Entry, AttributeError> {
        self.members
            .get(name)
            .cloned()
            .ok_or_else(|| AttributeError::new(&self.qualified_name, name))
    }

    /// Data value of a binding, if the member is data.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.members.get(name).and_then(Entry::as_data)
    }

    /// Member names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Call a function member.
    pub fn call(&self, name: &str, args: Vec<Value>) -> ResolveResult<Value> {
        self.member(name)?.call(args)
    }
}

/// A resolved entry.
#[derive(Debug, Clone)]
pub enum Entry {
    /// A sub-directory.
    Namespace(Arc<Namespace>),
    /// A parsed data file.
    Data(Arc<Value>),
    /// A materialized script file.
    Code(Arc<CodeObject>),
}

impl Entry {
    /// Short kind label, used in traces.
    pub fn kind(&self) -> &'static str {
        match self {
            Entry::Namespace(_) => "namespace",
            Entry::Data(_) => "data",
            Entry::Code(code) => match code.as_ref() {
                CodeObject::Construct(_) => "construct",
                CodeObject::Module(_) => "module",
            },
        }
    }

    /// Returns true if both entries are the very same object.
    pub fn ptr_eq(&self, other: &Entry) -> bool {
        match (self, other) {
            (Entry::Namespace(a), Entry::Namespace(b)) => Arc::ptr_eq(a, b),
            (Entry::Data(a), Entry::Data(b)) => Arc::ptr_eq(a, b),
            (Entry::Code(a), Entry::Code(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn as_namespace(&self) -> Option<&Arc<Namespace>> {
        match self {
            Entry::Namespace(ns) => Some(ns),
            _ => None,
        }
    }

    pub fn as_data(&self) -> Option<&Value> {
        match self {
            Entry::Data(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_code(&self) -> Option<&CodeObject> {
        match self {
            Entry::Code(code) => Some(code),
            _ => None,
        }
    }

    /// Look up a member of this entry.
    ///
    /// Namespaces resolve through the filesystem, script modules expose
    /// their bindings. Data values and constructs have no members.
    pub fn member(&self, name: &str) -> ResolveResult<Entry> {
        match self {
            Entry::Namespace(ns) => ns.get(name),
            Entry::Code(code) => match code.as_ref() {
                CodeObject::Module(module) => Ok(module.member(name)?),
                CodeObject::Construct(callable) => {
                    Err(AttributeError::new(callable.qualified_name(), name).into())
                }
            },
            Entry::Data(_) => Err(AttributeError::new("<data>", name).into()),
        }
    }

    /// Call this entry.
    pub fn call(&self, args: Vec<Value>) -> ResolveResult<Value> {
        match self {
            Entry::Code(code) => match code.as_ref() {
                CodeObject::Construct(callable) => Ok(callable.call(args)?),
                CodeObject::Module(module) => {
                    Err(ResolveError::NotCallable(module.qualified_name().to_string()))
                }
            },
            Entry::Namespace(ns) => Err(ResolveError::NotCallable(ns.qualified_name().to_string())),
            Entry::Data(_) => Err(ResolveError::NotCallable("<data>".to_string())),
        }
    }
}
