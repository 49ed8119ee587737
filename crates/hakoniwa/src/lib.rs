//! # hakoniwa
//!
//! Expose a directory tree as a lazily-resolved namespace.
//!
//! A bound library is a tree of namespaces. Asking a namespace for a name
//! resolves it against the directory on first access and caches the result:
//! - a sub-directory becomes a child [`Namespace`]
//! - a data file (`json`, `yaml`, `yml`, `toml`, `txt`, `md`, or any
//!   registered extension) becomes a parsed [`Value`]
//! - a script file (`rhai`) is evaluated in a fresh engine and becomes a
//!   [`CodeObject`]: the single construct it defines, or a module of its
//!   top-level bindings
//!
//! Once resolved, a name always returns the very same entry.

pub mod binder;
pub mod config;
pub mod error;
pub mod fs;
pub mod loaders;
pub mod materialize;
pub mod namespace;
pub mod naming;
pub mod value;

pub use binder::{BindRequest, Binder, Library, bind, bind_with, import, unbind};
pub use config::LibraryConfig;
pub use error::{
    AttributeError, BoxError, ConfigurationError, ExecutionError, ParseError, ResolveError,
    ResolveResult,
};
pub use fs::{DirEntry, EntryKind, Filesystem, FsError, FsResult, LocalFs, MemoryFs};
pub use loaders::{Loader, LoaderRegistry, loader_fn, lookup_loader, register_loader};
pub use materialize::{CodeMaterializer, MaterializeRequest, RhaiMaterializer, ScriptContext};
pub use namespace::Namespace;
pub use value::{Callable, CodeModule, CodeObject, Entry, Value};

pub use hakoniwa_rhai::ScriptLimits;
