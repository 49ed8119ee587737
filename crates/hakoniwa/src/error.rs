//! Error taxonomy.
//!
//! - [`AttributeError`] - no filesystem entry answers a name
//! - [`ParseError`] - a data file matched but its loader rejected it
//! - [`ExecutionError`] - a script file failed while being materialized or called
//! - [`ConfigurationError`] - a library could not be bound
//!
//! [`ResolveError`] is what every attribute access returns; it wraps the
//! first three plus filesystem failures and the resolution-cycle guard.

use std::error::Error as StdError;
use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::fs::FsError;

/// Boxed error returned by pluggable loaders.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// The requested name does not exist in a namespace.
///
/// This is the canonical "no such member" signal. Existence checks such as
/// [`Namespace::contains`](crate::Namespace::contains) turn exactly this
/// error into `false`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no such member `{name}` in `{namespace}`")]
pub struct AttributeError {
    /// Dotted name of the namespace that was asked.
    pub namespace: String,
    /// The name that was requested.
    pub name: String,
}

impl AttributeError {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

/// A matched data file could not be parsed by its registered loader.
#[derive(Debug, Error)]
#[error("failed to parse {} as {format}: {source}", path.display())]
pub struct ParseError {
    /// The file that was read.
    pub path: PathBuf,
    /// Loader format name (`json`, `yaml`, ...).
    pub format: String,
    /// The loader's own error.
    #[source]
    pub source: BoxError,
}

/// A script file raised while being evaluated, or while one of its
/// functions was called.
///
/// The original message and the line/column it carried are preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionError {
    /// The script file.
    pub path: PathBuf,
    /// Error message as reported by the script engine.
    pub message: String,
    /// 1-based line, when the engine reported one.
    pub line: Option<usize>,
    /// 1-based column, when the engine reported one.
    pub column: Option<usize>,
}

impl ExecutionError {
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            line: None,
            column: None,
        }
    }

    /// Attach a source position.
    pub fn at(mut self, line: Option<usize>, column: Option<usize>) -> Self {
        self.line = line;
        self.column = column;
        self
    }

    /// `path:line:column` in the usual compiler format.
    pub fn location(&self) -> String {
        match (self.line, self.column) {
            (Some(line), Some(col)) => format!("{}:{}:{}", self.path.display(), line, col),
            (Some(line), None) => format!("{}:{}", self.path.display(), line),
            _ => self.path.display().to_string(),
        }
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location(), self.message)
    }
}

impl StdError for ExecutionError {}

/// A library could not be bound.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Root directory does not exist.
    #[error("root directory does not exist: {}", .0.display())]
    RootMissing(PathBuf),

    /// Root exists but is not a directory.
    #[error("root is not a directory: {}", .0.display())]
    RootNotADirectory(PathBuf),

    /// Library name cannot be imported.
    #[error("invalid library name `{0}`")]
    InvalidName(String),

    /// The name is already bound to a different root.
    #[error("library `{name}` is already bound to {}", existing.display())]
    AlreadyBound { name: String, existing: PathBuf },

    /// Library manifest could not be read or parsed.
    #[error("invalid manifest {}: {message}", path.display())]
    Manifest { path: PathBuf, message: String },

    /// Filesystem failure while inspecting the root.
    #[error(transparent)]
    Filesystem(#[from] FsError),
}

impl ConfigurationError {
    pub(crate) fn manifest(path: &Path, message: impl fmt::Display) -> Self {
        Self::Manifest {
            path: path.to_path_buf(),
            message: message.to_string(),
        }
    }
}

/// Error returned by any attribute access.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Attribute(#[from] AttributeError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Filesystem(#[from] FsError),

    /// A script asked for the entry that is still being resolved.
    #[error("circular resolution of `{0}`")]
    Cycle(String),

    /// Call on an entry that is not a callable construct.
    #[error("`{0}` is not callable")]
    NotCallable(String),

    /// The library a script belongs to has been dropped.
    #[error("library for `{0}` is no longer bound")]
    Detached(String),
}

impl ResolveError {
    /// Returns true if this is the "no such member" signal.
    pub fn is_missing(&self) -> bool {
        matches!(self, ResolveError::Attribute(_))
    }
}

/// Result type for attribute access.
pub type ResolveResult<T> = Result<T, ResolveError>;
