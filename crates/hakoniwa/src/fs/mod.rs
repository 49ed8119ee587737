//! Filesystem capability.
//!
//! Namespaces never touch `std::fs` directly. They go through the
//! [`Filesystem`] trait, which has exactly the three operations resolution
//! needs (list a directory, read a file, check a path) plus a canonicalizer
//! used once at bind time.
//!
//! - [`LocalFs`] - the real disk
//! - [`MemoryFs`] - in-memory tree (testing, embedded libraries)
//!
//! All operations are synchronous: resolution blocks on local disk I/O and
//! has no other suspension points.

mod local;
mod memory;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub use local::LocalFs;
pub use memory::MemoryFs;

/// Filesystem error type.
#[derive(Debug, Error)]
pub enum FsError {
    /// File or directory not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Expected a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Expected a file.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// Invalid path.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl FsError {
    /// Create a NotFound error.
    pub fn not_found(path: &Path) -> Self {
        Self::NotFound(path.display().to_string())
    }

    /// Create a NotADirectory error.
    pub fn not_a_directory(path: &Path) -> Self {
        Self::NotADirectory(path.display().to_string())
    }

    /// Create an IsADirectory error.
    pub fn is_a_directory(path: &Path) -> Self {
        Self::IsADirectory(path.display().to_string())
    }
}

/// Filesystem result type.
pub type FsResult<T> = Result<T, FsError>;

/// Kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// Regular file (or symlink to one).
    File,
    /// Directory (or symlink to one).
    Directory,
}

/// Directory entry as returned by [`Filesystem::read_dir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// File name, including any extension.
    pub name: String,
    /// Entry kind.
    pub kind: EntryKind,
}

impl DirEntry {
    /// Create a file entry.
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::File,
        }
    }

    /// Create a directory entry.
    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Directory,
        }
    }

    /// Returns true if this entry is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Synchronous filesystem operations used by namespace resolution.
///
/// Implementations must be shareable across threads; a namespace may be
/// resolved from several threads at once.
pub trait Filesystem: Send + Sync + fmt::Debug {
    /// List the immediate contents of a directory, sorted by name.
    fn read_dir(&self, path: &Path) -> FsResult<Vec<DirEntry>>;

    /// Read the full contents of a file.
    fn read(&self, path: &Path) -> FsResult<Vec<u8>>;

    /// Returns true if `path` exists.
    fn exists(&self, path: &Path) -> bool;

    /// Returns true if `path` is a directory.
    fn is_dir(&self, path: &Path) -> bool;

    /// Produce the canonical absolute form of an existing path.
    fn canonicalize(&self, path: &Path) -> FsResult<PathBuf>;
}
