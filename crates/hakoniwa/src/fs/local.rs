//! Local filesystem backend.

use std::fs;
use std::path::{Path, PathBuf};

use super::{DirEntry, EntryKind, Filesystem, FsError, FsResult};

/// Local filesystem backend.
///
/// Symlinks are followed: a link to a directory lists as a directory, a link
/// to a file as a file. Dangling links are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl LocalFs {
    /// Create a local filesystem handle.
    pub fn new() -> Self {
        Self
    }
}

impl Filesystem for LocalFs {
    fn read_dir(&self, path: &Path) -> FsResult<Vec<DirEntry>> {
        if !path.is_dir() {
            return Err(if path.exists() {
                FsError::not_a_directory(path)
            } else {
                FsError::not_found(path)
            });
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            // Follow symlinks; a dangling link has no metadata.
            let Ok(meta) = fs::metadata(entry.path()) else {
                continue;
            };
            let kind = if meta.is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::File
            };

            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn read(&self, path: &Path) -> FsResult<Vec<u8>> {
        if path.is_dir() {
            return Err(FsError::is_a_directory(path));
        }
        fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FsError::not_found(path),
            _ => FsError::Io(e),
        })
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn canonicalize(&self, path: &Path) -> FsResult<PathBuf> {
        dunce::canonicalize(path).map_err(FsError::from)
    }
}
