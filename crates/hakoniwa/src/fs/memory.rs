//! In-memory filesystem backend.
//!
//! Used for testing and for libraries assembled at runtime. All data is
//! ephemeral.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use parking_lot::RwLock;

use super::{DirEntry, EntryKind, Filesystem, FsError, FsResult};

/// Node in the memory filesystem.
#[derive(Debug, Clone)]
enum Node {
    File(Vec<u8>),
    Directory,
}

/// In-memory filesystem backend.
///
/// Paths are normalized (leading `/`, `.` and `..` resolved), so
/// `/lib/core` and `lib/core` name the same node. The root always exists.
#[derive(Debug)]
pub struct MemoryFs {
    nodes: RwLock<HashMap<PathBuf, Node>>,
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFs {
    /// Create a new empty in-memory filesystem.
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(PathBuf::new(), Node::Directory);
        Self {
            nodes: RwLock::new(nodes),
        }
    }

    /// Normalize a path: remove leading `/`, resolve `.` and `..`.
    fn normalize(path: &Path) -> PathBuf {
        let mut result = PathBuf::new();
        for component in path.components() {
            match component {
                Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
                Component::ParentDir => {
                    result.pop();
                }
                Component::Normal(s) => result.push(s),
            }
        }
        result
    }

    /// Create a directory and all missing parents.
    pub fn create_dir_all(&self, path: impl AsRef<Path>) -> FsResult<()> {
        let normalized = Self::normalize(path.as_ref());
        let mut nodes = self.nodes.write();
        Self::ensure_dirs(&mut nodes, &normalized)
    }

    /// Write a file, creating parent directories as needed.
    ///
    /// Replaces the contents of an existing file.
    pub fn write_file(&self, path: impl AsRef<Path>, data: impl Into<Vec<u8>>) -> FsResult<()> {
        let normalized = Self::normalize(path.as_ref());
        let Some(parent) = normalized.parent() else {
            return Err(FsError::InvalidPath("cannot write to root".to_string()));
        };

        let mut nodes = self.nodes.write();
        Self::ensure_dirs(&mut nodes, parent)?;
        if let Some(Node::Directory) = nodes.get(&normalized) {
            return Err(FsError::is_a_directory(&normalized));
        }
        nodes.insert(normalized, Node::File(data.into()));
        Ok(())
    }

    /// Remove a file or a directory with everything below it.
    pub fn remove(&self, path: impl AsRef<Path>) -> FsResult<()> {
        let normalized = Self::normalize(path.as_ref());
        if normalized.as_os_str().is_empty() {
            return Err(FsError::InvalidPath("cannot remove root".to_string()));
        }

        let mut nodes = self.nodes.write();
        if nodes.remove(&normalized).is_none() {
            return Err(FsError::not_found(&normalized));
        }
        nodes.retain(|p, _| !p.starts_with(&normalized));
        Ok(())
    }

    fn ensure_dirs(nodes: &mut HashMap<PathBuf, Node>, path: &Path) -> FsResult<()> {
        let mut current = PathBuf::new();
        for component in path.components() {
            if let Component::Normal(s) = component {
                current.push(s);
                match nodes.get(&current) {
                    Some(Node::File(_)) => return Err(FsError::not_a_directory(&current)),
                    Some(Node::Directory) => {}
                    None => {
                        nodes.insert(current.clone(), Node::Directory);
                    }
                }
            }
        }
        Ok(())
    }
}

impl Filesystem for MemoryFs {
    fn read_dir(&self, path: &Path) -> FsResult<Vec<DirEntry>> {
        let normalized = Self::normalize(path);
        let nodes = self.nodes.read();

        match nodes.get(&normalized) {
            Some(Node::Directory) => {}
            Some(Node::File(_)) => return Err(FsError::not_a_directory(&normalized)),
            None => return Err(FsError::not_found(&normalized)),
        }

        let mut entries: Vec<DirEntry> = nodes
            .iter()
            .filter(|(p, _)| !p.as_os_str().is_empty() && p.parent() == Some(normalized.as_path()))
            .filter_map(|(p, node)| {
                let name = p.file_name()?.to_string_lossy().into_owned();
                let kind = match node {
                    Node::File(_) => EntryKind::File,
                    Node::Directory => EntryKind::Directory,
                };
                Some(DirEntry { name, kind })
            })
            .collect();

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn read(&self, path: &Path) -> FsResult<Vec<u8>> {
        let normalized = Self::normalize(path);
        match self.nodes.read().get(&normalized) {
            Some(Node::File(data)) => Ok(data.clone()),
            Some(Node::Directory) => Err(FsError::is_a_directory(&normalized)),
            None => Err(FsError::not_found(&normalized)),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        self.nodes.read().contains_key(&Self::normalize(path))
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(
            self.nodes.read().get(&Self::normalize(path)),
            Some(Node::Directory)
        )
    }

    fn canonicalize(&self, path: &Path) -> FsResult<PathBuf> {
        let normalized = Self::normalize(path);
        if !self.nodes.read().contains_key(&normalized) {
            return Err(FsError::not_found(&normalized));
        }
        Ok(Path::new("/").join(normalized))
    }
}
