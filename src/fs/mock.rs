// src/fs/mock.rs

//! In-memory [`FileSystem`] for tests.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Result, anyhow};

use super::{DirEntry, EntryKind, FileSystem};

#[derive(Debug, Clone)]
enum Node {
    File(Vec<u8>),
    Dir,
}

/// Paths are normalised (`./a/b` and `a/b` are the same entry) and parent
/// directories are created implicitly. Clones share the same contents.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    nodes: Arc<Mutex<BTreeMap<PathBuf, Node>>>,
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<PathBuf, Node>> {
        self.nodes.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let path = normalize(path.as_ref());
        let mut nodes = self.lock();
        for dir in path.ancestors().skip(1) {
            if !dir.as_os_str().is_empty() {
                nodes.entry(dir.to_path_buf()).or_insert(Node::Dir);
            }
        }
        nodes.insert(path, Node::File(content.into()));
    }

    pub fn remove_file(&self, path: impl AsRef<Path>) {
        self.lock().remove(&normalize(path.as_ref()));
    }

    /// Contents of a file, if present.
    pub fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        match self.lock().get(&normalize(path.as_ref())) {
            Some(Node::File(content)) => Some(content.clone()),
            _ => None,
        }
    }
}

impl FileSystem for MockFileSystem {
    fn list_dir(&self, dir: &Path) -> Result<Vec<DirEntry>> {
        let dir = normalize(dir);
        let nodes = self.lock();
        if !matches!(nodes.get(&dir), Some(Node::Dir)) {
            return Err(anyhow!("not a directory: {}", dir.display()));
        }
        Ok(nodes
            .iter()
            .filter(|(path, _)| path.parent() == Some(dir.as_path()))
            .map(|(path, node)| DirEntry {
                path: path.clone(),
                kind: match node {
                    Node::File(_) => EntryKind::File,
                    Node::Dir => EntryKind::Dir,
                },
            })
            .collect())
    }

    fn entry_kind(&self, path: &Path) -> Result<Option<EntryKind>> {
        Ok(self.lock().get(&normalize(path)).map(|node| match node {
            Node::File(_) => EntryKind::File,
            Node::Dir => EntryKind::Dir,
        }))
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn std::io::Read + Send>> {
        self.contents(path)
            .map(|content| Box::new(Cursor::new(content)) as Box<dyn std::io::Read + Send>)
            .ok_or_else(|| anyhow!("no such file: {}", path.display()))
    }

    fn read_optional(&self, path: &Path) -> Result<Option<String>> {
        self.contents(path)
            .map(|content| String::from_utf8(content).map_err(|e| anyhow!("invalid UTF-8: {e}")))
            .transpose()
    }

    fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.add_file(path, contents);
        Ok(())
    }

    fn copy_file(&self, from: &Path, to: &Path) -> Result<()> {
        let content = self
            .contents(from)
            .ok_or_else(|| anyhow!("no such file: {}", from.display()))?;
        self.add_file(to, content);
        Ok(())
    }
}
