//! In-memory runtime for tests and virtual projects.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use path_clean::PathClean;

use super::{FileMetadata, Runtime, RuntimeError, RuntimeResult};

/// A file tree held in memory. Directories exist implicitly as prefixes of
/// file paths, or explicitly through [`Runtime::create_dir`].
///
/// Clones share the same tree, so a test can keep a handle and inspect what a
/// build wrote.
#[derive(Debug, Clone)]
pub struct MemoryRuntime {
    cwd: PathBuf,
    files: Arc<RwLock<BTreeMap<PathBuf, Vec<u8>>>>,
    dirs: Arc<RwLock<BTreeSet<PathBuf>>>,
}

impl MemoryRuntime {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        let cwd: PathBuf = cwd.into();
        let dirs = cwd.ancestors().map(Path::to_path_buf).collect();
        Self {
            cwd,
            files: Arc::default(),
            dirs: Arc::new(RwLock::new(dirs)),
        }
    }

    /// Builder-style [`MemoryRuntime::insert`].
    pub fn with_file(self, path: impl AsRef<Path>, content: impl AsRef<[u8]>) -> Self {
        self.insert(path, content);
        self
    }

    /// Add or replace a file. Relative paths are joined to the cwd.
    pub fn insert(&self, path: impl AsRef<Path>, content: impl AsRef<[u8]>) {
        let path = self.absolute(path.as_ref());
        self.files.write().insert(path, content.as_ref().to_vec());
    }

    pub fn remove(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        let path = self.absolute(path.as_ref());
        self.files.write().remove(&path)
    }

    /// Content of a file, if present.
    pub fn read(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        let path = self.absolute(path.as_ref());
        self.files.read().get(&path).cloned()
    }

    /// Content of a file as UTF-8, if present.
    pub fn read_to_string(&self, path: impl AsRef<Path>) -> Option<String> {
        self.read(path)
            .and_then(|bytes| String::from_utf8(bytes).ok())
    }

    /// Every file path under `dir`, sorted.
    pub fn files_under(&self, dir: impl AsRef<Path>) -> Vec<PathBuf> {
        let dir = self.absolute(dir.as_ref());
        self.files
            .read()
            .keys()
            .filter(|path| path.starts_with(&dir))
            .cloned()
            .collect()
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf().clean()
        } else {
            self.cwd.join(path).clean()
        }
    }

    fn dir_exists(&self, path: &Path) -> bool {
        if self.dirs.read().contains(path) {
            return true;
        }
        self.files
            .read()
            .keys()
            .any(|file| file != path && file.starts_with(path))
    }
}

#[async_trait]
impl Runtime for MemoryRuntime {
    async fn read_file(&self, path: &Path) -> RuntimeResult<Vec<u8>> {
        let path = self.absolute(path);
        self.files
            .read()
            .get(&path)
            .cloned()
            .ok_or(RuntimeError::FileNotFound(path))
    }

    async fn write_file(&self, path: &Path, content: &[u8]) -> RuntimeResult<()> {
        let path = self.absolute(path);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !self.dir_exists(parent) {
                return Err(RuntimeError::FileNotFound(parent.to_path_buf()));
            }
        }
        self.files.write().insert(path, content.to_vec());
        Ok(())
    }

    async fn metadata(&self, path: &Path) -> RuntimeResult<FileMetadata> {
        let path = self.absolute(path);
        if let Some(content) = self.files.read().get(&path) {
            return Ok(FileMetadata {
                size: content.len() as u64,
                is_dir: false,
                is_file: true,
            });
        }
        if self.dir_exists(&path) {
            return Ok(FileMetadata {
                size: 0,
                is_dir: true,
                is_file: false,
            });
        }
        Err(RuntimeError::FileNotFound(path))
    }

    fn exists(&self, path: &Path) -> bool {
        let path = self.absolute(path);
        self.files.read().contains_key(&path) || self.dir_exists(&path)
    }

    async fn create_dir(&self, path: &Path, recursive: bool) -> RuntimeResult<()> {
        let path = self.absolute(path);
        if !recursive {
            if let Some(parent) = path.parent() {
                if !self.dir_exists(parent) {
                    return Err(RuntimeError::FileNotFound(parent.to_path_buf()));
                }
            }
        }
        let mut dirs = self.dirs.write();
        for ancestor in path.ancestors() {
            dirs.insert(ancestor.to_path_buf());
        }
        Ok(())
    }

    async fn remove_file(&self, path: &Path) -> RuntimeResult<()> {
        let path = self.absolute(path);
        self.files
            .write()
            .remove(&path)
            .map(|_| ())
            .ok_or(RuntimeError::FileNotFound(path))
    }

    async fn read_dir(&self, path: &Path) -> RuntimeResult<Vec<String>> {
        let path = self.absolute(path);
        if !self.dir_exists(&path) {
            return Err(RuntimeError::FileNotFound(path));
        }

        let mut names: Vec<String> = self
            .files
            .read()
            .keys()
            .filter_map(|file| file.strip_prefix(&path).ok())
            .filter_map(|rest| rest.components().next())
            .map(|first| first.as_os_str().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    fn get_cwd(&self) -> RuntimeResult<PathBuf> {
        Ok(self.cwd.clone())
    }
}
