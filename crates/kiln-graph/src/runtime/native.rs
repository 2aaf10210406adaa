//! Native file-system runtime backed by `tokio::fs`.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{FileMetadata, Runtime, RuntimeError, RuntimeResult};

/// Runtime for native builds.
///
/// Relative paths are resolved against `cwd` (the process working directory
/// unless overridden).
#[derive(Debug, Clone, Default)]
pub struct NativeRuntime {
    cwd: Option<PathBuf>,
}

impl NativeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a fixed working directory instead of the process one.
    pub fn with_cwd(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: Some(cwd.into()),
        }
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            return path.to_path_buf();
        }
        match self.get_cwd() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    }
}

fn map_io(path: &Path, err: io::Error) -> RuntimeError {
    if err.kind() == io::ErrorKind::NotFound {
        RuntimeError::FileNotFound(path.to_path_buf())
    } else {
        RuntimeError::Io(format!("{}: {err}", path.display()))
    }
}

#[async_trait]
impl Runtime for NativeRuntime {
    async fn read_file(&self, path: &Path) -> RuntimeResult<Vec<u8>> {
        let path = self.resolve_path(path);
        tokio::fs::read(&path).await.map_err(|e| map_io(&path, e))
    }

    async fn write_file(&self, path: &Path, content: &[u8]) -> RuntimeResult<()> {
        let path = self.resolve_path(path);
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| map_io(&path, e))
    }

    async fn metadata(&self, path: &Path) -> RuntimeResult<FileMetadata> {
        let path = self.resolve_path(path);
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| map_io(&path, e))?;
        Ok(FileMetadata {
            size: meta.len(),
            is_dir: meta.is_dir(),
            is_file: meta.is_file(),
        })
    }

    fn exists(&self, path: &Path) -> bool {
        self.resolve_path(path).exists()
    }

    async fn create_dir(&self, path: &Path, recursive: bool) -> RuntimeResult<()> {
        let path = self.resolve_path(path);
        let result = if recursive {
            tokio::fs::create_dir_all(&path).await
        } else {
            tokio::fs::create_dir(&path).await
        };
        result.map_err(|e| map_io(&path, e))
    }

    async fn remove_file(&self, path: &Path) -> RuntimeResult<()> {
        let path = self.resolve_path(path);
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| map_io(&path, e))
    }

    async fn read_dir(&self, path: &Path) -> RuntimeResult<Vec<String>> {
        let path = self.resolve_path(path);
        let mut entries = tokio::fs::read_dir(&path)
            .await
            .map_err(|e| map_io(&path, e))?;

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| map_io(&path, e))? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    fn get_cwd(&self) -> RuntimeResult<PathBuf> {
        match &self.cwd {
            Some(cwd) => Ok(cwd.clone()),
            None => std::env::current_dir()
                .map_err(|e| RuntimeError::Io(format!("failed to get current directory: {e}"))),
        }
    }
}
