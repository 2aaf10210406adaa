//! File-system abstraction.
//!
//! Everything the graph builder and the emitter touch goes through the
//! [`Runtime`] trait, so builds run unchanged against the real file system
//! ([`native::NativeRuntime`]) or an in-memory tree ([`memory::MemoryRuntime`]).

#[cfg(not(target_family = "wasm"))]
pub mod native;

#[cfg(any(test, feature = "test-utils"))]
pub mod memory;

use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Result type for runtime operations
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors that can occur during runtime operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("runtime error: {0}")]
    Other(String),
}

/// File metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMetadata {
    pub size: u64,
    pub is_dir: bool,
    pub is_file: bool,
}

/// Platform runtime trait.
///
/// Implementations must be cheap to share behind an `Arc`; the builder calls
/// into them from many tasks at once.
#[async_trait]
pub trait Runtime: Send + Sync + std::fmt::Debug {
    /// Read a file.
    async fn read_file(&self, path: &Path) -> RuntimeResult<Vec<u8>>;

    /// Write a file, replacing any existing content.
    async fn write_file(&self, path: &Path, content: &[u8]) -> RuntimeResult<()>;

    /// Metadata for a path; `FileNotFound` when it does not exist.
    async fn metadata(&self, path: &Path) -> RuntimeResult<FileMetadata>;

    /// Check if a path exists
    fn exists(&self, path: &Path) -> bool;

    async fn create_dir(&self, path: &Path, recursive: bool) -> RuntimeResult<()>;

    async fn remove_file(&self, path: &Path) -> RuntimeResult<()>;

    /// Entry names of a directory.
    async fn read_dir(&self, path: &Path) -> RuntimeResult<Vec<String>>;

    /// Working directory that relative paths are resolved against.
    fn get_cwd(&self) -> RuntimeResult<PathBuf>;

    /// Whether `path` is an existing regular file.
    async fn is_file(&self, path: &Path) -> bool {
        self.metadata(path).await.is_ok_and(|meta| meta.is_file)
    }

    /// Whether `path` is an existing directory.
    async fn is_dir(&self, path: &Path) -> bool {
        self.metadata(path).await.is_ok_and(|meta| meta.is_dir)
    }
}
