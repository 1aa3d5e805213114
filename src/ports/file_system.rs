use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use thiserror::Error;

/// Error type for artifact storage operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum FileSystemError {
    /// Error when writing an artifact fails
    #[error("Failed to write {path}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error when removing an artifact fails
    #[error("Failed to remove {path}: {source}")]
    RemoveError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for artifact storage operations
pub type FileSystemResult<T> = Result<T, FileSystemError>;

/// Type alias for async artifact operations
pub type FileSystemFuture<'a, T> = Pin<Box<dyn Future<Output = FileSystemResult<T>> + Send + 'a>>;

/// FileSystem defines the port (interface) for persisting generated artifacts
///
/// Every write is a full overwrite; nothing is ever appended.
pub trait FileSystem: Send + Sync + 'static {
    /// Create a directory and all of its parents
    fn ensure_dir<'a>(&'a self, path: &'a Path) -> FileSystemFuture<'a, ()>;

    /// Replace the file at `path` with `contents`, creating parent directories
    fn write<'a>(&'a self, path: &'a Path, contents: &'a [u8]) -> FileSystemFuture<'a, ()>;

    /// Remove a file, treating absence as success
    fn remove_if_exists<'a>(&'a self, path: &'a Path) -> FileSystemFuture<'a, ()>;
}
