use std::io::ErrorKind;
use std::path::Path;

use tokio::fs;

use crate::ports::file_system::{FileSystem, FileSystemError, FileSystemFuture};

/// A file system implementation backed by tokio's async fs
#[derive(Debug, Default, Clone)]
pub struct TokioFileSystem;

impl TokioFileSystem {
    /// Creates a new TokioFileSystem
    ///
    /// This is equivalent to calling `Default::default()` since TokioFileSystem has no state.
    pub fn new() -> Self {
        Self::default()
    }
}

impl FileSystem for TokioFileSystem {
    fn ensure_dir<'a>(&'a self, path: &'a Path) -> FileSystemFuture<'a, ()> {
        Box::pin(async move {
            fs::create_dir_all(path)
                .await
                .map_err(|source| FileSystemError::WriteError {
                    path: path.to_path_buf(),
                    source,
                })
        })
    }

    fn write<'a>(&'a self, path: &'a Path, contents: &'a [u8]) -> FileSystemFuture<'a, ()> {
        Box::pin(async move {
            let write_error = |source| FileSystemError::WriteError {
                path: path.to_path_buf(),
                source,
            };

            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).await.map_err(write_error)?;
            }
            fs::write(path, contents).await.map_err(write_error)?;

            tracing::debug!("Wrote {} bytes to {}", contents.len(), path.display());
            Ok(())
        })
    }

    fn remove_if_exists<'a>(&'a self, path: &'a Path) -> FileSystemFuture<'a, ()> {
        Box::pin(async move {
            match fs::remove_file(path).await {
                Ok(()) => {
                    tracing::debug!("Removed stale artifact {}", path.display());
                    Ok(())
                }
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(source) => Err(FileSystemError::RemoveError {
                    path: path.to_path_buf(),
                    source,
                }),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_creates_parents_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.txt");
        let fs = TokioFileSystem::new();

        fs.write(&path, b"first version").await.unwrap();
        fs.write(&path, b"second").await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
    }

    #[tokio::test]
    async fn test_remove_if_exists_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("boot.log");
        let fs = TokioFileSystem::new();

        fs.write(&path, b"log").await.unwrap();
        fs.remove_if_exists(&path).await.unwrap();
        fs.remove_if_exists(&path).await.unwrap();

        assert!(!path.exists());
    }
}
