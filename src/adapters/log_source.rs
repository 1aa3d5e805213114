use std::io::ErrorKind;
use std::path::PathBuf;

use crate::ports::log_source::{LogReadFuture, LogSource};

/// Reads the tunnel client's log file from disk on every poll
#[derive(Debug, Clone)]
pub struct FileLogSource {
    path: PathBuf,
}

impl FileLogSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl LogSource for FileLogSource {
    fn read_log(&self) -> LogReadFuture<'_> {
        Box::pin(async move {
            match tokio::fs::read(&self.path).await {
                // The tunnel client may be mid-write; tolerate partial UTF-8.
                Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_existing_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("boot.log");
        std::fs::write(&path, "INF |  https://abc.trycloudflare.com  |").unwrap();

        let source = FileLogSource::new(&path);
        let content = source.read_log().await.unwrap().unwrap();
        assert!(content.contains("abc.trycloudflare.com"));
    }

    #[tokio::test]
    async fn test_absent_log_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileLogSource::new(dir.path().join("boot.log"));
        assert!(source.read_log().await.unwrap().is_none());
    }
}
