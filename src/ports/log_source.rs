use std::future::Future;
use std::pin::Pin;

/// Type alias for async log reads
pub type LogReadFuture<'a> = Pin<Box<dyn Future<Output = std::io::Result<Option<String>>> + Send + 'a>>;

/// LogSource defines the port for reading the tunnel client's log stream
pub trait LogSource: Send + Sync + 'static {
    /// Read everything logged so far, or `None` when no log exists yet
    fn read_log(&self) -> LogReadFuture<'_>;
}
