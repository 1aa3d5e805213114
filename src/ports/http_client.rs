use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Custom error type for outbound HTTP calls
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpClientError {
    /// Error when the remote cannot be reached
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error when request times out
    #[error("Timeout error after {0:?}")]
    TimeoutError(Duration),

    /// Error when the remote returns a non-success status
    #[error("Remote returned error status: {status}, url: {url}")]
    StatusError {
        /// The URL that was requested
        url: String,
        /// The status code returned by the remote
        status: u16,
    },

    /// Error when the response body is not the expected JSON
    #[error("Invalid response body: {0}")]
    DecodeError(String),
}

/// Result type alias for HTTP client operations
pub type HttpClientResult<T> = Result<T, HttpClientError>;

/// Type alias for async JSON responses
pub type JsonFuture<'a> =
    Pin<Box<dyn Future<Output = HttpClientResult<serde_json::Value>> + Send + 'a>>;

/// Type alias for async fire-and-forget posts
pub type PostFuture<'a> = Pin<Box<dyn Future<Output = HttpClientResult<()>> + Send + 'a>>;

/// HttpClient defines the port (interface) for best-effort outbound calls
pub trait HttpClient: Send + Sync + 'static {
    /// GET a URL and decode the body as JSON, bounded by `timeout`
    fn get_json<'a>(&'a self, url: &'a str, timeout: Duration) -> JsonFuture<'a>;

    /// POST a JSON body, succeeding on any 2xx status
    fn post_json<'a>(&'a self, url: &'a str, body: &'a serde_json::Value) -> PostFuture<'a>;
}
