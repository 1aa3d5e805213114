pub mod file_system;
pub mod http;
pub mod http_client;
pub mod log_source;
pub mod process;

pub use file_system::TokioFileSystem;
pub use http::SubscriptionServer;
pub use http_client::ReqwestHttpClient;
pub use log_source::FileLogSource;
pub use process::DetachedSpawner;
