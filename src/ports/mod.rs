pub mod file_system;
pub mod http_client;
pub mod http_server;
pub mod log_source;
pub mod process;
