pub mod loader;
pub mod models;
pub mod validation;

pub use loader::{ConfigError, load_config, load_config_from};
pub use models::{LogFormat, RuntimeConfig, RuntimeConfigBuilder, TelemetrySettings};
pub use validation::{ConfigValidator, ValidationError};
