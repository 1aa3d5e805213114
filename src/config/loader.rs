use std::ffi::OsString;

use clap::Parser;
use thiserror::Error;

use crate::config::models::RuntimeConfig;
use crate::config::validation::{ConfigValidator, ValidationError};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] clap::Error),

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Load the runtime configuration from the process arguments and environment.
pub fn load_config() -> ConfigResult<RuntimeConfig> {
    load_config_from(std::env::args_os())
}

/// Load the runtime configuration from explicit arguments; environment
/// variables still fill in anything the arguments leave unset.
pub fn load_config_from<I, T>(args: I) -> ConfigResult<RuntimeConfig>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let config = RuntimeConfig::try_parse_from(args)?;
    ConfigValidator::validate(&config)?;
    Ok(config)
}
