pub mod config;
pub mod error;
pub mod load;
pub mod logging;
pub mod merge;
pub mod validate;

pub use config::{BreakpointConfig, Config, LogConfig, LogLevel, SessionConfig};
pub use error::ConfigError;
pub use load::{explicit_config_path, load_config, load_from_str, CONFIG_ENV_VAR, CONFIG_FILE_NAME};
