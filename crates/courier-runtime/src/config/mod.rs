//! Configuration for the Courier runtime.
//!
//! [`CourierConfig`] is loaded by [`ConfigLoader`] from defaults, TOML/YAML
//! files and `COURIER_*` environment variables, then validated.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    CourierConfig, DispatchConfig, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig,
    MIN_ERROR_BACKOFF_MS, PollerConfig, SpanEventConfig,
};
pub use validation::validate_config;
