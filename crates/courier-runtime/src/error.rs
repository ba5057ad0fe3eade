//! Runtime error types.

use thiserror::Error;

pub use crate::config::error::{ConfigError, ConfigResult};

/// Errors that can occur while running a bot.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A shutdown signal handler could not be installed.
    #[error("failed to install signal handler: {0}")]
    Signal(#[source] std::io::Error),

    /// `run` was called while the bot was already running.
    #[error("bot is already running")]
    AlreadyRunning,
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
