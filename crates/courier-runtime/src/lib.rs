//! Courier Runtime - polling, dispatch and orchestration for Courier bots.
//!
//! This crate provides:
//! - The long-poll loop ([`Poller`]) and its update stream ([`Updates`])
//! - Concurrent, per-chat ordered dispatch ([`Dispatcher`])
//! - Bot assembly and lifecycle ([`Bot`], [`BotBuilder`])
//! - Configuration loading (figment: defaults, TOML/YAML files, `COURIER_*`
//!   environment variables)
//! - Logging setup on `tracing-subscriber`
//!
//! ```ignore
//! use courier_runtime::{Bot, load_config, logging};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config()?;
//!     logging::init_from_config(&config.logging);
//!
//!     let bot = Bot::builder(MySource::new())
//!         .config(config)
//!         .router(router())
//!         .build();
//!
//!     bot.run_until_signal().await?;
//!     Ok(())
//! }
//! ```

pub mod bot;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod poller;

pub use bot::{Bot, BotBuilder};
pub use config::{
    ConfigError, ConfigLoader, ConfigResult, CourierConfig, DispatchConfig, LoggingConfig,
    PollerConfig, load_config, load_config_from_file,
};
pub use dispatcher::Dispatcher;
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use poller::{OffsetHandle, Poller, Updates};
