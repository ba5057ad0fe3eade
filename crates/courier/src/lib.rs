//! # Courier
//!
//! A long-poll update dispatch framework for chat bots.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌────────┐  channel  ┌────────────┐     ┌────────┐
//! │ UpdateSource │◀────│ Poller │──────────▶│ Dispatcher │────▶│ Router │──▶ handlers
//! └──────────────┘     └────────┘           └────────────┘     └────────┘
//!                                                                  │
//!                                          StateMachine, ChatStore, Dependencies
//! ```
//!
//! - **Poller**: long-polls the source with a forward-only offset and backs
//!   off on failures
//! - **Dispatcher**: handles updates concurrently, one chat at a time
//! - **Router**: runs every handler whose route matches, wrapped in tower
//!   middleware
//! - **StateMachine**: per-chat conversation steps
//! - **Dependencies**: shared instances resolved by type
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use courier::prelude::*;
//!
//! async fn start(ctx: BotContext, update: Arc<Update>) -> Result<(), BoxError> {
//!     let chat_id = update.chat_id().ok_or("no chat")?;
//!     ctx.states().set_state(chat_id, "ask_name")?;
//!     Ok(())
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let bot = Bot::builder(MySource::new())
//!         .router(Router::new().command("start", start).handle_states())
//!         .states(StateGraph::new("start").passive("start").passive("ask_name"))
//!         .build();
//!
//!     bot.run_until_signal().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: TOML configuration files (default)
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use courier_core as core;
pub use courier_framework as framework;
pub use courier_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use courier::prelude::*;
/// ```
pub mod prelude {
    pub use std::sync::Arc;

    // Runtime
    pub use courier_runtime::{Bot, CourierConfig, load_config, logging};

    // Routing and handlers
    pub use courier_framework::{
        BotContext, BoxError, HandlerResult, Middleware, Router, StateGraph, middleware,
    };

    // Update model and the source collaborator
    pub use courier_core::{
        FetchRequest, FetchResult, Update, UpdateKind, UpdateSource, async_trait,
    };
}
