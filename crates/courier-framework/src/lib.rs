//! # Courier Framework
//!
//! Routing, middleware and conversation state on top of `courier-core`.
//!
//! - [`Router`]: matches updates against routes (commands, text, callback
//!   data, any message, anything) and runs every matching handler.
//! - [`Middleware`]: tower-based decorators, either around matched handlers
//!   or around the whole dispatch.
//! - [`StateMachine`] and [`StateGraph`]: per-chat conversation state.
//! - [`ChatStore`]: per-chat key/value data.
//! - [`BotContext`]: the handle passed to every handler, tying the above to
//!   the dependency registry and the shutdown token.
//!
//! ```rust,ignore
//! use courier_framework::{BotContext, Router, middleware};
//!
//! async fn start(ctx: BotContext, update: Arc<Update>) { /* ... */ }
//!
//! let router = Router::new()
//!     .use_global(middleware::logging())
//!     .command("start", start)
//!     .handle_states();
//! ```

pub mod context;
pub mod error;
pub mod handler;
pub mod middleware;
pub mod route;
pub mod router;
pub mod state;
pub mod store;

pub use context::{BotContext, BotContextBuilder};
pub use error::{StateError, StateResult, StoreError, StoreResult, UpdateSkipped};
pub use handler::{BoxedHandler, Handler, HandlerResult, IntoHandlerResult, into_handler};
pub use middleware::{BoxedService, Middleware, Next, Request};
pub use route::{Route, RouteKind, normalize_command};
pub use router::{ErrorHook, Router};
pub use state::{Condition, StateGraph, StateMachine, state_handler};
pub use store::ChatStore;

pub use tower::BoxError;
