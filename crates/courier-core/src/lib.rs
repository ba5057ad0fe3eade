//! # Courier Core
//!
//! Shared building blocks of the Courier bot framework:
//!
//! - **Update model**: [`Update`] and its payload enum [`UpdateKind`], serde
//!   compatible with the Bot API JSON shape.
//! - **Update source**: the [`UpdateSource`] collaborator the poller fetches
//!   batches from, parameterised by a [`FetchRequest`].
//! - **Dependencies**: a type-keyed registry of shared instances
//!   ([`Dependencies`]).
//! - **Errors**: [`FetchError`] and [`DependencyError`].
//!
//! Routing, state tracking and middleware live in `courier-framework`; the
//! poller, dispatcher and configuration live in `courier-runtime`.

pub mod deps;
pub mod error;
pub mod source;
pub mod update;

pub use deps::Dependencies;
pub use error::{DependencyError, DependencyResult, FetchError, FetchResult};
pub use source::{BoxedSource, FetchRequest, UpdateSource};
pub use update::{
    CallbackQuery, Chat, ChatKind, ChatMemberUpdated, Message, Update, UpdateKind, User,
};

/// Re-export of `async_trait` for implementing [`UpdateSource`].
pub use async_trait::async_trait;
