//! Error types for routing, state tracking and the chat store.

use thiserror::Error;

/// Errors reported by the [`StateMachine`](crate::StateMachine).
///
/// Neither variant changes the chat's current state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    /// The requested state was never registered.
    #[error("state `{0}` is not registered")]
    NotFound(String),

    /// The chat is already in the requested state.
    #[error("chat {chat_id} is already in state `{state}`")]
    AlreadyInState {
        /// The chat whose state was being set.
        chat_id: i64,
        /// The state it is already in.
        state: String,
    },
}

/// Result type for state machine operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors reported by the [`ChatStore`](crate::ChatStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// A value could not be converted to or from JSON.
    #[error("store value for key `{key}` could not be converted: {source}")]
    Codec {
        /// The key being read or written.
        key: String,
        /// The underlying serde error.
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for chat store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Returned by filtering middleware when an update is dropped.
///
/// The router treats this error as a silent skip rather than a failure.
#[derive(Debug, Clone, Copy, Default, Error)]
#[error("update skipped")]
pub struct UpdateSkipped;
