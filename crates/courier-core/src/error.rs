//! Error types shared by the Courier crates.
//!
//! Framework-level errors (like `StateError`) are defined in courier-framework,
//! runtime errors in courier-runtime.

use thiserror::Error;

// =============================================================================
// Fetch Errors
// =============================================================================

/// Errors an [`UpdateSource`](crate::UpdateSource) can report.
///
/// Every variant is treated as transient by the poller: it is logged, the poller
/// backs off and the same offset is requested again.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The request did not reach the platform or the connection dropped.
    #[error("network error: {0}")]
    Network(String),

    /// The platform answered with `ok: false`.
    #[error("api error {code}: {description}")]
    Api {
        /// Error code reported by the platform.
        code: i32,
        /// Human readable description.
        description: String,
    },

    /// The response body could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// The source has been closed and will not produce more updates.
    #[error("update source closed")]
    Closed,
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<std::io::Error> for FetchError {
    fn from(err: std::io::Error) -> Self {
        Self::Network(err.to_string())
    }
}

/// Result type for fetch operations.
pub type FetchResult<T> = Result<T, FetchError>;

// =============================================================================
// Dependency Errors
// =============================================================================

/// Errors from the dependency registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DependencyError {
    /// No instance was provided for the requested type.
    #[error("no dependency provided for type `{0}`")]
    NotFound(&'static str),
}

/// Result type for dependency lookups.
pub type DependencyResult<T> = Result<T, DependencyError>;
