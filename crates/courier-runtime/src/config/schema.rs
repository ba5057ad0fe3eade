//! Configuration schema definitions.
//!
//! Every field has a default, so an empty file (or no file at all) is a valid
//! configuration. Durations are plain integer fields with their unit in the
//! name; the accessors return [`Duration`]s.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CourierConfig {
    /// Long-poll settings.
    #[serde(default)]
    pub poller: PollerConfig,

    /// Dispatch concurrency settings.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

// =============================================================================
// Poller
// =============================================================================

/// Long-poll settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Long-poll timeout passed to the source, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u32,

    /// Maximum number of updates per fetch.
    #[serde(default = "default_limit")]
    pub limit: u32,

    /// Update kinds to receive; empty keeps the platform default.
    #[serde(default)]
    pub allowed_updates: Vec<String>,

    /// Wait after a failed fetch, in milliseconds.
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,

    /// Factor applied to the wait after each consecutive failure.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Upper bound of the wait after failures, in milliseconds.
    #[serde(default = "default_max_error_backoff_ms")]
    pub max_error_backoff_ms: u64,

    /// Capacity of the channel between the poller and its consumer.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Offset of the first request; `None` starts from the oldest unconfirmed update.
    #[serde(default)]
    pub initial_offset: Option<i64>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            limit: default_limit(),
            allowed_updates: Vec::new(),
            error_backoff_ms: default_error_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_error_backoff_ms: default_max_error_backoff_ms(),
            buffer_size: default_buffer_size(),
            initial_offset: None,
        }
    }
}

impl PollerConfig {
    /// Sets the long-poll timeout.
    pub fn with_timeout(mut self, secs: u32) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Sets the batch size.
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    /// Sets the update kinds to receive.
    pub fn with_allowed_updates<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_updates = kinds.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the wait after a failed fetch.
    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff_ms = backoff.as_millis() as u64;
        self
    }

    /// Makes consecutive failures wait `multiplier` times longer, up to `max`.
    pub fn with_exponential_backoff(mut self, multiplier: f64, max: Duration) -> Self {
        self.backoff_multiplier = multiplier;
        self.max_error_backoff_ms = max.as_millis() as u64;
        self
    }

    /// Sets the channel capacity.
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Sets the offset of the first request.
    pub fn with_initial_offset(mut self, offset: i64) -> Self {
        self.initial_offset = Some(offset);
        self
    }

    /// Returns the wait after the first failed fetch, never below
    /// [`MIN_ERROR_BACKOFF_MS`].
    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms.max(MIN_ERROR_BACKOFF_MS))
    }

    /// Returns the upper bound of the wait after failures.
    pub fn max_error_backoff(&self) -> Duration {
        Duration::from_millis(self.max_error_backoff_ms).max(self.error_backoff())
    }
}

fn default_timeout_secs() -> u32 {
    30
}

fn default_limit() -> u32 {
    100
}

/// Shortest wait between failed fetches.
pub const MIN_ERROR_BACKOFF_MS: u64 = 100;

fn default_error_backoff_ms() -> u64 {
    5000
}

fn default_backoff_multiplier() -> f64 {
    1.0
}

fn default_max_error_backoff_ms() -> u64 {
    60_000
}

fn default_buffer_size() -> usize {
    100
}

// =============================================================================
// Dispatch
// =============================================================================

/// Dispatch concurrency settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Maximum number of updates handled at the same time.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Handle updates of the same chat one at a time, in arrival order.
    #[serde(default = "default_serialize_chats")]
    pub serialize_chats: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            serialize_chats: default_serialize_chats(),
        }
    }
}

fn default_workers() -> usize {
    16
}

fn default_serialize_chats() -> bool {
    true
}

// =============================================================================
// Logging
// =============================================================================

/// Logging settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Base level; `RUST_LOG` takes precedence when set.
    #[serde(default)]
    pub level: LogLevel,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Output destination.
    #[serde(default)]
    pub output: LogOutput,

    /// File written when `output` is `file`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    /// Rotation of the log file.
    #[serde(default)]
    pub rotation: LogRotation,

    /// Span lifecycle events to log.
    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Include thread ids.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include file and line of each event.
    #[serde(default)]
    pub file_location: bool,

    /// Per-module levels, e.g. `courier_runtime = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

/// Log level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Returns the level as used in filter directives.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Converts to a `tracing` level.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature; falls back to `full` without it.
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Log file rotation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}
