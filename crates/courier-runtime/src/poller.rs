//! The long-poll loop.
//!
//! [`Poller::start`] spawns a task that repeatedly asks the
//! [`UpdateSource`](courier_core::UpdateSource) for the next batch and pushes
//! each update into a bounded channel. The returned [`Updates`] handle is the
//! receiving end: a [`Stream`] of updates that ends once the poller stops.
//!
//! ```text
//!            ┌──────────── cancelled? ──────────────┐
//!            ▼                                      │
//!   fetch(offset, limit, timeout) ── error ──▶ log, back off ──┘
//!            │
//!            ├── [] ─────────────────────────────────┘
//!            │
//!            └── [u1..un] ──▶ send each (blocks when full) ──▶ offset = last + 1
//! ```
//!
//! The offset only moves forward and always points just past the last update
//! handed to the consumer, so a failed fetch is retried with the same offset
//! and no update is confirmed before it was delivered.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use courier_core::{BoxedSource, FetchRequest, Update};
use futures::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, trace, warn};

use crate::config::PollerConfig;

/// The long-poll loop, before it is started.
pub struct Poller {
    source: BoxedSource,
    config: PollerConfig,
    cancel: CancellationToken,
}

impl Poller {
    /// Creates a poller fetching from `source` until `cancel` fires.
    pub fn new(source: BoxedSource, config: PollerConfig, cancel: CancellationToken) -> Self {
        Self {
            source,
            config,
            cancel,
        }
    }

    /// Spawns the poll loop on the current tokio runtime.
    pub fn start(self) -> Updates {
        let (tx, rx) = mpsc::channel(self.config.buffer_size.max(1));
        let offset = Arc::new(AtomicI64::new(self.config.initial_offset.unwrap_or(0)));
        let task = tokio::spawn(
            self.run(tx, Arc::clone(&offset))
                .instrument(info_span!("poller")),
        );

        Updates { rx, offset, task }
    }

    async fn run(self, tx: mpsc::Sender<Update>, offset: Arc<AtomicI64>) {
        let mut cursor = offset.load(Ordering::Acquire);
        let mut backoff = Backoff::new(&self.config);

        info!(
            offset = cursor,
            limit = self.config.limit,
            timeout_secs = self.config.timeout_secs,
            "Poller started"
        );

        'poll: loop {
            if self.cancel.is_cancelled() {
                break;
            }
            if tx.is_closed() {
                debug!("Update receiver dropped");
                break;
            }

            let request = FetchRequest {
                offset: cursor,
                limit: self.config.limit,
                timeout: self.config.timeout_secs,
                allowed_updates: self.config.allowed_updates.clone(),
            };

            let result = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                () = tx.closed() => {
                    debug!("Update receiver dropped");
                    break;
                }
                result = self.source.fetch(&request) => result,
            };

            let updates = match result {
                Ok(updates) => {
                    backoff.reset();
                    updates
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    warn!(
                        offset = cursor,
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "Failed to fetch updates"
                    );
                    tokio::select! {
                        biased;
                        () = self.cancel.cancelled() => break,
                        () = tx.closed() => {
                            debug!("Update receiver dropped");
                            break;
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                    continue;
                }
            };

            if updates.is_empty() {
                trace!(offset = cursor, "Long poll returned no updates");
                continue;
            }
            debug!(offset = cursor, count = updates.len(), "Fetched updates");

            for update in updates {
                if update.update_id < cursor {
                    warn!(
                        update_id = update.update_id,
                        offset = cursor,
                        "Dropping update below the current offset"
                    );
                    continue;
                }

                let Some(next) = update.update_id.checked_add(1) else {
                    warn!(
                        update_id = update.update_id,
                        "Dropping update with an id the offset cannot move past"
                    );
                    continue;
                };
                tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => break 'poll,
                    sent = tx.send(update) => {
                        if sent.is_err() {
                            debug!("Update receiver dropped");
                            break 'poll;
                        }
                    }
                }
                cursor = next;
                offset.store(cursor, Ordering::Release);
            }
        }

        info!(offset = cursor, "Poller stopped");
    }
}

/// Wait between failed fetches.
struct Backoff {
    base: Duration,
    max: Duration,
    multiplier: f64,
    current: Duration,
}

impl Backoff {
    fn new(config: &PollerConfig) -> Self {
        let base = config.error_backoff();
        Self {
            base,
            max: config.max_error_backoff(),
            multiplier: config.backoff_multiplier,
            current: base,
        }
    }

    /// Returns the wait for this failure and grows it for the next one.
    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        let grown = self.current.as_secs_f64() * self.multiplier;
        self.current = Duration::try_from_secs_f64(grown)
            .map_or(self.max, |d| d.min(self.max))
            .max(self.base);
        delay
    }

    fn reset(&mut self) {
        self.current = self.base;
    }
}

// ============================================================================
// Updates
// ============================================================================

/// The receiving end of a started [`Poller`].
///
/// Yields updates in the order the source returned them and ends once the
/// poller has stopped and every buffered update was taken.
pub struct Updates {
    rx: mpsc::Receiver<Update>,
    offset: Arc<AtomicI64>,
    task: JoinHandle<()>,
}

impl Updates {
    /// Receives the next update; `None` once the poller has stopped.
    pub async fn recv(&mut self) -> Option<Update> {
        self.rx.recv().await
    }

    /// Returns the offset the next fetch will use.
    pub fn offset(&self) -> i64 {
        self.offset.load(Ordering::Acquire)
    }

    /// Returns `true` once the poll task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Returns a handle reading the offset after `self` is consumed.
    pub fn offset_handle(&self) -> OffsetHandle {
        OffsetHandle(Arc::clone(&self.offset))
    }
}

impl Stream for Updates {
    type Item = Update;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Update>> {
        self.rx.poll_recv(cx)
    }
}

impl std::fmt::Debug for Updates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Updates")
            .field("offset", &self.offset())
            .field("finished", &self.is_finished())
            .finish_non_exhaustive()
    }
}

/// Shared read access to a poller's offset.
#[derive(Debug, Clone)]
pub struct OffsetHandle(Arc<AtomicI64>);

impl OffsetHandle {
    /// Returns the offset the next fetch will use.
    pub fn get(&self) -> i64 {
        self.0.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backoff(base_ms: u64, multiplier: f64, max_ms: u64) -> Backoff {
        Backoff::new(&PollerConfig {
            error_backoff_ms: base_ms,
            backoff_multiplier: multiplier,
            max_error_backoff_ms: max_ms,
            ..Default::default()
        })
    }

    #[test]
    fn test_fixed_backoff() {
        let mut b = backoff(5000, 1.0, 60_000);
        for _ in 0..3 {
            assert_eq!(b.next_delay(), Duration::from_secs(5));
        }
    }

    #[test]
    fn test_exponential_backoff_caps_and_resets() {
        let mut b = backoff(1000, 2.0, 5000);
        let delays: Vec<u64> = (0..5).map(|_| b.next_delay().as_millis() as u64).collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 5000, 5000]);

        b.reset();
        assert_eq!(b.next_delay(), Duration::from_secs(1));
    }
}
