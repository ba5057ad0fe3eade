//! Concurrent dispatch of polled updates.
//!
//! The [`Dispatcher`] drains a stream of updates and runs each one through
//! the [`Router`] on its own task. At most `workers` updates are handled at a
//! time; when every worker is busy, reading from the stream pauses, which in
//! turn makes the poller block on its full channel.
//!
//! With `serialize_chats` on, updates of the same chat are handled one after
//! another in arrival order, so state transitions of one conversation never
//! race. Updates of different chats still run concurrently.

use std::collections::HashMap;
use std::sync::Arc;

use courier_core::Update;
use courier_framework::{BotContext, Router};
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{Semaphore, oneshot};
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, info, trace};

use crate::config::DispatchConfig;

/// Completion signal of the last task queued for a chat.
struct ChatTail {
    seq: u64,
    done: oneshot::Receiver<()>,
}

/// An update's place in its chat's queue.
struct ChatTurn {
    chat_id: i64,
    previous: Option<oneshot::Receiver<()>>,
    done: oneshot::Sender<()>,
}

/// Runs updates through a router with bounded concurrency.
pub struct Dispatcher {
    router: Router,
    ctx: BotContext,
    config: DispatchConfig,
    permits: Arc<Semaphore>,
    tails: Arc<Mutex<HashMap<i64, ChatTail>>>,
}

impl Dispatcher {
    /// Creates a dispatcher.
    pub fn new(router: Router, ctx: BotContext, config: DispatchConfig) -> Self {
        let workers = config.workers.max(1);
        Self {
            router,
            ctx,
            config,
            permits: Arc::new(Semaphore::new(workers)),
            tails: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Handles every update of `updates` and returns once the stream has
    /// ended and all started handlers have finished.
    pub async fn run<S>(&self, updates: S)
    where
        S: Stream<Item = Update>,
    {
        let mut updates = std::pin::pin!(updates);
        let mut tasks = JoinSet::new();
        let mut seq: u64 = 0;

        info!(
            workers = self.config.workers,
            serialize_chats = self.config.serialize_chats,
            "Dispatcher started"
        );

        while let Some(update) = updates.next().await {
            let Ok(permit) = Arc::clone(&self.permits).acquire_owned().await else {
                break;
            };
            reap(&mut tasks);

            seq += 1;
            let update = Arc::new(update);
            let turn = self.enqueue(&update, seq);

            let router = self.router.clone();
            let ctx = self.ctx.clone();
            let tails = Arc::clone(&self.tails);
            let span = tracing::debug_span!("dispatch", update_id = update.update_id);

            tasks.spawn(
                async move {
                    let turn = match turn {
                        Some(ChatTurn {
                            chat_id,
                            previous: Some(previous),
                            done,
                        }) => {
                            trace!(chat_id, "Waiting for previous update of chat");
                            let _ = previous.await;
                            Some((chat_id, done))
                        }
                        Some(ChatTurn { chat_id, done, .. }) => Some((chat_id, done)),
                        None => None,
                    };

                    router.process(&ctx, update).await;

                    if let Some((chat_id, done)) = turn {
                        let _ = done.send(());
                        let mut tails = tails.lock();
                        if tails.get(&chat_id).is_some_and(|tail| tail.seq == seq) {
                            tails.remove(&chat_id);
                        }
                    }
                    drop(permit);
                }
                .instrument(span),
            );
        }

        debug!(in_flight = tasks.len(), "Update stream ended, waiting for handlers");
        while let Some(result) = tasks.join_next().await {
            log_join_result(result);
        }
        info!("Dispatcher stopped");
    }

    /// Registers `update` as the newest of its chat.
    fn enqueue(&self, update: &Update, seq: u64) -> Option<ChatTurn> {
        if !self.config.serialize_chats {
            return None;
        }
        let chat_id = update.chat_id()?;
        let (tx, rx) = oneshot::channel();
        let previous = self
            .tails
            .lock()
            .insert(chat_id, ChatTail { seq, done: rx })
            .map(|tail| tail.done);
        Some(ChatTurn {
            chat_id,
            previous,
            done: tx,
        })
    }

    /// Returns the number of chats with an update still queued or running.
    pub fn busy_chats(&self) -> usize {
        self.tails.lock().len()
    }
}

fn reap(tasks: &mut JoinSet<()>) {
    while let Some(result) = tasks.try_join_next() {
        log_join_result(result);
    }
}

fn log_join_result(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            error!(error = %e, "Update handler panicked");
        } else {
            debug!(error = %e, "Update handler cancelled");
        }
    }
}
