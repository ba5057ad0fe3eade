//! An update source reading chat messages from stdin.
//!
//! Every line typed becomes a text message in one chat. Updates stay buffered
//! until the poller asks for an offset past them, so a batch is re-served if
//! it was never confirmed.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use courier::core::{FetchError, FetchRequest, FetchResult, Message, Update, UpdateKind};
use courier::prelude::{UpdateSource, async_trait};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct ConsoleSource {
    chat_id: i64,
    lines: tokio::sync::Mutex<mpsc::Receiver<String>>,
    unconfirmed: parking_lot::Mutex<VecDeque<Update>>,
    next_id: AtomicI64,
    on_eof: CancellationToken,
}

impl ConsoleSource {
    /// Starts reading stdin. `on_eof` is cancelled once every line has been
    /// fetched and stdin is closed.
    pub fn spawn(chat_id: i64, on_eof: CancellationToken) -> Self {
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) if line.trim().is_empty() => continue,
                    Ok(Some(line)) => {
                        if tx.send(line).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "Failed to read stdin");
                        break;
                    }
                }
            }
            debug!("Stdin reader finished");
        });

        Self {
            chat_id,
            lines: tokio::sync::Mutex::new(rx),
            unconfirmed: parking_lot::Mutex::new(VecDeque::new()),
            next_id: AtomicI64::new(1),
            on_eof,
        }
    }

    fn message(&self, text: String) -> Update {
        let update_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Update::new(
            update_id,
            UpdateKind::Message(Message::text_message(update_id, self.chat_id, text)),
        )
    }
}

#[async_trait]
impl UpdateSource for ConsoleSource {
    async fn fetch(&self, request: &FetchRequest) -> FetchResult<Vec<Update>> {
        let limit = request.limit.max(1) as usize;
        {
            let mut unconfirmed = self.unconfirmed.lock();
            unconfirmed.retain(|u| u.update_id >= request.offset);
            if !unconfirmed.is_empty() {
                return Ok(unconfirmed.iter().take(limit).cloned().collect());
            }
        }

        let mut lines = self.lines.lock().await;
        let wait = Duration::from_secs(u64::from(request.timeout.max(1)));
        let first = match tokio::time::timeout(wait, lines.recv()).await {
            Err(_) => return Ok(Vec::new()),
            Ok(None) => {
                info!("Stdin closed, stopping");
                self.on_eof.cancel();
                return Err(FetchError::Closed);
            }
            Ok(Some(line)) => line,
        };

        let mut batch = vec![self.message(first)];
        while batch.len() < limit {
            match lines.try_recv() {
                Ok(line) => batch.push(self.message(line)),
                Err(_) => break,
            }
        }

        self.unconfirmed.lock().extend(batch.iter().cloned());
        Ok(batch)
    }
}
