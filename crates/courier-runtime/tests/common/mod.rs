//! Helpers shared by the runtime integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::time::Duration;

use courier_core::{
    FetchError, FetchRequest, FetchResult, Message, Update, UpdateKind, UpdateSource, async_trait,
};
use parking_lot::Mutex;

/// Answers fetches from a fixed script and records every request.
///
/// Once the script is exhausted, `fetch` never completes, like a long poll
/// with nothing new.
#[derive(Default)]
pub struct ScriptedSource {
    script: Mutex<VecDeque<FetchResult<Vec<Update>>>>,
    requests: Mutex<Vec<FetchRequest>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_ok(self, updates: Vec<Update>) -> Self {
        self.script.lock().push_back(Ok(updates));
        self
    }

    pub fn then_err(self) -> Self {
        self.script
            .lock()
            .push_back(Err(FetchError::Network("connection reset".into())));
        self
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().clone()
    }

    pub fn offsets(&self) -> Vec<i64> {
        self.requests.lock().iter().map(|r| r.offset).collect()
    }

    /// Waits until at least `n` fetches were made.
    pub async fn wait_for_requests(&self, n: usize) {
        while self.requests.lock().len() < n {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }
}

#[async_trait]
impl UpdateSource for ScriptedSource {
    async fn fetch(&self, request: &FetchRequest) -> FetchResult<Vec<Update>> {
        self.requests.lock().push(request.clone());
        let next = self.script.lock().pop_front();
        match next {
            Some(result) => result,
            None => std::future::pending().await,
        }
    }
}

pub fn text_update(update_id: i64, chat_id: i64, text: &str) -> Update {
    Update::new(
        update_id,
        UpdateKind::Message(Message::text_message(update_id, chat_id, text)),
    )
}
