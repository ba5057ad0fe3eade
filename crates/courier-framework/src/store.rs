//! Per-chat key/value store.
//!
//! Handlers keep conversation data (a name typed two messages ago, a cart)
//! next to the chat's state:
//!
//! ```rust,ignore
//! ctx.store().set(chat_id, "name", &name)?;
//! let name: Option<String> = ctx.store().get(chat_id, "name")?;
//! ```
//!
//! Values are stored as JSON so any serde type round-trips.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{StoreError, StoreResult};

type ChatData = HashMap<String, Value>;

/// In-memory per-chat key/value store.
#[derive(Debug, Default)]
pub struct ChatStore {
    chats: Mutex<HashMap<i64, ChatData>>,
}

impl ChatStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key` for `chat_id`, replacing any previous value.
    pub fn set<T: Serialize + ?Sized>(&self, chat_id: i64, key: &str, value: &T) -> StoreResult<()> {
        let value = serde_json::to_value(value).map_err(|source| StoreError::Codec {
            key: key.to_string(),
            source,
        })?;
        self.set_value(chat_id, key, value);
        Ok(())
    }

    /// Stores a raw JSON value.
    pub fn set_value(&self, chat_id: i64, key: &str, value: Value) {
        self.chats
            .lock()
            .entry(chat_id)
            .or_default()
            .insert(key.to_string(), value);
    }

    /// Reads the value under `key` for `chat_id`.
    ///
    /// A missing key is `Ok(None)`; a value of another shape is an error.
    pub fn get<T: DeserializeOwned>(&self, chat_id: i64, key: &str) -> StoreResult<Option<T>> {
        self.get_value(chat_id, key)
            .map(|value| {
                serde_json::from_value(value).map_err(|source| StoreError::Codec {
                    key: key.to_string(),
                    source,
                })
            })
            .transpose()
    }

    /// Reads the raw JSON value under `key` for `chat_id`.
    pub fn get_value(&self, chat_id: i64, key: &str) -> Option<Value> {
        self.chats
            .lock()
            .get(&chat_id)
            .and_then(|data| data.get(key))
            .cloned()
    }

    /// Returns `true` if `chat_id` has a value under `key`.
    pub fn contains(&self, chat_id: i64, key: &str) -> bool {
        self.chats
            .lock()
            .get(&chat_id)
            .is_some_and(|data| data.contains_key(key))
    }

    /// Removes and returns the value under `key` for `chat_id`.
    pub fn remove(&self, chat_id: i64, key: &str) -> Option<Value> {
        let mut chats = self.chats.lock();
        let data = chats.get_mut(&chat_id)?;
        let removed = data.remove(key);
        if data.is_empty() {
            chats.remove(&chat_id);
        }
        removed
    }

    /// Drops every value stored for `chat_id`.
    pub fn reset(&self, chat_id: i64) {
        self.chats.lock().remove(&chat_id);
    }

    /// Returns the number of chats with stored data.
    pub fn chat_count(&self) -> usize {
        self.chats.lock().len()
    }
}
