//! The update source collaborator.
//!
//! The poller never talks to the network itself. It asks an [`UpdateSource`]
//! for the next batch, passing the cursor and limits in a [`FetchRequest`].
//! An HTTP client for the Bot API `getUpdates` endpoint, a stdin reader or an
//! in-memory script used by tests all plug in here.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::FetchResult;
use crate::update::Update;

/// Parameters of one long-poll request.
///
/// Serializes to the `getUpdates` parameter object; an empty
/// `allowed_updates` list is omitted so the platform keeps its default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    /// Identifier of the first update to return.
    pub offset: i64,
    /// Maximum number of updates to return.
    pub limit: u32,
    /// Long-poll timeout in seconds.
    pub timeout: u32,
    /// Update kinds to receive.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_updates: Vec<String>,
}

/// A source of update batches.
///
/// `fetch` must return updates with ids at or above `request.offset`, in
/// ascending order, and at most `request.limit` of them. An empty batch means
/// the long-poll timed out with nothing new.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Fetches the next batch of updates.
    async fn fetch(&self, request: &FetchRequest) -> FetchResult<Vec<Update>>;
}

/// Shared, type-erased update source.
pub type BoxedSource = Arc<dyn UpdateSource>;

#[async_trait]
impl<S: UpdateSource + ?Sized> UpdateSource for Arc<S> {
    async fn fetch(&self, request: &FetchRequest) -> FetchResult<Vec<Update>> {
        (**self).fetch(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_omits_empty_allowed_updates() {
        let request = FetchRequest {
            offset: 7,
            limit: 100,
            timeout: 30,
            allowed_updates: Vec::new(),
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({ "offset": 7, "limit": 100, "timeout": 30 })
        );
    }

    #[test]
    fn test_request_keeps_allowed_updates() {
        let request = FetchRequest {
            allowed_updates: vec!["message".into(), "callback_query".into()],
            ..Default::default()
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["allowed_updates"], json!(["message", "callback_query"]));
    }
}
