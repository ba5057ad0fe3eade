//! Implementing `UpdateSource` outside the crate.

use std::sync::Arc;

use courier_core::{
    BoxedSource, FetchError, FetchRequest, FetchResult, Message, Update, UpdateKind,
    UpdateSource, async_trait,
};
use parking_lot::Mutex;

/// Serves a fixed list of updates, honouring offset and limit.
struct VecSource {
    updates: Vec<Update>,
    seen: Mutex<Vec<FetchRequest>>,
}

#[async_trait]
impl UpdateSource for VecSource {
    async fn fetch(&self, request: &FetchRequest) -> FetchResult<Vec<Update>> {
        self.seen.lock().push(request.clone());
        if request.offset < 0 {
            return Err(FetchError::Api {
                code: 400,
                description: "bad offset".into(),
            });
        }
        Ok(self
            .updates
            .iter()
            .filter(|u| u.update_id >= request.offset)
            .take(request.limit as usize)
            .cloned()
            .collect())
    }
}

fn text_update(id: i64, text: &str) -> Update {
    Update::new(id, UpdateKind::Message(Message::text_message(id, 1, text)))
}

#[tokio::test]
async fn boxed_source_honours_offset_and_limit() {
    let source: BoxedSource = Arc::new(VecSource {
        updates: (1..=5).map(|id| text_update(id, "hi")).collect(),
        seen: Mutex::new(Vec::new()),
    });

    let request = FetchRequest {
        offset: 3,
        limit: 2,
        timeout: 0,
        allowed_updates: Vec::new(),
    };
    let batch = source.fetch(&request).await.unwrap();
    let ids: Vec<i64> = batch.iter().map(|u| u.update_id).collect();
    assert_eq!(ids, vec![3, 4]);
}

#[tokio::test]
async fn source_errors_surface_to_caller() {
    let source = Arc::new(VecSource {
        updates: Vec::new(),
        seen: Mutex::new(Vec::new()),
    });

    let err = source
        .fetch(&FetchRequest {
            offset: -1,
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "api error 400: bad offset");
    assert_eq!(source.seen.lock().len(), 1);
}
