//! The poll loop against a scripted source.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use common::{ScriptedSource, text_update};
use courier_core::{FetchRequest, FetchResult, Update, UpdateSource, async_trait};
use courier_runtime::{Poller, PollerConfig};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

async fn drain(updates: &mut courier_runtime::Updates, n: usize) -> Vec<i64> {
    let mut ids = Vec::with_capacity(n);
    for _ in 0..n {
        let update = updates.recv().await.expect("poller stopped early");
        ids.push(update.update_id);
    }
    ids
}

#[tokio::test(start_paused = true)]
async fn offset_only_moves_forward() {
    let source = Arc::new(
        ScriptedSource::new()
            .then_ok(vec![text_update(1, 1, "a"), text_update(2, 1, "b")])
            .then_ok(vec![])
            .then_err()
            .then_ok(vec![text_update(3, 1, "c")])
            .then_ok(vec![text_update(2, 1, "old"), text_update(4, 1, "d")]),
    );
    let cancel = CancellationToken::new();
    let mut updates = Poller::new(source.clone(), PollerConfig::default(), cancel.clone()).start();

    assert_eq!(drain(&mut updates, 4).await, vec![1, 2, 3, 4]);

    cancel.cancel();
    assert!(updates.recv().await.is_none());
    assert_eq!(updates.offset(), 5);

    let offsets = source.offsets();
    assert_eq!(&offsets[..5], &[0, 3, 3, 3, 4]);
    assert!(offsets.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test(start_paused = true)]
async fn failed_fetch_retries_same_offset() {
    let source = Arc::new(
        ScriptedSource::new()
            .then_err()
            .then_err()
            .then_ok(vec![text_update(7, 1, "hi")]),
    );
    let cancel = CancellationToken::new();
    let config = PollerConfig::default().with_initial_offset(7);
    let mut updates = Poller::new(source.clone(), config, cancel.clone()).start();

    assert_eq!(drain(&mut updates, 1).await, vec![7]);
    assert_eq!(&source.offsets()[..3], &[7, 7, 7]);

    cancel.cancel();
    assert!(updates.recv().await.is_none());
    assert_eq!(updates.offset(), 8);
}

#[tokio::test(start_paused = true)]
async fn request_carries_limit_and_timeout() {
    let source = Arc::new(ScriptedSource::new());
    let cancel = CancellationToken::new();
    let config = PollerConfig::default()
        .with_limit(2)
        .with_timeout(10)
        .with_allowed_updates(vec!["message".to_string()]);
    let updates = Poller::new(source.clone(), config, cancel.clone()).start();

    source.wait_for_requests(1).await;
    let request = &source.requests()[0];
    assert_eq!(request.limit, 2);
    assert_eq!(request.timeout, 10);
    assert_eq!(request.allowed_updates, vec!["message".to_string()]);

    cancel.cancel();
    assert_eq!(updates.collect::<Vec<_>>().await.len(), 0);
}

#[tokio::test]
async fn cancellation_interrupts_backoff() {
    let source = Arc::new(ScriptedSource::new().then_err());
    let cancel = CancellationToken::new();
    let config = PollerConfig::default().with_error_backoff(Duration::from_secs(5));
    let mut updates = Poller::new(source.clone(), config, cancel.clone()).start();

    source.wait_for_requests(1).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let started = Instant::now();
    cancel.cancel();
    let ended = tokio::time::timeout(Duration::from_millis(100), updates.recv()).await;

    assert!(matches!(ended, Ok(None)));
    assert!(started.elapsed() < Duration::from_millis(100));
    assert_eq!(source.requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancellation_while_buffer_is_full() {
    let source = Arc::new(ScriptedSource::new().then_ok(vec![
        text_update(1, 1, "a"),
        text_update(2, 1, "b"),
        text_update(3, 1, "c"),
    ]));
    let cancel = CancellationToken::new();
    let config = PollerConfig::default().with_buffer_size(1);
    let updates = Poller::new(source.clone(), config, cancel.clone()).start();

    source.wait_for_requests(1).await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    cancel.cancel();

    let offset = updates.offset_handle();
    let delivered: Vec<i64> = updates.map(|u| u.update_id).collect().await;
    assert_eq!(delivered, vec![1]);
    assert_eq!(offset.get(), 2);
    assert_eq!(source.requests().len(), 1);
}

/// Long-polls for 10ms and never has anything new.
#[derive(Default)]
struct IdleSource {
    fetches: AtomicUsize,
}

#[async_trait]
impl UpdateSource for IdleSource {
    async fn fetch(&self, _request: &FetchRequest) -> FetchResult<Vec<Update>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(Vec::new())
    }
}

#[tokio::test(start_paused = true)]
async fn dropping_updates_stops_polling() {
    let source = Arc::new(IdleSource::default());
    let updates = Poller::new(
        source.clone(),
        PollerConfig::default(),
        CancellationToken::new(),
    )
    .start();

    tokio::time::sleep(Duration::from_millis(25)).await;
    let before = source.fetches.load(Ordering::SeqCst);
    assert!(before >= 1);

    drop(updates);
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert!(source.fetches.load(Ordering::SeqCst) <= before + 1);
}

#[tokio::test(start_paused = true)]
async fn dropping_updates_interrupts_backoff() {
    let source = Arc::new(
        ScriptedSource::new()
            .then_err()
            .then_ok(vec![text_update(1, 1, "a")]),
    );
    let config = PollerConfig::default().with_error_backoff(Duration::from_secs(5));
    let updates = Poller::new(source.clone(), config, CancellationToken::new()).start();

    source.wait_for_requests(1).await;
    drop(updates);
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(source.requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn update_at_max_id_is_dropped() {
    let source = Arc::new(
        ScriptedSource::new().then_ok(vec![text_update(5, 1, "a"), text_update(i64::MAX, 1, "b")]),
    );
    let cancel = CancellationToken::new();
    let mut updates = Poller::new(source.clone(), PollerConfig::default(), cancel.clone()).start();

    assert_eq!(drain(&mut updates, 1).await, vec![5]);
    source.wait_for_requests(2).await;
    assert_eq!(source.offsets()[1], 6);

    cancel.cancel();
    assert!(updates.recv().await.is_none());
    assert_eq!(updates.offset(), 6);
}
