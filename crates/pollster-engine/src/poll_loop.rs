//! The list → diff → dispatch → reap cycle
//!
//! Each round lists the bucket, notifies the webhook about keys that were
//! not new last round, then deletes last round's new keys. Deletion starts
//! only after every notification of the round has finished, so a consumer
//! always gets a full backoff period to fetch an object before it goes away.

use pollster_core::types::{ObjectKey, Snapshot};
use pollster_core::{PollsterConfig, Result};
use pollster_storage::{list_snapshot, ObjectStore};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::differ::diff;
use crate::dispatcher::Dispatcher;
use crate::metrics;
use crate::reaper::Reaper;

#[derive(Debug, Clone)]
pub struct PollOptions {
    pub bucket: String,
    pub prefix: Option<String>,
    pub page_size: i32,
    /// `0` lists until the continuation marker runs out
    pub max_pages: usize,
    pub backoff: Duration,
}

impl PollOptions {
    pub fn from_config(config: &PollsterConfig) -> Self {
        Self {
            bucket: config.storage.bucket.clone(),
            prefix: config.storage.prefix.clone(),
            page_size: config.poll.page_size,
            max_pages: config.poll.max_pages,
            backoff: config.poll.backoff(),
        }
    }
}

/// What one round did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundReport {
    pub listed: usize,
    pub new: usize,
    pub dispatched: usize,
    pub failed: usize,
    pub reaped: usize,
    pub reap_failed: usize,
}

pub struct PollLoop {
    store: Arc<dyn ObjectStore>,
    dispatcher: Dispatcher,
    reaper: Reaper,
    options: PollOptions,
    /// Keys that were new in the last successful round
    previous: Vec<ObjectKey>,
}

impl PollLoop {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        dispatcher: Dispatcher,
        reaper: Reaper,
        options: PollOptions,
    ) -> Self {
        Self {
            store,
            dispatcher,
            reaper,
            options,
            previous: Vec::new(),
        }
    }

    pub fn previous_keys(&self) -> &[ObjectKey] {
        &self.previous
    }

    pub fn options(&self) -> &PollOptions {
        &self.options
    }

    /// Run a single round without sleeping.
    ///
    /// A listing failure is returned as-is and leaves the previous keys
    /// untouched; nothing is dispatched or deleted in that case.
    pub async fn run_once(&mut self) -> Result<RoundReport> {
        let started = Instant::now();
        let snapshot = self.list().await?;
        Ok(self.complete_round(snapshot, started).await)
    }

    /// Poll until `shutdown` is cancelled.
    ///
    /// Cancellation interrupts a pending listing or the backoff sleep. A
    /// dispatch round that has already started runs to completion first.
    pub async fn run(&mut self, shutdown: CancellationToken) {
        info!(
            bucket = %self.options.bucket,
            backoff_secs = self.options.backoff.as_secs(),
            page_size = self.options.page_size,
            "Starting poll loop"
        );

        loop {
            let started = Instant::now();
            let listing = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                listing = self.list() => listing,
            };

            if let Ok(snapshot) = listing {
                self.complete_round(snapshot, started).await;
            }

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.options.backoff) => {}
            }
        }

        info!(
            bucket = %self.options.bucket,
            pending_reap = self.previous.len(),
            "Poll loop stopped"
        );
    }

    async fn list(&self) -> Result<Snapshot> {
        list_snapshot(
            self.store.as_ref(),
            &self.options.bucket,
            self.options.prefix.as_deref(),
            self.options.page_size,
            self.options.max_pages,
        )
        .await
        .map_err(|e| {
            error!(bucket = %self.options.bucket, error = %e, "Failed to list objects, retrying next round");
            metrics::record_list_error();
            e
        })
    }

    async fn complete_round(&mut self, snapshot: Snapshot, started: Instant) -> RoundReport {
        let current = snapshot.into_keys();
        let new_keys = diff(&current, &self.previous);
        metrics::record_listing(current.len(), new_keys.len());

        debug!(
            bucket = %self.options.bucket,
            listed = current.len(),
            new = new_keys.len(),
            "Computed new objects"
        );

        let dispatch = self.dispatcher.dispatch_round(&new_keys).await;

        let expired = std::mem::replace(&mut self.previous, new_keys);
        let reap = self.reaper.reap(&expired).await;

        let report = RoundReport {
            listed: current.len(),
            new: self.previous.len(),
            dispatched: dispatch.dispatched,
            failed: dispatch.failed,
            reaped: reap.deleted,
            reap_failed: reap.failed,
        };

        let elapsed = started.elapsed();
        metrics::record_round(elapsed, self.previous.len());
        info!(
            bucket = %self.options.bucket,
            listed = report.listed,
            new = report.new,
            dispatched = report.dispatched,
            failed = report.failed,
            reaped = report.reaped,
            reap_failed = report.reap_failed,
            elapsed_ms = elapsed.as_millis() as u64,
            "Round complete"
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::tests::{dispatcher_config, issuer, RecordingNotifier};
    use crate::notifier::{Notifier, WebhookNotifier};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pollster_core::types::NotificationPayload;
    use pollster_core::Error;
    use pollster_storage::{MemoryObjectStore, StoreOp};
    use url::Url;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn options() -> PollOptions {
        PollOptions {
            bucket: "inbox".into(),
            prefix: None,
            page_size: 1000,
            max_pages: 1,
            backoff: Duration::from_millis(10),
        }
    }

    fn poll_loop(store: Arc<MemoryObjectStore>, notifier: Arc<dyn Notifier>) -> PollLoop {
        let dispatcher = Dispatcher::new(notifier, issuer(), dispatcher_config(4));
        let reaper = Reaper::new(store.clone(), "inbox");
        PollLoop::new(store, dispatcher, reaper, options())
    }

    fn names(keys: &[ObjectKey]) -> Vec<&str> {
        keys.iter().map(ObjectKey::as_str).collect()
    }

    #[tokio::test]
    async fn test_new_objects_then_reap() {
        let store = Arc::new(MemoryObjectStore::new());
        store.put_object("inbox", "a");
        store.put_object("inbox", "b");
        let notifier = Arc::new(RecordingNotifier::default());
        let mut poll = poll_loop(store.clone(), notifier.clone());

        let first = poll.run_once().await.unwrap();
        assert_eq!(first.listed, 2);
        assert_eq!(first.new, 2);
        assert_eq!(first.dispatched, 2);
        assert_eq!(first.reaped, 0);
        assert_eq!(notifier.notified_keys(), vec!["a", "b"]);
        assert_eq!(names(poll.previous_keys()), vec!["a", "b"]);

        store.put_object("inbox", "c");
        let second = poll.run_once().await.unwrap();
        assert_eq!(second.listed, 3);
        assert_eq!(second.new, 1);
        assert_eq!(second.reaped, 2);
        assert_eq!(notifier.notified_keys(), vec!["a", "b", "c"]);
        assert_eq!(names(poll.previous_keys()), vec!["c"]);
        assert_eq!(store.keys("inbox"), vec!["c"]);

        let third = poll.run_once().await.unwrap();
        assert_eq!(third.new, 0);
        assert_eq!(third.reaped, 1);
        assert!(store.keys("inbox").is_empty());
        assert!(poll.previous_keys().is_empty());
    }

    #[tokio::test]
    async fn test_unchanged_bucket_is_not_renotified() {
        let store = Arc::new(MemoryObjectStore::new());
        store.put_object("inbox", "a");
        let notifier = Arc::new(RecordingNotifier::default());
        let mut poll = poll_loop(store.clone(), notifier.clone());

        poll.run_once().await.unwrap();
        store.fail_deletes_of("a");
        let second = poll.run_once().await.unwrap();

        assert_eq!(second.new, 0);
        assert_eq!(second.reap_failed, 1);
        assert_eq!(notifier.notified_keys(), vec!["a"]);
    }

    /// Records how many deletions had happened when each notification was sent.
    struct OrderingNotifier {
        store: Arc<MemoryObjectStore>,
        seen: Mutex<Vec<(String, usize)>>,
    }

    #[async_trait]
    impl Notifier for OrderingNotifier {
        async fn notify(&self, payload: &NotificationPayload) -> pollster_core::Result<()> {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let deleted = self.store.deleted_keys().len();
            self.seen.lock().push((payload.object.clone(), deleted));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_reaping_starts_after_dispatch_finishes() {
        let store = Arc::new(MemoryObjectStore::new());
        for key in ["a", "b", "c"] {
            store.put_object("inbox", key);
        }
        let notifier = Arc::new(OrderingNotifier {
            store: store.clone(),
            seen: Mutex::new(Vec::new()),
        });
        let mut poll = poll_loop(store.clone(), notifier.clone());

        poll.run_once().await.unwrap();
        for key in ["d", "e", "f"] {
            store.put_object("inbox", key);
        }
        poll.run_once().await.unwrap();

        // Round two's notifications all went out before any of round one's
        // keys were deleted.
        let seen = notifier.seen.lock();
        assert_eq!(seen.len(), 6);
        assert!(seen.iter().all(|(_, deleted)| *deleted == 0));
        assert_eq!(store.deleted_keys().len(), 3);

        let journal = store.journal();
        let last_list = journal
            .iter()
            .rposition(|op| matches!(op, StoreOp::List { .. }))
            .unwrap();
        let first_delete = journal
            .iter()
            .position(|op| matches!(op, StoreOp::Delete { .. }))
            .unwrap();
        assert!(last_list < first_delete);
    }

    #[tokio::test]
    async fn test_each_round_keys_deleted_exactly_once() {
        let store = Arc::new(MemoryObjectStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let mut poll = poll_loop(store.clone(), notifier.clone());

        let mut uploaded = Vec::new();
        for round in 0..5 {
            for i in 0..3 {
                let key = format!("r{}-{}", round, i);
                store.put_object("inbox", &key);
                uploaded.push(key);
            }
            poll.run_once().await.unwrap();
        }
        poll.run_once().await.unwrap();

        let mut deleted = store.deleted_keys();
        deleted.sort();
        uploaded.sort();
        assert_eq!(deleted, uploaded);
        assert!(store.keys("inbox").is_empty());
        assert_eq!(notifier.notified_keys(), uploaded);
    }

    #[tokio::test]
    async fn test_list_failure_keeps_state_and_skips_reaping() {
        let store = Arc::new(MemoryObjectStore::new());
        store.put_object("inbox", "a");
        let notifier = Arc::new(RecordingNotifier::default());
        let mut poll = poll_loop(store.clone(), notifier.clone());

        poll.run_once().await.unwrap();
        store.fail_next_list("connection reset");

        let result = poll.run_once().await;
        assert!(matches!(result, Err(Error::ListFailed { .. })));
        assert_eq!(names(poll.previous_keys()), vec!["a"]);
        assert!(store.deleted_keys().is_empty());

        store.put_object("inbox", "b");
        let report = poll.run_once().await.unwrap();
        assert_eq!(report.new, 1);
        assert_eq!(report.reaped, 1);
        assert_eq!(notifier.notified_keys(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_failing_webhook_still_reaps() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/hook", server.uri())).unwrap();
        let notifier = Arc::new(WebhookNotifier::new(url, Duration::from_secs(5)).unwrap());
        let store = Arc::new(MemoryObjectStore::new());
        let mut poll = poll_loop(store.clone(), notifier);

        for round in 0..4 {
            store.put_object("inbox", &format!("k{}", round));
            let report = poll.run_once().await.unwrap();
            assert_eq!(report.new, 1);
            assert_eq!(report.dispatched, 0);
            assert_eq!(report.failed, 1);
            assert_eq!(report.reaped, if round == 0 { 0 } else { 1 });
        }

        assert_eq!(store.keys("inbox"), vec!["k3"]);
        assert_eq!(server.received_requests().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_prefix_limits_listing() {
        let store = Arc::new(MemoryObjectStore::new());
        store.put_object("inbox", "in/a");
        store.put_object("inbox", "other/b");
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = Dispatcher::new(notifier.clone(), issuer(), dispatcher_config(4));
        let reaper = Reaper::new(store.clone(), "inbox");
        let mut options = options();
        options.prefix = Some("in/".into());
        let mut poll = PollLoop::new(store.clone(), dispatcher, reaper, options);

        let report = poll.run_once().await.unwrap();
        assert_eq!(report.listed, 1);
        assert_eq!(notifier.notified_keys(), vec!["in/a"]);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let store = Arc::new(MemoryObjectStore::new());
        store.put_object("inbox", "a");
        let notifier = Arc::new(RecordingNotifier::default());
        let mut poll = poll_loop(store.clone(), notifier.clone());
        poll.options.backoff = Duration::from_secs(3600);

        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let handle = tokio::spawn(async move {
            poll.run(token).await;
            poll
        });

        // Wait for the first round, then cancel during the long backoff.
        for _ in 0..100 {
            if !notifier.notified_keys().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        shutdown.cancel();

        let poll = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("run did not stop after cancellation")
            .unwrap();
        assert_eq!(names(poll.previous_keys()), vec!["a"]);
        assert_eq!(notifier.notified_keys(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_run_keeps_polling_through_list_errors() {
        let store = Arc::new(MemoryObjectStore::new());
        store.fail_next_list("unavailable");
        store.put_object("inbox", "a");
        let notifier = Arc::new(RecordingNotifier::default());
        let mut poll = poll_loop(store.clone(), notifier.clone());

        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let handle = tokio::spawn(async move { poll.run(token).await });

        for _ in 0..200 {
            if !notifier.notified_keys().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(notifier.notified_keys(), vec!["a"]);
    }
}
