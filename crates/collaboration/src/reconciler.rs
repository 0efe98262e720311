/// Remote reconciliation: the poll channel, push-signal handling, and the
/// refetch coordinator both channels go through.
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    ActivityEntry, ActivityFeed, ChangeSignal, DocumentBackend, DocumentModel, OperationsPage,
    Origin, Result, SyncConfig, UserId,
};

/// What one operations page did to the local document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub items: usize,
    pub own_items: usize,
    pub applied: usize,
    pub skipped: usize,
    pub undecodable: usize,
    pub version: u64,
}

impl BatchSummary {
    /// Items from other writers that carried nothing replayable.
    pub fn has_gap(&self) -> bool {
        self.undecodable > 0 || self.skipped > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    SkippedRecentEdit,
    Synced(BatchSummary),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOutcome {
    OwnSignal,
    SuppressedRecentEdit,
    Scheduled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefetchOutcome {
    Refetched { version: u64 },
    InFlight,
    Throttled,
    SuppressedRecentEdit,
}

#[derive(Default)]
struct Coordinator {
    in_flight: bool,
    last_refetch: Option<Instant>,
    generation: u64,
}

/// Clears the in-flight flag even when the refetch task is aborted.
struct InFlightGuard<'a>(&'a Mutex<Coordinator>);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut coordinator = self.0.lock();
        coordinator.in_flight = false;
        coordinator.last_refetch = Some(Instant::now());
    }
}

pub struct Reconciler {
    user_id: UserId,
    document: Arc<dyn DocumentModel>,
    backend: Arc<dyn DocumentBackend>,
    feed: Arc<ActivityFeed>,
    config: SyncConfig,
    coordinator: Mutex<Coordinator>,
    shutdown: CancellationToken,
}

impl Reconciler {
    pub fn new(
        user_id: UserId,
        document: Arc<dyn DocumentModel>,
        backend: Arc<dyn DocumentBackend>,
        feed: Arc<ActivityFeed>,
        config: SyncConfig,
    ) -> Self {
        Self {
            user_id,
            document,
            backend,
            feed,
            config,
            coordinator: Mutex::new(Coordinator::default()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Stops the loops and any pending debounced refetch.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// One "operations since my version" cycle.
    pub async fn poll_once(self: &Arc<Self>) -> Result<PollOutcome> {
        if self.within_recency_window(Utc::now()) {
            debug!("skipping poll, local edit in flight");
            return Ok(PollOutcome::SkippedRecentEdit);
        }

        let since = self.document.known_version();
        let page = self.backend.fetch_operations(since).await?;
        let summary = self.process_page(page);

        if summary.has_gap() {
            debug!(
                undecodable = summary.undecodable,
                skipped = summary.skipped,
                "operation batch incomplete, scheduling refetch"
            );
            self.schedule_refetch();
        }
        Ok(PollOutcome::Synced(summary))
    }

    /// Replays other writers' operations and advances the known version.
    /// Items authored by this session only reach the activity feed.
    pub fn process_page(&self, page: OperationsPage) -> BatchSummary {
        let mut summary = BatchSummary {
            items: page.operations.len(),
            ..BatchSummary::default()
        };

        let mut items = page.operations;
        items.sort_by_key(|item| item.version);

        for item in &items {
            let own = item.user_id == self.user_id;
            let origin = if own { Origin::Local } else { Origin::Remote };
            self.feed.record(ActivityEntry::from_item(item, origin));

            if own {
                summary.own_items += 1;
                continue;
            }

            let (operations, failed) = item.decode_operations();
            summary.undecodable += failed;
            if operations.is_empty() {
                if failed == 0 && item.data.get("operations").is_none() {
                    // Legacy payload with no granular operations.
                    summary.undecodable += 1;
                }
                continue;
            }

            let report = self.document.apply_remote(&operations);
            summary.applied += report.applied;
            summary.skipped += report.skipped.len();
            for skipped in &report.skipped {
                debug!(kind = %skipped.kind, "skipped remote operation: {}", skipped.reason);
            }
        }

        let version = items
            .iter()
            .map(|item| item.version)
            .fold(page.current_version, u64::max);
        self.document.advance_version(version);
        summary.version = self.document.known_version();

        if summary.applied > 0 {
            info!(
                applied = summary.applied,
                version = summary.version,
                "applied remote operations"
            );
        }
        summary
    }

    /// Polls on the configured cadence until shut down. Failures are logged
    /// and retried on the next tick.
    pub async fn run_poll_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if let Err(e) = self.poll_once().await {
                warn!("poll failed: {}", e);
            }
        }
        debug!("poll loop stopped");
    }

    /// Feeds push signals into the coordinator until the sender side closes
    /// or the reconciler shuts down.
    pub async fn run_signal_loop(self: Arc<Self>, mut signals: mpsc::UnboundedReceiver<ChangeSignal>) {
        loop {
            let signal = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                signal = signals.recv() => match signal {
                    Some(signal) => signal,
                    None => break,
                },
            };
            self.handle_signal(&signal);
        }
        debug!("signal loop stopped");
    }

    /// Recency-gates a push signal and schedules a debounced refetch.
    pub fn handle_signal(self: &Arc<Self>, signal: &ChangeSignal) -> SignalOutcome {
        if signal.source == self.user_id.as_str() {
            return SignalOutcome::OwnSignal;
        }
        if self.within_recency_window(signal.timestamp) {
            debug!(source = %signal.source, "ignoring change signal close to a local edit");
            return SignalOutcome::SuppressedRecentEdit;
        }
        self.schedule_refetch();
        SignalOutcome::Scheduled
    }

    /// Arms the debounce timer; a newer call supersedes a pending one.
    pub fn schedule_refetch(self: &Arc<Self>) {
        let generation = {
            let mut coordinator = self.coordinator.lock();
            coordinator.generation += 1;
            coordinator.generation
        };

        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = this.shutdown.cancelled() => return,
                _ = tokio::time::sleep(this.config.notify_debounce()) => {}
            }
            if this.coordinator.lock().generation != generation {
                return;
            }
            if let Err(e) = this.request_refetch().await {
                warn!("refetch failed: {}", e);
            }
        });
    }

    /// Single entry point for full-document refetches.
    pub async fn request_refetch(&self) -> Result<RefetchOutcome> {
        let _guard = {
            let mut coordinator = self.coordinator.lock();
            if coordinator.in_flight {
                return Ok(RefetchOutcome::InFlight);
            }
            if let Some(last) = coordinator.last_refetch {
                if last.elapsed() < self.config.min_refetch_interval() {
                    return Ok(RefetchOutcome::Throttled);
                }
            }
            if self.within_recency_window(Utc::now()) {
                return Ok(RefetchOutcome::SuppressedRecentEdit);
            }
            coordinator.in_flight = true;
            InFlightGuard(&self.coordinator)
        };

        let timeline = self.backend.fetch_timeline().await?;
        let version = timeline.version;
        self.document.replace_remote(timeline);
        info!(version, "refetched remote document");
        Ok(RefetchOutcome::Refetched { version })
    }

    fn within_recency_window(&self, at: DateTime<Utc>) -> bool {
        let Ok(window) = chrono::Duration::from_std(self.config.recency_window()) else {
            return true;
        };
        match self.document.last_local_edit() {
            Some(last) => at - last <= window,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EditSession, MemoryBackend, OperationHistoryItem};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use timeline::{ApplyReport, Marker, Operation, Timeline};

    /// Document double that counts calls into the mutation path.
    #[derive(Default)]
    struct CountingDocument {
        version: Mutex<u64>,
        mutations: AtomicUsize,
        last_edit: Mutex<Option<DateTime<Utc>>>,
    }

    impl DocumentModel for CountingDocument {
        fn snapshot(&self) -> Timeline {
            Timeline::default()
        }

        fn known_version(&self) -> u64 {
            *self.version.lock()
        }

        fn advance_version(&self, version: u64) {
            let mut current = self.version.lock();
            *current = (*current).max(version);
        }

        fn apply_remote(&self, operations: &[Operation]) -> ApplyReport {
            self.mutations.fetch_add(1, Ordering::SeqCst);
            ApplyReport {
                applied: operations.len(),
                skipped: Vec::new(),
            }
        }

        fn replace_remote(&self, _timeline: Timeline) {
            self.mutations.fetch_add(1, Ordering::SeqCst);
        }

        fn last_local_edit(&self) -> Option<DateTime<Utc>> {
            *self.last_edit.lock()
        }
    }

    fn config() -> SyncConfig {
        SyncConfig {
            notify_debounce_ms: 20,
            min_refetch_interval_ms: 0,
            ..SyncConfig::default()
        }
    }

    fn item(user: &str, version: u64, data: serde_json::Value) -> OperationHistoryItem {
        OperationHistoryItem {
            id: format!("op-{}", version),
            user_id: UserId::from(user),
            version,
            created_at: Utc::now(),
            kind: "timeline.update".to_string(),
            data,
        }
    }

    fn marker_add() -> serde_json::Value {
        let marker = Marker::new(250, "remote");
        json!({ "operations": [ { "type": "marker.add", "marker_id": marker.id, "data": marker } ] })
    }

    fn reconciler(document: Arc<dyn DocumentModel>, backend: MemoryBackend) -> Arc<Reconciler> {
        Arc::new(Reconciler::new(
            UserId::from("alice"),
            document,
            Arc::new(backend),
            Arc::new(ActivityFeed::default()),
            config(),
        ))
    }

    #[test]
    fn test_own_operations_advance_version_without_mutation() {
        let document = Arc::new(CountingDocument::default());
        let backend = MemoryBackend::new(Timeline::default(), UserId::from("alice"));
        let reconciler = reconciler(document.clone(), backend);

        let summary = reconciler.process_page(OperationsPage {
            operations: vec![item("alice", 4, marker_add()), item("alice", 5, marker_add())],
            current_version: 5,
        });

        assert_eq!(summary.own_items, 2);
        assert_eq!(document.known_version(), 5);
        assert_eq!(document.mutations.load(Ordering::SeqCst), 0);
        assert_eq!(reconciler.feed.len(), 2);
        assert!(reconciler.feed.entries().iter().all(|e| e.origin == Origin::Local));
    }

    #[test]
    fn test_remote_operations_are_applied() {
        let document = Arc::new(CountingDocument::default());
        let backend = MemoryBackend::new(Timeline::default(), UserId::from("alice"));
        let reconciler = reconciler(document.clone(), backend);

        let summary = reconciler.process_page(OperationsPage {
            operations: vec![item("agent", 3, marker_add())],
            current_version: 3,
        });

        assert_eq!(summary.applied, 1);
        assert_eq!(document.mutations.load(Ordering::SeqCst), 1);
        assert_eq!(document.known_version(), 3);
    }

    #[test]
    fn test_undecodable_batch_still_advances_version() {
        let document = Arc::new(CountingDocument::default());
        let backend = MemoryBackend::new(Timeline::default(), UserId::from("alice"));
        let reconciler = reconciler(document.clone(), backend);

        let summary = reconciler.process_page(OperationsPage {
            operations: vec![
                item("bob", 8, json!({ "snapshot": "legacy" })),
                item("bob", 9, json!({ "operations": [ { "type": "clip.warp" } ] })),
            ],
            current_version: 9,
        });

        assert_eq!(summary.undecodable, 2);
        assert!(summary.has_gap());
        assert_eq!(document.mutations.load(Ordering::SeqCst), 0);
        assert_eq!(document.known_version(), 9);
    }

    #[test]
    fn test_version_uses_highest_seen() {
        let document = Arc::new(CountingDocument::default());
        let backend = MemoryBackend::new(Timeline::default(), UserId::from("alice"));
        let reconciler = reconciler(document.clone(), backend);
        document.advance_version(12);

        reconciler.process_page(OperationsPage {
            operations: Vec::new(),
            current_version: 10,
        });
        assert_eq!(document.known_version(), 12);
    }

    #[tokio::test]
    async fn test_poll_skips_right_after_local_edit() {
        let document = Arc::new(CountingDocument::default());
        *document.last_edit.lock() = Some(Utc::now());
        let backend = MemoryBackend::new(Timeline::default(), UserId::from("alice"));
        let reconciler = reconciler(document, backend.clone());

        let outcome = reconciler.poll_once().await.unwrap();
        assert_eq!(outcome, PollOutcome::SkippedRecentEdit);
        assert_eq!(backend.fetch_operations_calls(), 0);
    }

    #[tokio::test]
    async fn test_signal_near_local_commit_does_not_refetch() {
        let document = Arc::new(CountingDocument::default());
        let committed_at = Utc::now() - chrono::Duration::seconds(10);
        *document.last_edit.lock() = Some(committed_at);
        let backend = MemoryBackend::new(Timeline::default(), UserId::from("alice"));
        let reconciler = reconciler(document, backend.clone());

        for offset_ms in [0, 700, 1_500] {
            let signal = ChangeSignal {
                source: "agent".to_string(),
                operation: None,
                timestamp: committed_at + chrono::Duration::milliseconds(offset_ms),
            };
            assert_eq!(reconciler.handle_signal(&signal), SignalOutcome::SuppressedRecentEdit);
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(backend.fetch_timeline_calls(), 0);
    }

    #[tokio::test]
    async fn test_signal_burst_collapses_into_one_refetch() {
        let backend = MemoryBackend::new(Timeline::default(), UserId::from("alice"));
        let bob = backend.for_user(UserId::from("bob"));
        let mut next = Timeline::default();
        next.markers.push(Marker::new(0, "from bob"));
        bob.put_timeline(&next).await.unwrap();

        let session = Arc::new(EditSession::new(Timeline::default(), Arc::new(backend.clone()), 50));
        let reconciler = reconciler(session.clone(), backend.clone());

        for _ in 0..5 {
            let signal = ChangeSignal {
                source: "bob".to_string(),
                operation: Some("timeline.update".to_string()),
                timestamp: Utc::now(),
            };
            assert_eq!(reconciler.handle_signal(&signal), SignalOutcome::Scheduled);
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(backend.fetch_timeline_calls(), 1);
        assert_eq!(session.current().markers.len(), 1);
        assert_eq!(session.known_version(), 1);
    }

    #[tokio::test]
    async fn test_own_signal_is_ignored() {
        let document = Arc::new(CountingDocument::default());
        let backend = MemoryBackend::new(Timeline::default(), UserId::from("alice"));
        let reconciler = reconciler(document, backend);
        let signal = ChangeSignal {
            source: "alice".to_string(),
            operation: None,
            timestamp: Utc::now(),
        };
        assert_eq!(reconciler.handle_signal(&signal), SignalOutcome::OwnSignal);
    }

    #[tokio::test]
    async fn test_refetch_respects_min_interval() {
        let document = Arc::new(CountingDocument::default());
        let backend = MemoryBackend::new(Timeline::default(), UserId::from("alice"));
        let reconciler = Arc::new(Reconciler::new(
            UserId::from("alice"),
            document,
            Arc::new(backend.clone()),
            Arc::new(ActivityFeed::default()),
            SyncConfig {
                min_refetch_interval_ms: 60_000,
                ..SyncConfig::default()
            },
        ));

        assert_eq!(
            reconciler.request_refetch().await.unwrap(),
            RefetchOutcome::Refetched { version: 0 }
        );
        assert_eq!(reconciler.request_refetch().await.unwrap(), RefetchOutcome::Throttled);
        assert_eq!(backend.fetch_timeline_calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_poll_is_reported_to_caller() {
        let document = Arc::new(CountingDocument::default());
        let backend = MemoryBackend::new(Timeline::default(), UserId::from("alice"));
        backend.set_offline(true);
        let reconciler = reconciler(document.clone(), backend);

        assert!(reconciler.poll_once().await.is_err());
        assert_eq!(document.known_version(), 0);
    }
}
