/// In-process document backend shared by several writers
use async_trait::async_trait;
use chrono::Utc;
use futures::stream;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use timeline::{DiffCache, Timeline};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::{
    ChangeSignal, CollaborationError, DocumentBackend, OperationHistoryItem, OperationsPage,
    PersistAck, Result, SignalSource, SignalStream, UserId,
};

const SIGNAL_BUFFER: usize = 64;
const DIFF_CACHE_CAPACITY: usize = 16;

struct StoreState {
    timeline: Timeline,
    history: Vec<OperationHistoryItem>,
    diffs: DiffCache,
}

#[derive(Default)]
struct CallCounters {
    fetch_operations: AtomicUsize,
    fetch_timeline: AtomicUsize,
    put_timeline: AtomicUsize,
}

struct Store {
    state: Mutex<StoreState>,
    signals: broadcast::Sender<ChangeSignal>,
}

/// Snapshot store with an operation log and a change feed.
///
/// Clones made through [`MemoryBackend::for_user`] share the document but write
/// under their own identity, with their own call counters and connectivity.
#[derive(Clone)]
pub struct MemoryBackend {
    store: Arc<Store>,
    user_id: UserId,
    calls: Arc<CallCounters>,
    offline: Arc<AtomicBool>,
}

impl MemoryBackend {
    pub fn new(initial: Timeline, user_id: UserId) -> Self {
        let (signals, _) = broadcast::channel(SIGNAL_BUFFER);
        Self {
            store: Arc::new(Store {
                state: Mutex::new(StoreState {
                    timeline: initial,
                    history: Vec::new(),
                    diffs: DiffCache::new(DIFF_CACHE_CAPACITY),
                }),
                signals,
            }),
            user_id,
            calls: Arc::new(CallCounters::default()),
            offline: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Another writer on the same document.
    pub fn for_user(&self, user_id: UserId) -> Self {
        Self {
            store: self.store.clone(),
            user_id,
            calls: Arc::new(CallCounters::default()),
            offline: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// While offline every call from this writer fails with a network error
    /// and its push connections are refused.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn version(&self) -> u64 {
        self.store.state.lock().timeline.version
    }

    pub fn snapshot(&self) -> Timeline {
        self.store.state.lock().timeline.clone()
    }

    pub fn history(&self) -> Vec<OperationHistoryItem> {
        self.store.state.lock().history.clone()
    }

    /// Appends a log entry without touching the snapshot, e.g. a legacy
    /// payload with no granular operations.
    pub fn record_item(&self, kind: &str, data: serde_json::Value) -> u64 {
        let mut state = self.store.state.lock();
        state.timeline.version += 1;
        let item = OperationHistoryItem {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: self.user_id.clone(),
            version: state.timeline.version,
            created_at: Utc::now(),
            kind: kind.to_string(),
            data,
        };
        state.history.push(item);
        state.timeline.version
    }

    /// Change-feed subscription for this document.
    pub fn signal_source(&self) -> MemorySignalSource {
        MemorySignalSource {
            store: self.store.clone(),
            offline: self.offline.clone(),
        }
    }

    pub fn fetch_operations_calls(&self) -> usize {
        self.calls.fetch_operations.load(Ordering::SeqCst)
    }

    pub fn fetch_timeline_calls(&self) -> usize {
        self.calls.fetch_timeline.load(Ordering::SeqCst)
    }

    pub fn put_timeline_calls(&self) -> usize {
        self.calls.put_timeline.load(Ordering::SeqCst)
    }

    fn ensure_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(CollaborationError::NetworkError(
                "backend unreachable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentBackend for MemoryBackend {
    async fn fetch_operations(&self, since_version: u64) -> Result<OperationsPage> {
        self.calls.fetch_operations.fetch_add(1, Ordering::SeqCst);
        self.ensure_online()?;

        let state = self.store.state.lock();
        let operations = state
            .history
            .iter()
            .filter(|item| item.version > since_version)
            .cloned()
            .collect();
        Ok(OperationsPage {
            operations,
            current_version: state.timeline.version,
        })
    }

    async fn fetch_timeline(&self) -> Result<Timeline> {
        self.calls.fetch_timeline.fetch_add(1, Ordering::SeqCst);
        self.ensure_online()?;
        Ok(self.snapshot())
    }

    async fn put_timeline(&self, timeline: &Timeline) -> Result<PersistAck> {
        self.calls.put_timeline.fetch_add(1, Ordering::SeqCst);
        self.ensure_online()?;

        let (signal, ack) = {
            let mut state = self.store.state.lock();
            let mut stored = timeline.clone();
            stored.version = state.timeline.version + 1;
            stored.duration_ms = stored.computed_duration_ms();
            let operations = {
                let StoreState {
                    timeline, diffs, ..
                } = &mut *state;
                diffs.diff(timeline, &stored)
            };
            let ack = PersistAck {
                duration_ms: stored.duration_ms,
                version: stored.version,
            };

            let created_at = Utc::now();
            state.history.push(OperationHistoryItem {
                id: uuid::Uuid::new_v4().to_string(),
                user_id: self.user_id.clone(),
                version: stored.version,
                created_at,
                kind: "timeline.update".to_string(),
                data: json!({ "operations": operations }),
            });
            state.timeline = stored;

            let signal = ChangeSignal {
                source: self.user_id.to_string(),
                operation: Some("timeline.update".to_string()),
                timestamp: created_at,
            };
            (signal, ack)
        };

        // No subscribers is fine.
        let _ = self.store.signals.send(signal);
        Ok(ack)
    }
}

/// Push source backed by the store's broadcast change feed.
#[derive(Clone)]
pub struct MemorySignalSource {
    store: Arc<Store>,
    offline: Arc<AtomicBool>,
}

impl MemorySignalSource {
    /// Delivers a signal to every connected subscriber.
    pub fn emit(&self, signal: ChangeSignal) {
        let _ = self.store.signals.send(signal);
    }

    pub fn subscriber_count(&self) -> usize {
        self.store.signals.receiver_count()
    }
}

#[async_trait]
impl SignalSource for MemorySignalSource {
    async fn connect(&self) -> Result<SignalStream> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(CollaborationError::NetworkError(
                "change feed unreachable".to_string(),
            ));
        }

        let rx = self.store.signals.subscribe();
        let signals = stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(signal) => return Some((Ok::<_, CollaborationError>(signal), rx)),
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => return None,
                }
            }
        });
        Ok(Box::pin(signals))
    }
}
