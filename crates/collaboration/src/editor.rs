/// Local edit session: optimistic commits, bounded undo/redo and background
/// persistence of full snapshots.
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use timeline::{apply_operations, ApplyReport, Operation, Timeline};
use tracing::{debug, warn};

use crate::history::install_snapshot;
use crate::{DocumentBackend, DocumentModel, EditHistory, PersistAck, Result};

struct SessionState {
    current: Timeline,
    history: EditHistory,
    last_local_edit: Option<DateTime<Utc>>,
    persist_error: Option<String>,
}

pub struct EditSession {
    state: Mutex<SessionState>,
    backend: Arc<dyn DocumentBackend>,
}

impl EditSession {
    pub fn new(initial: Timeline, backend: Arc<dyn DocumentBackend>, history_capacity: usize) -> Self {
        Self {
            state: Mutex::new(SessionState {
                current: initial,
                history: EditHistory::new(history_capacity),
                last_local_edit: None,
                persist_error: None,
            }),
            backend,
        }
    }

    pub fn current(&self) -> Timeline {
        self.state.lock().current.clone()
    }

    /// Installs `next` immediately, then persists it.
    ///
    /// A failed write leaves the local state as committed and raises the
    /// persistence error flag.
    pub async fn commit(&self, next: Timeline) -> Result<PersistAck> {
        let snapshot = {
            let mut state = self.state.lock();
            let SessionState {
                current, history, ..
            } = &mut *state;
            history.commit(current, next);
            state.last_local_edit = Some(Utc::now());
            state.current.clone()
        };
        self.persist(snapshot).await
    }

    /// Replaces the current state without history or persistence, for
    /// continuous interactions that end in a regular `commit`.
    pub fn commit_local(&self, next: Timeline) {
        install_snapshot(&mut self.state.lock().current, next);
    }

    /// `None` when there is nothing to undo.
    pub async fn undo(&self) -> Option<Result<PersistAck>> {
        let restored = {
            let mut state = self.state.lock();
            let SessionState {
                current, history, ..
            } = &mut *state;
            let restored = history.undo(current)?;
            state.last_local_edit = Some(Utc::now());
            restored
        };
        Some(self.persist(restored).await)
    }

    pub async fn redo(&self) -> Option<Result<PersistAck>> {
        let restored = {
            let mut state = self.state.lock();
            let SessionState {
                current, history, ..
            } = &mut *state;
            let restored = history.redo(current)?;
            state.last_local_edit = Some(Utc::now());
            restored
        };
        Some(self.persist(restored).await)
    }

    /// Writes the current state as-is, without touching history.
    pub async fn push_current(&self) -> Result<PersistAck> {
        let snapshot = self.current();
        self.persist(snapshot).await
    }

    pub fn can_undo(&self) -> bool {
        self.state.lock().history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.state.lock().history.can_redo()
    }

    pub fn undo_len(&self) -> usize {
        self.state.lock().history.undo_len()
    }

    pub fn redo_len(&self) -> usize {
        self.state.lock().history.redo_len()
    }

    pub fn persist_error(&self) -> Option<String> {
        self.state.lock().persist_error.clone()
    }

    pub fn clear_persist_error(&self) {
        self.state.lock().persist_error = None;
    }

    async fn persist(&self, snapshot: Timeline) -> Result<PersistAck> {
        match self.backend.put_timeline(&snapshot).await {
            Ok(ack) => {
                let mut state = self.state.lock();
                // Version moves when the reconciler reads the write back.
                if state.current.same_structure(&snapshot) {
                    state.current.duration_ms = ack.duration_ms;
                }
                state.persist_error = None;
                debug!(version = ack.version, "snapshot persisted");
                Ok(ack)
            }
            Err(e) => {
                warn!("failed to persist snapshot: {}", e);
                self.state.lock().persist_error = Some(e.to_string());
                Err(e)
            }
        }
    }
}

impl DocumentModel for EditSession {
    fn snapshot(&self) -> Timeline {
        self.current()
    }

    fn known_version(&self) -> u64 {
        self.state.lock().current.version
    }

    fn advance_version(&self, version: u64) {
        let mut state = self.state.lock();
        state.current.version = state.current.version.max(version);
    }

    fn apply_remote(&self, operations: &[Operation]) -> ApplyReport {
        let mut state = self.state.lock();
        let report = apply_operations(&mut state.current, operations);
        if report.applied > 0 {
            state.current.duration_ms = state.current.computed_duration_ms();
        }
        report
    }

    fn replace_remote(&self, timeline: Timeline) {
        let mut state = self.state.lock();
        let version = state.current.version.max(timeline.version);
        state.current = timeline;
        state.current.version = version;
    }

    fn last_local_edit(&self) -> Option<DateTime<Utc>> {
        self.state.lock().last_local_edit
    }
}
