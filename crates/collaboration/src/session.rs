/// Sync session: wires an edit session to the poll and push channels and
/// owns the pause/resume lifecycle.
use parking_lot::Mutex;
use std::sync::Arc;
use timeline::Timeline;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::info;

use crate::{
    detect_conflict, resolve_conflict, ActivityEntry, ActivityFeed, CollaborationError,
    DocumentBackend, EditSession, NotifyChannel, NotifyState, Reconciler, Result,
    ResumeConflict, ResumeDecision, ResumeOutcome, SignalSource, SyncConfig, UserId,
};

struct RunningSync {
    reconciler: Arc<Reconciler>,
    notify: Option<NotifyChannel>,
    tasks: Vec<JoinHandle<()>>,
}

pub struct SyncSession {
    user_id: UserId,
    config: SyncConfig,
    backend: Arc<dyn DocumentBackend>,
    signals: Option<Arc<dyn SignalSource>>,
    editor: Arc<EditSession>,
    feed: Arc<ActivityFeed>,
    running: Mutex<Option<RunningSync>>,
}

impl SyncSession {
    pub fn new(
        user_id: UserId,
        initial: Timeline,
        backend: Arc<dyn DocumentBackend>,
        signals: Option<Arc<dyn SignalSource>>,
        config: SyncConfig,
    ) -> Self {
        let editor = Arc::new(EditSession::new(
            initial,
            backend.clone(),
            config.history_capacity,
        ));
        let feed = Arc::new(ActivityFeed::new(config.activity_capacity));
        Self {
            user_id,
            config,
            backend,
            signals,
            editor,
            feed,
            running: Mutex::new(None),
        }
    }

    /// Fetches the current backend snapshot and builds a session on it.
    pub async fn load(
        user_id: UserId,
        backend: Arc<dyn DocumentBackend>,
        signals: Option<Arc<dyn SignalSource>>,
        config: SyncConfig,
    ) -> Result<Self> {
        config.validate()?;
        let initial = backend.fetch_timeline().await?;
        Ok(Self::new(user_id, initial, backend, signals, config))
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn editor(&self) -> &Arc<EditSession> {
        &self.editor
    }

    pub fn activity(&self) -> watch::Receiver<Vec<ActivityEntry>> {
        self.feed.subscribe()
    }

    pub fn is_syncing(&self) -> bool {
        self.running.lock().is_some()
    }

    pub fn notify_state(&self) -> NotifyState {
        self.running
            .lock()
            .as_ref()
            .and_then(|running| running.notify.as_ref().map(NotifyChannel::state))
            .unwrap_or(NotifyState::Disabled)
    }

    pub fn reconciler(&self) -> Option<Arc<Reconciler>> {
        self.running
            .lock()
            .as_ref()
            .map(|running| running.reconciler.clone())
    }

    /// Starts the poll loop and, when a signal source is configured, the push
    /// channel. A running session is left as is.
    pub fn start(&self) {
        let mut running = self.running.lock();
        if running.is_some() {
            return;
        }

        let reconciler = Arc::new(Reconciler::new(
            self.user_id.clone(),
            self.editor.clone(),
            self.backend.clone(),
            self.feed.clone(),
            self.config.clone(),
        ));

        let mut tasks = vec![tokio::spawn(reconciler.clone().run_poll_loop())];
        let notify = self.signals.as_ref().map(|source| {
            let (tx, rx) = mpsc::unbounded_channel();
            tasks.push(tokio::spawn(reconciler.clone().run_signal_loop(rx)));
            NotifyChannel::spawn(source.clone(), self.config.reconnect_delay(), tx)
        });

        info!(user = %self.user_id, push = notify.is_some(), "sync started");
        *running = Some(RunningSync {
            reconciler,
            notify,
            tasks,
        });
    }

    /// Disables synchronization. Local editing and persistence continue.
    pub async fn pause(&self) {
        let running = self.running.lock().take();
        let Some(running) = running else {
            return;
        };

        running.reconciler.shutdown();
        if let Some(notify) = &running.notify {
            notify.shutdown().await;
        }
        for task in running.tasks {
            let _ = task.await;
        }
        info!(user = %self.user_id, "sync paused");
    }

    /// `None` when nothing from other writers was missed; sync can simply be
    /// started again.
    pub async fn check_resume(&self) -> Result<Option<ResumeConflict>> {
        detect_conflict(&self.user_id, self.editor.as_ref(), self.backend.as_ref()).await
    }

    /// Applies the chosen strategy and restarts sync. `Cancel` leaves sync
    /// disabled and makes no network call.
    pub async fn resume(
        &self,
        conflict: &ResumeConflict,
        decision: ResumeDecision,
    ) -> Result<Option<ResumeOutcome>> {
        if self.is_syncing() {
            return Err(CollaborationError::SyncActive);
        }

        let strategy = match decision {
            ResumeDecision::Cancel => {
                info!(user = %self.user_id, "resume cancelled, sync stays disabled");
                return Ok(None);
            }
            ResumeDecision::Resolve(strategy) => strategy,
        };

        let outcome =
            resolve_conflict(conflict, strategy, &self.editor, self.backend.as_ref()).await?;
        self.start();
        Ok(Some(outcome))
    }
}
