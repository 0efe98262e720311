/// Push-notify channel: keeps a change-signal subscription alive for the
/// life of a session and forwards every signal to the reconciler.
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{ChangeSignal, CollaborationError, Result};

pub type SignalStream = BoxStream<'static, Result<ChangeSignal>>;

/// Delivery mechanism for change signals (change feed, server-push stream).
#[async_trait]
pub trait SignalSource: Send + Sync {
    /// Opens one subscription. An `Err` item or the end of the stream counts
    /// as a connection failure.
    async fn connect(&self) -> Result<SignalStream>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyState {
    Disabled,
    Connecting,
    Connected,
    ErrorBackoff,
}

pub struct NotifyChannel {
    state: watch::Receiver<NotifyState>,
    reconnect_tx: mpsc::UnboundedSender<()>,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl NotifyChannel {
    /// Starts connecting immediately. Failures retry after `reconnect_delay`
    /// with no retry limit.
    pub fn spawn(
        source: Arc<dyn SignalSource>,
        reconnect_delay: Duration,
        signals: mpsc::UnboundedSender<ChangeSignal>,
    ) -> Self {
        let (state_tx, state) = watch::channel(NotifyState::Disabled);
        let (reconnect_tx, reconnect_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let task = tokio::spawn(run(
            source,
            reconnect_delay,
            signals,
            state_tx,
            reconnect_rx,
            shutdown.clone(),
        ));

        Self {
            state,
            reconnect_tx,
            shutdown,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn state(&self) -> NotifyState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<NotifyState> {
        self.state.clone()
    }

    /// Abandons the current attempt (or backoff wait) and connects again.
    pub fn reconnect(&self) {
        let _ = self.reconnect_tx.send(());
    }

    /// Tears the channel down; the state ends in `Disabled`.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl Drop for NotifyChannel {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run(
    source: Arc<dyn SignalSource>,
    reconnect_delay: Duration,
    signals: mpsc::UnboundedSender<ChangeSignal>,
    state: watch::Sender<NotifyState>,
    mut reconnect_rx: mpsc::UnboundedReceiver<()>,
    shutdown: CancellationToken,
) {
    loop {
        state.send_replace(NotifyState::Connecting);

        let outcome = tokio::select! {
            _ = shutdown.cancelled() => break,
            Some(()) = reconnect_rx.recv() => {
                debug!("push channel reconnect requested");
                continue;
            }
            outcome = read_signals(source.as_ref(), &signals, &state) => outcome,
        };

        if signals.is_closed() {
            break;
        }
        if let Err(e) = outcome {
            warn!("push channel failed, retrying in {:?}: {}", reconnect_delay, e);
        }
        state.send_replace(NotifyState::ErrorBackoff);

        tokio::select! {
            _ = shutdown.cancelled() => break,
            Some(()) = reconnect_rx.recv() => {}
            _ = tokio::time::sleep(reconnect_delay) => {}
        }
    }

    state.send_replace(NotifyState::Disabled);
    info!("push channel disabled");
}

async fn read_signals(
    source: &dyn SignalSource,
    signals: &mpsc::UnboundedSender<ChangeSignal>,
    state: &watch::Sender<NotifyState>,
) -> Result<()> {
    let mut stream = source.connect().await?;
    state.send_replace(NotifyState::Connected);
    info!("push channel connected");

    while let Some(signal) = stream.next().await {
        let signal = signal?;
        debug!(source = %signal.source, "change signal received");
        signals
            .send(signal)
            .map_err(|e| CollaborationError::ChannelClosed(e.to_string()))?;
    }
    Err(CollaborationError::ChannelClosed(
        "signal stream ended".to_string(),
    ))
}
