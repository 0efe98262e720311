/// Tunables for history, polling and push-notify reconciliation
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::{CollaborationError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Cadence of the "operations since version" poll.
    pub poll_interval_ms: u64,

    /// Remote reactions are suppressed this long after a local commit.
    pub recency_window_ms: u64,

    /// Quiet period before a push signal turns into a refetch.
    pub notify_debounce_ms: u64,

    /// Minimum spacing between two full refetches.
    pub min_refetch_interval_ms: u64,

    /// Delay before the push channel reconnects after a failure.
    pub reconnect_delay_ms: u64,

    /// Undo entries kept before the oldest is evicted.
    pub history_capacity: usize,

    /// Entries kept in the activity feed.
    pub activity_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 3_000,
            recency_window_ms: 1_500,
            notify_debounce_ms: 500,
            min_refetch_interval_ms: 2_000,
            reconnect_delay_ms: 3_000,
            history_capacity: 50,
            activity_capacity: 100,
        }
    }
}

impl SyncConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            CollaborationError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config: SyncConfig = serde_json::from_str(&raw)
            .map_err(|e| CollaborationError::Config(format!("invalid {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(CollaborationError::Config(
                "poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.history_capacity == 0 || self.activity_capacity == 0 {
            return Err(CollaborationError::Config(
                "history_capacity and activity_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn recency_window(&self) -> Duration {
        Duration::from_millis(self.recency_window_ms)
    }

    pub fn notify_debounce(&self) -> Duration {
        Duration::from_millis(self.notify_debounce_ms)
    }

    pub fn min_refetch_interval(&self) -> Duration {
        Duration::from_millis(self.min_refetch_interval_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}
