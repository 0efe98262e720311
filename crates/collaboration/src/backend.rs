/// Backend document API consumed by the sync core
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use timeline::{Millis, Operation, Timeline};

use crate::{Result, UserId};

/// One entry of the backend's operation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationHistoryItem {
    pub id: String,
    pub user_id: UserId,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

impl OperationHistoryItem {
    /// Raw entries of `data.operations`; empty for legacy payloads.
    pub fn raw_operations(&self) -> &[Value] {
        self.data
            .get("operations")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Decodes the granular operations, returning them with the count of entries
    /// that failed to decode.
    pub fn decode_operations(&self) -> (Vec<Operation>, usize) {
        let mut decoded = Vec::new();
        let mut failed = 0;
        for raw in self.raw_operations() {
            match Operation::from_value(raw) {
                Ok(op) => decoded.push(op),
                Err(_) => failed += 1,
            }
        }
        (decoded, failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationsPage {
    pub operations: Vec<OperationHistoryItem>,
    pub current_version: u64,
}

/// Server-computed fields returned by a snapshot write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistAck {
    pub duration_ms: Millis,
    pub version: u64,
}

/// "Something changed" notification delivered by a push channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSignal {
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait DocumentBackend: Send + Sync {
    /// Operations with a version strictly greater than `since_version`.
    async fn fetch_operations(&self, since_version: u64) -> Result<OperationsPage>;

    async fn fetch_timeline(&self) -> Result<Timeline>;

    /// Full-snapshot write; the only outgoing mutation path.
    async fn put_timeline(&self, timeline: &Timeline) -> Result<PersistAck>;
}
