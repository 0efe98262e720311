/// Decision point for re-enabling sync after the remote document moved on.
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use timeline::Operation;
use tracing::info;

use crate::{
    DocumentBackend, DocumentModel, EditSession, OperationHistoryItem, Result, UserId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeStrategy {
    /// Adopt the backend snapshot, dropping local structural state.
    LoadRemote,
    /// Replay the missed operations on top of local state.
    ApplyDiff,
    /// Push local state, discarding what others wrote meanwhile.
    OverwriteRemote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeDecision {
    Resolve(ResumeStrategy),
    Cancel,
}

/// Remote activity that happened while sync was disabled.
#[derive(Debug, Clone, PartialEq)]
pub struct ResumeConflict {
    pub local_version: u64,
    pub remote_version: u64,
    pub missed: Vec<OperationHistoryItem>,
}

impl ResumeConflict {
    pub fn missed_operation_count(&self) -> usize {
        self.missed.iter().map(|item| item.raw_operations().len()).sum()
    }

    pub fn authors(&self) -> BTreeSet<String> {
        self.missed.iter().map(|item| item.user_id.to_string()).collect()
    }

    /// Decodable operations from the missed items, oldest first.
    pub fn operations(&self) -> Vec<Operation> {
        let mut items: Vec<&OperationHistoryItem> = self.missed.iter().collect();
        items.sort_by_key(|item| item.version);
        items
            .into_iter()
            .flat_map(|item| item.decode_operations().0)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumeOutcome {
    pub strategy: ResumeStrategy,
    pub version: u64,
    pub applied: usize,
    pub skipped: usize,
}

/// Returns `None` when no other writer touched the document since
/// `document`'s version. Own items only move the version forward.
pub async fn detect_conflict(
    user_id: &UserId,
    document: &dyn DocumentModel,
    backend: &dyn DocumentBackend,
) -> Result<Option<ResumeConflict>> {
    let local_version = document.known_version();
    let page = backend.fetch_operations(local_version).await?;

    let missed: Vec<OperationHistoryItem> = page
        .operations
        .into_iter()
        .filter(|item| &item.user_id != user_id)
        .collect();

    if missed.is_empty() {
        document.advance_version(page.current_version);
        return Ok(None);
    }

    Ok(Some(ResumeConflict {
        local_version,
        remote_version: page.current_version,
        missed,
    }))
}

pub async fn resolve_conflict(
    conflict: &ResumeConflict,
    strategy: ResumeStrategy,
    session: &EditSession,
    backend: &dyn DocumentBackend,
) -> Result<ResumeOutcome> {
    let outcome = match strategy {
        ResumeStrategy::LoadRemote => {
            let remote = backend.fetch_timeline().await?;
            let version = remote.version;
            session.replace_remote(remote);
            ResumeOutcome {
                strategy,
                version,
                applied: 0,
                skipped: 0,
            }
        }
        ResumeStrategy::ApplyDiff => {
            let report = session.apply_remote(&conflict.operations());
            session.advance_version(conflict.remote_version);
            let ack = session.push_current().await?;
            ResumeOutcome {
                strategy,
                version: ack.version,
                applied: report.applied,
                skipped: report.skipped.len(),
            }
        }
        ResumeStrategy::OverwriteRemote => {
            let ack = session.push_current().await?;
            ResumeOutcome {
                strategy,
                version: ack.version,
                applied: 0,
                skipped: 0,
            }
        }
    };

    info!(
        strategy = ?outcome.strategy,
        version = outcome.version,
        "resume conflict resolved"
    );
    Ok(outcome)
}
