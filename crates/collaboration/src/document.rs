use chrono::{DateTime, Utc};
use timeline::{ApplyReport, Operation, Timeline};

/// Write path the reconciler uses to bring remote changes into the local
/// document. Nothing here touches undo/redo history.
pub trait DocumentModel: Send + Sync {
    fn snapshot(&self) -> Timeline;

    fn known_version(&self) -> u64;

    /// Moves the version forward; lower values are ignored.
    fn advance_version(&self, version: u64);

    fn apply_remote(&self, operations: &[Operation]) -> ApplyReport;

    /// Adopts an authoritative snapshot, including its version.
    fn replace_remote(&self, timeline: Timeline);

    /// Time of the last local commit, undo or redo.
    fn last_local_edit(&self) -> Option<DateTime<Utc>>;
}
