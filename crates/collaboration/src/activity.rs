/// Operation history feed for activity-log display
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::{OperationHistoryItem, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Local,
    Remote,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: String,
    pub user_id: UserId,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub kind: String,
    pub operation_count: usize,
    pub origin: Origin,
}

impl ActivityEntry {
    pub fn from_item(item: &OperationHistoryItem, origin: Origin) -> Self {
        Self {
            id: item.id.clone(),
            user_id: item.user_id.clone(),
            version: item.version,
            created_at: item.created_at,
            kind: item.kind.clone(),
            operation_count: item.raw_operations().len(),
            origin,
        }
    }
}

/// Most-recent-first, capped list. Subscribers always see the whole list.
pub struct ActivityFeed {
    capacity: usize,
    entries: watch::Sender<Vec<ActivityEntry>>,
}

impl ActivityFeed {
    pub fn new(capacity: usize) -> Self {
        let (entries, _) = watch::channel(Vec::new());
        Self {
            capacity: capacity.max(1),
            entries,
        }
    }

    /// Returns false when an entry with the same id is already listed.
    pub fn record(&self, entry: ActivityEntry) -> bool {
        let capacity = self.capacity;
        self.entries.send_if_modified(|entries| {
            if entries.iter().any(|e| e.id == entry.id) {
                return false;
            }
            entries.insert(0, entry);
            entries.truncate(capacity);
            true
        })
    }

    pub fn entries(&self) -> Vec<ActivityEntry> {
        self.entries.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<ActivityEntry>> {
        self.entries.subscribe()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ActivityFeed {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, version: u64) -> ActivityEntry {
        ActivityEntry {
            id: id.to_string(),
            user_id: UserId::from("bob"),
            version,
            created_at: Utc::now(),
            kind: "timeline.update".to_string(),
            operation_count: 1,
            origin: Origin::Remote,
        }
    }

    #[test]
    fn test_most_recent_first_and_capped() {
        let feed = ActivityFeed::new(3);
        for v in 1..=5 {
            feed.record(entry(&format!("op-{}", v), v));
        }
        let versions: Vec<u64> = feed.entries().iter().map(|e| e.version).collect();
        assert_eq!(versions, vec![5, 4, 3]);
    }

    #[test]
    fn test_duplicate_ids_are_ignored() {
        let feed = ActivityFeed::new(10);
        assert!(feed.record(entry("op-1", 1)));
        assert!(!feed.record(entry("op-1", 1)));
        assert_eq!(feed.len(), 1);
    }

    #[tokio::test]
    async fn test_subscribers_see_updates() {
        let feed = ActivityFeed::default();
        let mut rx = feed.subscribe();
        feed.record(entry("op-1", 1));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().len(), 1);
    }
}
