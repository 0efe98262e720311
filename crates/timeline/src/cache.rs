use std::collections::VecDeque;

use crate::{diff, Operation, Timeline};

/// Bounded memo of recent diffs, keyed by deep equality of both snapshots.
#[derive(Debug, Clone)]
pub struct DiffCache {
    capacity: usize,
    entries: VecDeque<CacheEntry>,
    hits: u64,
    misses: u64,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    old: Timeline,
    new: Timeline,
    ops: Vec<Operation>,
}

impl DiffCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::new(),
            hits: 0,
            misses: 0,
        }
    }

    pub fn diff(&mut self, old: &Timeline, new: &Timeline) -> Vec<Operation> {
        if let Some(entry) = self
            .entries
            .iter()
            .find(|e| e.old.same_content(old) && e.new.same_content(new))
        {
            self.hits += 1;
            return entry.ops.clone();
        }

        self.misses += 1;
        let ops = diff(old, new);
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(CacheEntry {
            old: old.clone(),
            new: new.clone(),
            ops: ops.clone(),
        });
        ops
    }

    pub fn invalidate(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}

impl Default for DiffCache {
    fn default() -> Self {
        Self::new(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Layer, LayerKind};

    #[test]
    fn test_repeated_pair_is_served_from_cache() {
        let old = Timeline::default();
        let mut new = old.clone();
        new.layers.push(Layer::new("V1", LayerKind::Video));

        let mut cache = DiffCache::new(2);
        let first = cache.diff(&old, &new);
        let second = cache.diff(&old, &new);

        assert_eq!(first, second);
        assert_eq!(cache.stats(), (1, 1));
    }

    #[test]
    fn test_capacity_evicts_oldest_and_invalidate_clears() {
        let base = Timeline::default();
        let mut cache = DiffCache::new(2);
        for name in ["a", "b", "c"] {
            let mut next = base.clone();
            next.layers.push(Layer::new(name, LayerKind::Video));
            cache.diff(&base, &next);
        }
        assert_eq!(cache.len(), 2);

        cache.invalidate();
        assert!(cache.is_empty());
    }
}
