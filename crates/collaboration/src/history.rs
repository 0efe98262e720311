/// Bounded undo/redo stacks of full timeline snapshots
use std::collections::VecDeque;
use timeline::Timeline;

#[derive(Debug, Clone)]
pub struct EditHistory {
    capacity: usize,
    undo_stack: VecDeque<Timeline>,
    redo_stack: Vec<Timeline>,
}

impl EditHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
        }
    }

    /// Pushes a copy of `current`, drops the redo branch and installs `next`.
    pub fn commit(&mut self, current: &mut Timeline, next: Timeline) {
        let previous = install_snapshot(current, next);
        self.push_undo(previous);
        self.redo_stack.clear();
    }

    /// Returns the restored snapshot, which the caller persists.
    pub fn undo(&mut self, current: &mut Timeline) -> Option<Timeline> {
        let restored = self.undo_stack.pop_back()?;
        let previous = install_snapshot(current, restored);
        self.redo_stack.push(previous);
        Some(current.clone())
    }

    pub fn redo(&mut self, current: &mut Timeline) -> Option<Timeline> {
        let restored = self.redo_stack.pop()?;
        let previous = install_snapshot(current, restored);
        self.push_undo(previous);
        Some(current.clone())
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    fn push_undo(&mut self, snapshot: Timeline) {
        if self.undo_stack.len() == self.capacity {
            self.undo_stack.pop_front();
        }
        self.undo_stack.push_back(snapshot);
    }
}

/// Swaps in `next` and returns the replaced snapshot. The installed state
/// keeps the higher of the two versions.
pub(crate) fn install_snapshot(current: &mut Timeline, mut next: Timeline) -> Timeline {
    next.version = next.version.max(current.version);
    std::mem::replace(current, next)
}

impl Default for EditHistory {
    fn default() -> Self {
        Self::new(50)
    }
}
