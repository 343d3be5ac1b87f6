use std::collections::VecDeque;

use crate::editing::Snapshot;

/// Bounded undo/redo stacks over whole snapshots.
///
/// Snapshots are immutable values, so retaining them is cheap clones of the
/// tree; linear undo with redo-branch discard: recording a fresh edit clears
/// the redo stack.
#[derive(Debug, Clone)]
pub struct History {
    undos: VecDeque<Snapshot>,
    redos: Vec<Snapshot>,
    limit: usize,
}

impl History {
    pub const DEFAULT_LIMIT: usize = 100;

    pub fn new() -> Self {
        Self::with_limit(Self::DEFAULT_LIMIT)
    }

    pub fn with_limit(limit: usize) -> Self {
        History {
            undos: VecDeque::new(),
            redos: Vec::new(),
            limit,
        }
    }

    /// Record the pre-edit snapshot of a fresh committed edit. Discards the
    /// redo branch and the oldest entry past the limit.
    pub fn record(&mut self, snapshot: Snapshot) {
        self.undos.push_back(snapshot);
        if self.undos.len() > self.limit {
            self.undos.pop_front();
        }
        self.redos.clear();
    }

    /// Step back: returns the previous snapshot, pushing `current` onto the
    /// redo stack. `None` past the oldest entry.
    pub fn undo(&mut self, current: Snapshot) -> Option<Snapshot> {
        let previous = self.undos.pop_back()?;
        self.redos.push(current);
        Some(previous)
    }

    /// Step forward again. `None` when no undo preceded.
    pub fn redo(&mut self, current: Snapshot) -> Option<Snapshot> {
        let next = self.redos.pop()?;
        self.undos.push_back(current);
        Some(next)
    }

    pub fn can_undo(&self) -> bool {
        !self.undos.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redos.is_empty()
    }
}

impl Default for History {
    fn default() -> Self {
        History::new()
    }
}
