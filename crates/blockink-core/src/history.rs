//! Memento-based undo/redo history.

use serde::{Deserialize, Serialize};

use crate::page::{Page, PageId};

/// Maximum number of undo states to keep.
pub const MAX_UNDO_HISTORY: usize = 50;

/// Net gesture deltas smaller than this (in canvas units) commit nothing.
pub const GESTURE_EPSILON: f64 = 0.1;

/// An immutable deep copy of canvas-level state, captured before a
/// mutation. Selection travels inside each page's interaction state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memento {
    /// All pages at capture time.
    pub pages: Vec<Page>,
    /// Page that was current at capture time.
    pub current_page_id: PageId,
}

/// Linear (non-branching) undo/redo history of [`Memento`]s.
///
/// Every externally meaningful mutation pushes a pre-mutation snapshot and
/// clears the redo stack. Pure interaction-state changes (hover, pointer
/// position) are never recorded.
#[derive(Debug, Clone, Default)]
pub struct History {
    undo_stack: Vec<Memento>,
    redo_stack: Vec<Memento>,
}

impl History {
    /// Create an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pre-mutation snapshot.
    ///
    /// Clears the redo stack; the oldest entry is silently dropped once
    /// the depth cap is exceeded.
    pub fn push(&mut self, memento: Memento) {
        self.undo_stack.push(memento);
        self.redo_stack.clear();
        if self.undo_stack.len() > MAX_UNDO_HISTORY {
            self.undo_stack.remove(0);
        }
    }

    /// Pop the most recent undo snapshot, pushing `current` onto the redo
    /// stack. Returns `None` (and leaves `current` untouched) when there
    /// is nothing to undo.
    pub fn undo(&mut self, current: Memento) -> Option<Memento> {
        let snapshot = self.undo_stack.pop()?;
        self.redo_stack.push(current);
        Some(snapshot)
    }

    /// Pop the most recent redo snapshot, pushing `current` onto the undo
    /// stack. Symmetric to [`History::undo`].
    pub fn redo(&mut self, current: Memento) -> Option<Memento> {
        let snapshot = self.redo_stack.pop()?;
        self.undo_stack.push(current);
        Some(snapshot)
    }

    /// Check if undo is available.
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    /// Check if redo is available.
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Current undo depth.
    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    /// Drop all history.
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}
