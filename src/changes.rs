//! Buffered working-memory changes.
//!
//! Tearing down a decision produces working-memory removals that must be
//! applied together. Removal functions return a [`ChangeBuffer`] instead of
//! touching working memory directly; the buffer is `#[must_use]` and is
//! consumed by exactly one [`WorkingMemory::flush`] call.

use serde::Serialize;

use crate::slot::ContextAttribute;
use crate::symbol::SymbolId;

/// One buffered working-memory change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum WmChange {
    /// An installed context fact was withdrawn.
    FactRemoved {
        goal: SymbolId,
        attribute: ContextAttribute,
        value: SymbolId,
        timetag: u64,
    },
    /// A goal (and with it the impasse it represented) left the stack.
    GoalRemoved { goal: SymbolId, level: u32 },
    /// Preferences owned by a removed goal were released.
    PreferencesReleased { goal: SymbolId, count: usize },
}

/// Changes produced by one removal, waiting to be flushed.
#[must_use = "buffered changes must be flushed into working memory"]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeBuffer {
    changes: Vec<WmChange>,
}

impl ChangeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, change: WmChange) {
        self.changes.push(change);
    }

    /// Append another buffer, preserving order.
    pub fn absorb(&mut self, other: ChangeBuffer) {
        self.changes.extend(other.changes);
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WmChange> {
        self.changes.iter()
    }

    pub fn into_changes(self) -> Vec<WmChange> {
        self.changes
    }
}

/// The working-memory side of decision removal.
pub trait WorkingMemory {
    /// Apply a batch of buffered changes atomically.
    fn flush(&mut self, changes: ChangeBuffer);
}

/// Working memory that records every flushed change.
///
/// Used by the CLI trace and by tests that assert on removal side effects.
#[derive(Debug, Clone, Default)]
pub struct ChangeLog {
    applied: Vec<WmChange>,
    flushes: usize,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every change flushed so far, in application order.
    pub fn applied(&self) -> &[WmChange] {
        &self.applied
    }

    /// Number of `flush` calls, including empty ones.
    pub fn flush_count(&self) -> usize {
        self.flushes
    }

    /// Drain the log, e.g. between steps of a trace.
    pub fn take(&mut self) -> Vec<WmChange> {
        std::mem::take(&mut self.applied)
    }
}

impl WorkingMemory for ChangeLog {
    fn flush(&mut self, changes: ChangeBuffer) {
        self.flushes += 1;
        if !changes.is_empty() {
            tracing::debug!(count = changes.len(), "flushing buffered working-memory changes");
        }
        self.applied.extend(changes.into_changes());
    }
}
