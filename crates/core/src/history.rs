//! Undo/redo history
//!
//! Two stacks of recorded actions scoped to one viewing session. Actions are
//! only ever moved between the stacks, or dropped when a new action
//! truncates the redo branch. The history knows nothing about geometry: it
//! stores whole annotations and replays them through [`ApplyTarget`].
//!
//! Every entry point (undo, redo and their index variants) hands back
//! recorded actions; the caller applies `action.invert()` when undoing and
//! `action` itself when redoing.

use crate::annotation::{Annotation, AnnotationId};
use chrono::{DateTime, Utc};

/// Something history actions can be replayed against
pub trait ApplyTarget {
    /// Put an annotation back exactly as it was
    fn insert(&mut self, annotation: Annotation);

    /// Remove an annotation, returning it if it was present
    fn remove(&mut self, id: AnnotationId) -> Option<Annotation>;
}

/// A reversible mutation of the annotation set
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryAction {
    Create(Annotation),
    Delete(Annotation),
}

impl HistoryAction {
    /// The action that undoes this one
    pub fn invert(&self) -> HistoryAction {
        match self {
            HistoryAction::Create(a) => HistoryAction::Delete(a.clone()),
            HistoryAction::Delete(a) => HistoryAction::Create(a.clone()),
        }
    }

    /// Perform this action against a target
    pub fn apply<T: ApplyTarget + ?Sized>(&self, target: &mut T) {
        match self {
            HistoryAction::Create(a) => target.insert(a.clone()),
            HistoryAction::Delete(a) => {
                target.remove(a.id());
            }
        }
    }

    /// Annotation this action is about
    pub fn annotation(&self) -> &Annotation {
        match self {
            HistoryAction::Create(a) | HistoryAction::Delete(a) => a,
        }
    }

    fn describe(&self) -> String {
        match self {
            HistoryAction::Create(a) => format!("Create {}", a.kind()),
            HistoryAction::Delete(a) => format!("Delete {}", a.kind()),
        }
    }
}

/// A recorded action with display metadata
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub action: HistoryAction,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

/// Row of the history timeline, oldest first
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimelineEntry<'a> {
    pub index: usize,
    pub entry: &'a HistoryEntry,
    /// Whether the action is currently in effect (on the undo side)
    pub applied: bool,
}

/// Undo/redo stacks
#[derive(Debug, Clone, Default)]
pub struct HistoryManager {
    /// Undoable actions, most recent last
    past: Vec<HistoryEntry>,
    /// Redoable actions, next redo last
    future: Vec<HistoryEntry>,
    /// Oldest entries are dropped beyond this many undoable actions
    limit: Option<usize>,
}

impl HistoryManager {
    /// Create an unbounded history
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a history that keeps at most `limit` undoable actions
    ///
    /// With a limit, recording beyond it forgets the oldest undoable
    /// entries for good: `len()` then no longer counts every recorded
    /// action, and timeline indexes shift down by the number dropped. The
    /// forgotten actions stay applied to the annotation set. `None` keeps
    /// every action.
    pub fn with_limit(limit: Option<usize>) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    /// Record that an annotation was created
    pub fn record_create(&mut self, annotation: Annotation) {
        self.record(HistoryAction::Create(annotation));
    }

    /// Record that an annotation was deleted
    pub fn record_delete(&mut self, annotation: Annotation) {
        self.record(HistoryAction::Delete(annotation));
    }

    fn record(&mut self, action: HistoryAction) {
        // A new action invalidates the redo branch
        self.future.clear();
        self.past.push(HistoryEntry {
            description: action.describe(),
            action,
            timestamp: Utc::now(),
        });

        if let Some(limit) = self.limit {
            if self.past.len() > limit {
                let excess = self.past.len() - limit;
                self.past.drain(..excess);
            }
        }
    }

    /// Step back one action
    ///
    /// Returns the recorded action; apply its inverse to the store.
    pub fn undo(&mut self) -> Option<HistoryAction> {
        let entry = self.past.pop()?;
        let action = entry.action.clone();
        self.future.push(entry);
        Some(action)
    }

    /// Step forward one action
    ///
    /// Returns the recorded action; apply it to the store as-is.
    pub fn redo(&mut self) -> Option<HistoryAction> {
        let entry = self.future.pop()?;
        let action = entry.action.clone();
        self.past.push(entry);
        Some(action)
    }

    /// Undo until timeline entry `index` is the most recent applied action
    ///
    /// Actions come back newest first, in the order they must be inverted.
    /// An index that is not currently applied yields nothing.
    pub fn undo_to_index(&mut self, index: usize) -> Vec<HistoryAction> {
        if index >= self.past.len() {
            return Vec::new();
        }
        let steps = self.past.len() - (index + 1);
        (0..steps).filter_map(|_| self.undo()).collect()
    }

    /// Redo until timeline entry `index` is the most recent applied action
    ///
    /// Actions come back oldest first, in the order they must be re-applied.
    /// Indexes past the end of the timeline stop at its end.
    pub fn redo_to_index(&mut self, index: usize) -> Vec<HistoryAction> {
        if index < self.past.len() {
            return Vec::new();
        }
        let target = (index + 1).min(self.len());
        let steps = target - self.past.len();
        (0..steps).filter_map(|_| self.redo()).collect()
    }

    /// Drop both stacks; the annotation set is left as it is
    pub fn clear_history(&mut self) {
        self.past.clear();
        self.future.clear();
    }

    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    pub fn undo_count(&self) -> usize {
        self.past.len()
    }

    pub fn redo_count(&self) -> usize {
        self.future.len()
    }

    /// Total number of entries on both stacks
    pub fn len(&self) -> usize {
        self.past.len() + self.future.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All entries, oldest first, with whether each is currently applied
    pub fn timeline(&self) -> Vec<TimelineEntry<'_>> {
        let applied = self.past.iter().map(|e| (e, true));
        let pending = self.future.iter().rev().map(|e| (e, false));
        applied
            .chain(pending)
            .enumerate()
            .map(|(index, (entry, applied))| TimelineEntry {
                index,
                entry,
                applied,
            })
            .collect()
    }
}
