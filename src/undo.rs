//! Undo history of committed operations.
//!
//! Each [`UndoRecord`] is a whole-state copy of the cluster collection and the
//! entry store, taken just before a committing operation. Undoing pops the
//! newest record and restores it. There is no redo: undoing consumes history.
//!
//! Whole-state copies keep restore trivially correct. At tens to a few
//! hundred clusters a snapshot is a few kilobytes, so the stack is unbounded.

use crate::clusters::{ClusterModel, ClusterSnapshot};
use crate::entries::EntryStore;

#[derive(Debug, Clone)]
pub struct UndoRecord {
    operation: String,
    clusters: ClusterSnapshot,
    entries: EntryStore,
}

impl UndoRecord {
    pub fn capture(operation: impl Into<String>, clusters: &ClusterModel, entries: &EntryStore) -> Self {
        Self {
            operation: operation.into(),
            clusters: clusters.snapshot(),
            entries: entries.clone(),
        }
    }

    /// Name of the operation this record reverts.
    pub fn operation(&self) -> &str {
        &self.operation
    }
}

#[derive(Debug, Default)]
pub struct UndoStack {
    records: Vec<UndoRecord>,
}

impl UndoStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: UndoRecord) {
        self.records.push(record);
    }

    /// Pop the newest record and restore it. Returns `false` with no effect
    /// when there is nothing to undo.
    pub fn undo(&mut self, clusters: &mut ClusterModel, entries: &mut EntryStore) -> bool {
        let Some(record) = self.records.pop() else {
            return false;
        };
        tracing::debug!(operation = %record.operation, "undo");
        clusters.restore(record.clusters);
        entries.restore(record.entries);
        true
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Operation names, oldest first.
    pub fn operations(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.operation()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::entry_store;

    #[test]
    fn undo_on_empty_stack_is_false() {
        let mut stack = UndoStack::new();
        let mut clusters = ClusterModel::new();
        let mut entries = EntryStore::new();
        assert!(!stack.undo(&mut clusters, &mut entries));
    }

    #[test]
    fn undo_restores_pre_mutation_state() {
        let (mut entries, ids) = entry_store(&["a", "b"]);
        let mut clusters = ClusterModel::new();
        let mut stack = UndoStack::new();

        stack.push(UndoRecord::capture("create cluster", &clusters, &entries));
        clusters.create_cluster(&entries, &ids).unwrap();
        assert_eq!(stack.operations(), vec!["create cluster"]);

        assert!(stack.undo(&mut clusters, &mut entries));
        assert!(clusters.is_empty());
        assert!(stack.is_empty());
    }

    #[test]
    fn undo_brings_back_removed_entries() {
        let (mut entries, ids) = entry_store(&["a"]);
        let mut clusters = ClusterModel::new();
        let mut stack = UndoStack::new();

        stack.push(UndoRecord::capture("remove entry", &clusters, &entries));
        entries.remove(&ids[0]).unwrap();

        stack.undo(&mut clusters, &mut entries);
        assert!(entries.contains(&ids[0]));
    }

    #[test]
    fn clear_drops_history() {
        let (entries, _) = entry_store(&["a"]);
        let clusters = ClusterModel::new();
        let mut stack = UndoStack::new();
        stack.push(UndoRecord::capture("x", &clusters, &entries));
        stack.push(UndoRecord::capture("y", &clusters, &entries));
        stack.clear();
        assert_eq!(stack.len(), 0);
    }
}
