//! Edit sessions: transactional working copies of cluster parameters.
//!
//! Opening a session copies the cluster's committed [`MergeParameters`] into
//! a working copy. Edits touch only the working copy until the session is
//! applied through [`Project::apply_edit`](crate::project::Project::apply_edit).
//! At most one session per cluster; sessions on different clusters are
//! independent.

use crate::clusters::ClusterId;
use crate::entries::EntryId;
use crate::error::{CoreError, Result};
use crate::params::{MergeParameters, MergeSettings};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct EditSession {
    cluster: ClusterId,
    committed: MergeParameters,
    working: MergeParameters,
}

impl EditSession {
    fn new(cluster: ClusterId, committed: MergeParameters) -> Self {
        Self {
            cluster,
            working: committed.clone(),
            committed,
        }
    }

    pub fn cluster(&self) -> ClusterId {
        self.cluster
    }

    pub fn working(&self) -> &MergeParameters {
        &self.working
    }

    /// Parameters the working copy was last synced with.
    pub fn committed(&self) -> &MergeParameters {
        &self.committed
    }

    pub fn has_pending_edits(&self) -> bool {
        self.working != self.committed
    }

    pub fn set_layer_order(&mut self, order: &[EntryId]) -> Result<()> {
        self.working.reorder(order)
    }

    pub fn set_layer_weight(&mut self, entry: &EntryId, weight: f32) -> Result<()> {
        self.working.set_weight(entry, weight)
    }

    pub fn set_settings(&mut self, settings: MergeSettings) {
        self.working.set_settings(settings);
    }

    /// Discard pending edits; the working copy becomes `committed`.
    pub(crate) fn reset(&mut self, committed: MergeParameters) {
        self.working = committed.clone();
        self.committed = committed;
    }
}

/// Open sessions keyed by cluster.
#[derive(Debug, Default)]
pub struct Sessions {
    open: BTreeMap<ClusterId, EditSession>,
}

impl Sessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, cluster: ClusterId, committed: MergeParameters) -> Result<&mut EditSession> {
        if self.open.contains_key(&cluster) {
            return Err(CoreError::Conflict(format!(
                "an edit session is already open for cluster {cluster}"
            )));
        }
        Ok(self
            .open
            .entry(cluster)
            .or_insert_with(|| EditSession::new(cluster, committed)))
    }

    pub fn get(&self, cluster: ClusterId) -> Result<&EditSession> {
        self.open
            .get(&cluster)
            .ok_or_else(|| CoreError::not_found("Edit session", cluster))
    }

    pub fn get_mut(&mut self, cluster: ClusterId) -> Result<&mut EditSession> {
        self.open
            .get_mut(&cluster)
            .ok_or_else(|| CoreError::not_found("Edit session", cluster))
    }

    pub fn close(&mut self, cluster: ClusterId) -> Result<EditSession> {
        self.open
            .remove(&cluster)
            .ok_or_else(|| CoreError::not_found("Edit session", cluster))
    }

    pub fn is_open(&self, cluster: ClusterId) -> bool {
        self.open.contains_key(&cluster)
    }

    pub fn open_clusters(&self) -> Vec<ClusterId> {
        self.open.keys().copied().collect()
    }

    pub fn clear(&mut self) {
        self.open.clear();
    }
}
