//! Cluster model: groups of entries and their committed merge parameters.
//!
//! The model is the sole mutator of [`Cluster`] state. It enforces two
//! structural invariants on every operation:
//!
//! - an entry belongs to at most one cluster;
//! - a cluster is never empty, and its layers reference exactly its members.
//!
//! Rejected operations leave the model untouched. Undo bookkeeping is not
//! done here; [`Project`](crate::project::Project) captures a
//! [`ClusterSnapshot`] before each committing call.
//!
//! ## Dirty flag
//!
//! `dirty` means "the committed parameters differ from the last generated
//! output". The model remembers the parameters each cluster was last rendered
//! with and re-derives the flag after every change, undo included. That
//! record lives outside [`ClusterSnapshot`]: undoing an edit does not unwrite
//! the file it produced.

use crate::entries::{EntryId, EntryStore};
use crate::error::{CoreError, Result};
use crate::params::MergeParameters;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClusterId(pub u64);

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub id: ClusterId,
    members: BTreeSet<EntryId>,
    params: MergeParameters,
    dirty: bool,
    selected: bool,
}

impl Cluster {
    pub fn members(&self) -> &BTreeSet<EntryId> {
        &self.members
    }

    pub fn params(&self) -> &MergeParameters {
        &self.params
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Full copy of the cluster collection, used by the undo stack.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterSnapshot {
    clusters: BTreeMap<ClusterId, Cluster>,
}

/// What happened to a cluster when one of its entries was detached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detached {
    Shrunk(ClusterId),
    Deleted(ClusterId),
}

#[derive(Debug, Clone)]
pub struct ClusterModel {
    clusters: BTreeMap<ClusterId, Cluster>,
    generated: BTreeMap<ClusterId, MergeParameters>,
    next_id: u64,
}

/// Two models are equal when they hold the same clusters; the id counter and
/// the generation record are bookkeeping.
impl PartialEq for ClusterModel {
    fn eq(&self, other: &Self) -> bool {
        self.clusters == other.clusters
    }
}

impl Default for ClusterModel {
    fn default() -> Self {
        Self {
            clusters: BTreeMap::new(),
            generated: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl ClusterModel {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn get(&self, id: ClusterId) -> Option<&Cluster> {
        self.clusters.get(&id)
    }

    pub fn require(&self, id: ClusterId) -> Result<&Cluster> {
        self.clusters
            .get(&id)
            .ok_or_else(|| CoreError::not_found("Cluster", id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters.values()
    }

    pub fn ids(&self) -> Vec<ClusterId> {
        self.clusters.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    pub fn cluster_of(&self, entry: &EntryId) -> Option<ClusterId> {
        self.clusters
            .values()
            .find(|c| c.members.contains(entry))
            .map(|c| c.id)
    }

    pub fn dirty_ids(&self) -> Vec<ClusterId> {
        self.clusters
            .values()
            .filter(|c| c.dirty)
            .map(|c| c.id)
            .collect()
    }

    pub fn list_selected(&self) -> Vec<ClusterId> {
        self.clusters
            .values()
            .filter(|c| c.selected)
            .map(|c| c.id)
            .collect()
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Create a cluster from unclustered entries. Layers follow the given order.
    pub fn create_cluster(&mut self, entries: &EntryStore, ids: &[EntryId]) -> Result<ClusterId> {
        if ids.is_empty() {
            return Err(CoreError::Conflict("a cluster needs at least one entry".into()));
        }
        let mut members = BTreeSet::new();
        for entry in ids {
            if !entries.contains(entry) {
                return Err(CoreError::not_found("Entry", entry));
            }
            if let Some(owner) = self.cluster_of(entry) {
                return Err(CoreError::Conflict(format!(
                    "entry {entry} already belongs to cluster {owner}"
                )));
            }
            if !members.insert(entry.clone()) {
                return Err(CoreError::Conflict(format!("entry {entry} listed twice")));
            }
        }

        let id = self.allocate_id();
        self.clusters.insert(
            id,
            Cluster {
                id,
                params: MergeParameters::for_members(ids),
                members,
                dirty: true,
                selected: false,
            },
        );
        Ok(id)
    }

    /// Union two clusters. The larger one (lower id on a tie) keeps its id and
    /// parameters; the other's layers are appended after its own.
    pub fn merge_clusters(&mut self, a: ClusterId, b: ClusterId) -> Result<ClusterId> {
        if a == b {
            return Err(CoreError::Conflict(format!("cannot merge cluster {a} with itself")));
        }
        let size_a = self.require(a)?.len();
        let size_b = self.require(b)?.len();
        let (keep, absorb) = match size_a.cmp(&size_b) {
            std::cmp::Ordering::Greater => (a, b),
            std::cmp::Ordering::Less => (b, a),
            std::cmp::Ordering::Equal => (a.min(b), a.max(b)),
        };

        let absorbed = self
            .clusters
            .remove(&absorb)
            .ok_or_else(|| CoreError::not_found("Cluster", absorb))?;
        let kept = self
            .clusters
            .get_mut(&keep)
            .ok_or_else(|| CoreError::not_found("Cluster", keep))?;
        kept.members.extend(absorbed.members);
        kept.params.append_layers(absorbed.params.layers().iter().cloned());
        kept.selected |= absorbed.selected;
        self.refresh_dirty(keep);
        Ok(keep)
    }

    /// Move `entries` out of `id` into a new cluster that keeps their weights.
    pub fn split_cluster(&mut self, id: ClusterId, entries: &[EntryId]) -> Result<ClusterId> {
        let source = self.require(id)?;
        if entries.is_empty() {
            return Err(CoreError::Conflict("nothing to split off".into()));
        }
        let moved: BTreeSet<EntryId> = entries.iter().cloned().collect();
        if moved.len() != entries.len() {
            return Err(CoreError::Conflict("entry listed twice".into()));
        }
        if let Some(stranger) = moved.iter().find(|e| !source.members.contains(*e)) {
            return Err(CoreError::Validation(format!(
                "entry {stranger} is not a member of cluster {id}"
            )));
        }
        if moved.len() == source.members.len() {
            return Err(CoreError::Conflict(format!(
                "splitting every member would leave cluster {id} empty"
            )));
        }

        let new_id = self.allocate_id();
        let source = self
            .clusters
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found("Cluster", id))?;
        let settings = source.params.settings();
        let mut layers = Vec::new();
        for layer in source.params.layers().to_vec() {
            if moved.contains(&layer.entry) {
                source.params.remove_layer(&layer.entry);
                source.members.remove(&layer.entry);
                layers.push(layer);
            }
        }
        self.refresh_dirty(id);

        self.clusters.insert(
            new_id,
            Cluster {
                id: new_id,
                members: moved,
                params: MergeParameters::new(layers, settings),
                dirty: true,
                selected: false,
            },
        );
        Ok(new_id)
    }

    /// Remove one member. The last member cannot be removed; delete the
    /// cluster instead.
    pub fn remove_from_cluster(&mut self, id: ClusterId, entry: &EntryId) -> Result<()> {
        let cluster = self
            .clusters
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found("Cluster", id))?;
        if !cluster.members.contains(entry) {
            return Err(CoreError::not_found("Member", entry));
        }
        if cluster.members.len() == 1 {
            return Err(CoreError::Conflict(format!(
                "removing {entry} would leave cluster {id} empty"
            )));
        }
        cluster.members.remove(entry);
        cluster.params.remove_layer(entry);
        self.refresh_dirty(id);
        Ok(())
    }

    pub fn delete_cluster(&mut self, id: ClusterId) -> Result<Cluster> {
        self.clusters
            .remove(&id)
            .ok_or_else(|| CoreError::not_found("Cluster", id))
    }

    /// Replace the committed parameters. Returns `false` (and changes nothing)
    /// when `params` equals the current parameters.
    pub fn commit_parameters(&mut self, id: ClusterId, params: MergeParameters) -> Result<bool> {
        let cluster = self
            .clusters
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found("Cluster", id))?;
        params.validate_for(&cluster.members)?;
        if cluster.params == params {
            return Ok(false);
        }
        cluster.params = params;
        self.refresh_dirty(id);
        Ok(true)
    }

    /// Record that the current committed parameters have been rendered.
    /// Unknown ids are ignored.
    pub fn mark_clean(&mut self, id: ClusterId) {
        if let Some(cluster) = self.clusters.get(&id) {
            let params = cluster.params.clone();
            self.record_generated(id, params);
        }
    }

    /// Record the parameters an output of `id` was rendered with. The cluster
    /// stays dirty if they are no longer its committed parameters. The record
    /// is kept for deleted clusters, so undoing the delete restores a clean
    /// flag when nothing changed.
    pub fn record_generated(&mut self, id: ClusterId, params: MergeParameters) {
        self.generated.insert(id, params);
        self.refresh_dirty(id);
    }

    pub fn last_generated(&self, id: ClusterId) -> Option<&MergeParameters> {
        self.generated.get(&id)
    }

    pub fn set_selected(&mut self, id: ClusterId, selected: bool) -> Result<()> {
        let cluster = self
            .clusters
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found("Cluster", id))?;
        cluster.selected = selected;
        Ok(())
    }

    /// Drop `entry` from whichever cluster holds it, deleting that cluster if
    /// it becomes empty.
    pub fn detach_entry(&mut self, entry: &EntryId) -> Option<Detached> {
        let id = self.cluster_of(entry)?;
        let cluster = self.clusters.get_mut(&id)?;
        if cluster.members.len() == 1 {
            self.clusters.remove(&id);
            return Some(Detached::Deleted(id));
        }
        cluster.members.remove(entry);
        cluster.params.remove_layer(entry);
        self.refresh_dirty(id);
        Some(Detached::Shrunk(id))
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    pub fn snapshot(&self) -> ClusterSnapshot {
        ClusterSnapshot {
            clusters: self.clusters.clone(),
        }
    }

    /// Replace every cluster with the snapshot's. Ids are never reused, so the
    /// id counter keeps running. Dirty flags are re-derived against what was
    /// generated since the snapshot was taken.
    pub fn restore(&mut self, snapshot: ClusterSnapshot) {
        self.clusters = snapshot.clusters;
        for id in self.ids() {
            self.refresh_dirty(id);
        }
    }

    fn refresh_dirty(&mut self, id: ClusterId) {
        if let Some(cluster) = self.clusters.get_mut(&id) {
            cluster.dirty = self.generated.get(&id) != Some(&cluster.params);
        }
    }

    fn allocate_id(&mut self) -> ClusterId {
        let id = ClusterId(self.next_id);
        self.next_id += 1;
        id
    }
}
