//! The command surface of the editing core.
//!
//! [`Project`] owns the entry store, the cluster model, open edit sessions,
//! the undo stack and the merge pipeline. Every user action goes through one
//! of its methods, which keeps three rules in one place:
//!
//! - **Undo**: committing commands capture a snapshot before mutating and push
//!   it only when the mutation succeeds. Cosmetic commands (selection, opening
//!   or closing a session) and no-op commits record nothing.
//! - **Events**: every state change is published as a [`ModelEvent`].
//! - **Serialization**: all methods take `&mut self`; callers funnel commands
//!   through one sequential path. Only generation runs concurrently, on copies
//!   of the committed parameters.

use crate::clusters::{Cluster, ClusterId, ClusterModel, Detached};
use crate::entries::{EntryId, EntryStore};
use crate::error::{CoreError, Result};
use crate::events::{EventBus, ModelEvent};
use crate::imaging::ImageBackend;
use crate::output::GenerateSummary;
use crate::params::MergeParameters;
use crate::pipeline::{FinishedTask, GenerationJob, GenerationTask, MergePipeline, Outcome, TaskId};
use crate::project_file::ProjectFile;
use crate::session::{EditSession, Sessions};
use crate::undo::{UndoRecord, UndoStack};
use std::path::Path;
use std::sync::mpsc::Receiver;

pub struct Project<B: ImageBackend> {
    entries: EntryStore,
    clusters: ClusterModel,
    sessions: Sessions,
    undo: UndoStack,
    events: EventBus<ModelEvent>,
    pipeline: MergePipeline<B>,
}

impl<B: ImageBackend> Project<B> {
    pub fn new(backend: B, workers: usize) -> Result<Self> {
        Ok(Self {
            entries: EntryStore::new(),
            clusters: ClusterModel::new(),
            sessions: Sessions::new(),
            undo: UndoStack::new(),
            events: EventBus::new(),
            pipeline: MergePipeline::new(backend, workers)?,
        })
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn entries(&self) -> &EntryStore {
        &self.entries
    }

    pub fn clusters(&self) -> &ClusterModel {
        &self.clusters
    }

    pub fn cluster(&self, id: ClusterId) -> Result<&Cluster> {
        self.clusters.require(id)
    }

    pub fn committed_params(&self, id: ClusterId) -> Result<&MergeParameters> {
        Ok(self.clusters.require(id)?.params())
    }

    pub fn working_params(&self, id: ClusterId) -> Result<&MergeParameters> {
        Ok(self.sessions.get(id)?.working())
    }

    pub fn session(&self, id: ClusterId) -> Result<&EditSession> {
        self.sessions.get(id)
    }

    /// Mutable access to an open session's working copy.
    pub fn session_mut(&mut self, id: ClusterId) -> Result<&mut EditSession> {
        self.sessions.get_mut(id)
    }

    pub fn open_sessions(&self) -> Vec<ClusterId> {
        self.sessions.open_clusters()
    }

    pub fn tasks(&self) -> Vec<GenerationTask> {
        self.pipeline.tasks()
    }

    pub fn pipeline(&self) -> &MergePipeline<B> {
        &self.pipeline
    }

    pub fn backend(&self) -> &B {
        self.pipeline.backend()
    }

    pub fn subscribe(&self) -> Receiver<ModelEvent> {
        self.events.subscribe()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn undo_history(&self) -> Vec<&str> {
        self.undo.operations()
    }

    // =========================================================================
    // Entries
    // =========================================================================

    /// Load a source image. Loading is not an undoable edit.
    pub fn add_entry(&mut self, source: &Path) -> Result<EntryId> {
        let id = self.entries.add(source)?;
        tracing::debug!(entry = %id, source = %source.display(), "entry added");
        self.events.emit(ModelEvent::EntryAdded(id.clone()));
        Ok(id)
    }

    /// Remove an entry, cascading into its cluster. A cluster left empty is
    /// deleted.
    pub fn remove_entry(&mut self, id: &EntryId) -> Result<()> {
        let detached = self.committing("remove entry", |clusters, entries| {
            entries.remove(id)?;
            Ok(clusters.detach_entry(id))
        })?;
        self.events.emit(ModelEvent::EntryRemoved(id.clone()));
        match detached {
            Some(Detached::Shrunk(cluster)) => {
                self.events.emit(ModelEvent::ClusterChanged(cluster));
            }
            Some(Detached::Deleted(cluster)) => {
                self.close_stale_session(cluster);
                self.events.emit(ModelEvent::ClusterRemoved(cluster));
            }
            None => {}
        }
        Ok(())
    }

    pub fn set_entry_selected(&mut self, id: &EntryId, selected: bool) -> Result<()> {
        self.entries.set_selected(id, selected)?;
        self.events.emit(ModelEvent::EntrySelectionChanged {
            id: id.clone(),
            selected,
        });
        Ok(())
    }

    pub fn selected_entries(&self) -> Vec<EntryId> {
        self.entries.list_selected()
    }

    /// Check or uncheck every entry. Only entries whose flag actually flips
    /// are reported.
    pub fn set_all_entries_selected(&mut self, selected: bool) {
        let flipped: Vec<EntryId> = self
            .entries
            .iter()
            .filter(|e| e.selected != selected)
            .map(|e| e.id.clone())
            .collect();
        for id in flipped {
            if self.entries.set_selected(&id, selected).is_ok() {
                self.events
                    .emit(ModelEvent::EntrySelectionChanged { id, selected });
            }
        }
    }

    // =========================================================================
    // Clusters
    // =========================================================================

    pub fn create_cluster(&mut self, ids: &[EntryId]) -> Result<ClusterId> {
        let id = self.committing("create cluster", |clusters, entries| {
            clusters.create_cluster(entries, ids)
        })?;
        self.events.emit(ModelEvent::ClusterCreated(id));
        Ok(id)
    }

    pub fn merge_clusters(&mut self, a: ClusterId, b: ClusterId) -> Result<ClusterId> {
        let kept = self.committing("merge clusters", |clusters, _| {
            clusters.merge_clusters(a, b)
        })?;
        let removed = if kept == a { b } else { a };
        self.close_stale_session(removed);
        self.events.emit(ModelEvent::ClusterRemoved(removed));
        self.events.emit(ModelEvent::ClusterChanged(kept));
        Ok(kept)
    }

    pub fn split_cluster(&mut self, id: ClusterId, entries: &[EntryId]) -> Result<ClusterId> {
        let new_id = self.committing("split cluster", |clusters, _| {
            clusters.split_cluster(id, entries)
        })?;
        self.events.emit(ModelEvent::ClusterChanged(id));
        self.events.emit(ModelEvent::ClusterCreated(new_id));
        Ok(new_id)
    }

    pub fn remove_from_cluster(&mut self, id: ClusterId, entry: &EntryId) -> Result<()> {
        self.committing("remove from cluster", |clusters, _| {
            clusters.remove_from_cluster(id, entry)
        })?;
        self.events.emit(ModelEvent::ClusterChanged(id));
        Ok(())
    }

    pub fn delete_cluster(&mut self, id: ClusterId) -> Result<()> {
        self.committing("delete cluster", |clusters, _| clusters.delete_cluster(id))?;
        self.close_stale_session(id);
        self.events.emit(ModelEvent::ClusterRemoved(id));
        Ok(())
    }

    /// Replace a cluster's committed parameters. Returns `false` when they
    /// equal the current ones; nothing is recorded in that case.
    pub fn commit_parameters(&mut self, id: ClusterId, params: MergeParameters) -> Result<bool> {
        self.commit_as("commit parameters", id, params)
    }

    pub fn set_cluster_selected(&mut self, id: ClusterId, selected: bool) -> Result<()> {
        self.clusters.set_selected(id, selected)?;
        self.events
            .emit(ModelEvent::ClusterSelectionChanged { id, selected });
        Ok(())
    }

    // =========================================================================
    // Edit sessions
    // =========================================================================

    pub fn begin_edit(&mut self, id: ClusterId) -> Result<&mut EditSession> {
        let committed = self.clusters.require(id)?.params().clone();
        if self.sessions.is_open(id) {
            return Err(CoreError::Conflict(format!(
                "an edit session is already open for cluster {id}"
            )));
        }
        self.events.emit(ModelEvent::SessionOpened(id));
        self.sessions.begin(id, committed)
    }

    /// Commit the working copy and close the session. If the commit is
    /// rejected (membership changed since the session opened) the session
    /// stays open.
    pub fn apply_edit(&mut self, id: ClusterId) -> Result<bool> {
        let working = self.sessions.get(id)?.working().clone();
        let changed = self.commit_as("apply edit", id, working)?;
        self.sessions.close(id)?;
        self.events.emit(ModelEvent::SessionClosed(id));
        Ok(changed)
    }

    /// Drop pending edits; the session stays open on the current committed
    /// parameters.
    pub fn reset_edit(&mut self, id: ClusterId) -> Result<()> {
        let committed = self.clusters.require(id)?.params().clone();
        self.sessions.get_mut(id)?.reset(committed);
        Ok(())
    }

    pub fn discard_edit(&mut self, id: ClusterId) -> Result<()> {
        self.sessions.close(id)?;
        self.events.emit(ModelEvent::SessionClosed(id));
        Ok(())
    }

    /// Copy `source`'s weights and settings onto every target with the same
    /// layer count, in ascending id order. Each changed target is its own undo
    /// step; incompatible targets are skipped. Returns the updated targets.
    pub fn apply_to_all(&mut self, source: ClusterId, targets: &[ClusterId]) -> Result<Vec<ClusterId>> {
        let template = self.clusters.require(source)?.params().clone();
        for &target in targets {
            self.clusters.require(target)?;
        }
        let mut ordered: Vec<ClusterId> = targets.iter().copied().filter(|t| *t != source).collect();
        ordered.sort();
        ordered.dedup();

        let mut updated = Vec::new();
        for target in ordered {
            let current = self.clusters.require(target)?.params();
            let Some(params) = current.with_settings_of(&template) else {
                tracing::debug!(%source, %target, "apply-to-all skipped: layer count differs");
                continue;
            };
            if self.commit_as("apply to all", target, params)? {
                updated.push(target);
            }
        }
        Ok(updated)
    }

    /// [`apply_to_all`](Self::apply_to_all) over the selected clusters.
    pub fn apply_to_selected(&mut self, source: ClusterId) -> Result<Vec<ClusterId>> {
        let targets = self.clusters.list_selected();
        self.apply_to_all(source, &targets)
    }

    // =========================================================================
    // Undo
    // =========================================================================

    /// Revert the newest committed operation. Returns `false` if there is none.
    pub fn undo(&mut self) -> bool {
        if !self.undo.undo(&mut self.clusters, &mut self.entries) {
            return false;
        }
        let gone: Vec<ClusterId> = self
            .sessions
            .open_clusters()
            .into_iter()
            .filter(|id| self.clusters.get(*id).is_none())
            .collect();
        for id in gone {
            self.close_stale_session(id);
        }
        self.events.emit(ModelEvent::Reloaded);
        self.events.emit(ModelEvent::UndoAvailable(self.can_undo()));
        true
    }

    /// Forget all history, e.g. when a new project is loaded.
    pub fn clear_history(&mut self) {
        self.undo.clear();
        self.events.emit(ModelEvent::UndoAvailable(false));
    }

    /// Replace the whole model with a project file's contents. History and
    /// open sessions are dropped; on error nothing changes.
    pub fn load_file(&mut self, file: &ProjectFile) -> Result<()> {
        let (entries, clusters) = file.build()?;
        tracing::info!(
            entries = entries.len(),
            clusters = clusters.len(),
            "project loaded"
        );
        self.entries = entries;
        self.clusters = clusters;
        self.sessions.clear();
        self.clear_history();
        self.events.emit(ModelEvent::Reloaded);
        Ok(())
    }

    pub fn to_file(&self) -> ProjectFile {
        ProjectFile::capture(&self.entries, &self.clusters)
    }

    // =========================================================================
    // Generation
    // =========================================================================

    /// Queue generation for the given clusters using their committed
    /// parameters as of now.
    pub fn generate(&mut self, ids: &[ClusterId]) -> Result<Vec<TaskId>> {
        let jobs = ids
            .iter()
            .map(|&id| self.job_for(id))
            .collect::<Result<Vec<_>>>()?;
        self.pipeline.start(jobs)
    }

    /// Queue generation for every dirty cluster.
    pub fn generate_dirty(&mut self) -> Result<Vec<TaskId>> {
        let dirty = self.clusters.dirty_ids();
        self.generate(&dirty)
    }

    pub fn cancel_generation(&self, task: TaskId) -> Result<()> {
        self.pipeline.cancel(task)
    }

    pub fn wait_for_generation(&self) {
        self.pipeline.wait_idle();
    }

    /// Consume every finished task without touching dirty flags. Pair with
    /// [`record_generated`](Self::record_generated) once an output is stored.
    pub fn take_generated(&mut self) -> Vec<FinishedTask<B::Image>> {
        self.pipeline.take_finished()
    }

    /// Note that `job`'s output now exists. The cluster turns clean unless its
    /// parameters were committed again after the task started.
    pub fn record_generated(&mut self, job: &GenerationJob) {
        let cluster = job.cluster;
        self.clusters.record_generated(cluster, job.params.clone());
        match self.clusters.get(cluster) {
            Some(c) if c.is_dirty() => {
                tracing::debug!(%cluster, "output is stale, cluster stays dirty");
            }
            Some(_) => self.events.emit(ModelEvent::ClusterChanged(cluster)),
            None => {}
        }
    }

    /// Consume every finished task, treating each successful output as
    /// stored.
    pub fn collect_generated(&mut self) -> Vec<FinishedTask<B::Image>> {
        let finished = self.take_generated();
        for task in &finished {
            if matches!(task.outcome, Outcome::Done(_)) {
                self.record_generated(&task.job);
            }
        }
        finished
    }

    /// Write every finished output to `out_dir` as
    /// `<first-layer>_cluster_<id>.<extension>`. A cluster counts as generated
    /// only once its file is written; a failed write is listed in the summary
    /// and leaves the cluster dirty.
    pub fn save_generated(&mut self, out_dir: &Path, extension: &str) -> GenerateSummary {
        let mut summary = GenerateSummary::default();
        for finished in self.take_generated() {
            let cluster = finished.job.cluster;
            match finished.outcome {
                Outcome::Done(image) => {
                    let path = out_dir.join(finished.job.output_file_name(extension));
                    let written = std::fs::create_dir_all(out_dir)
                        .map_err(|e| format!("cannot create {}: {}", out_dir.display(), e))
                        .and_then(|()| {
                            self.backend()
                                .save(&image, &path)
                                .map_err(|e| e.to_string())
                        });
                    match written {
                        Ok(()) => {
                            self.record_generated(&finished.job);
                            summary.saved.push(path);
                        }
                        Err(err) => {
                            tracing::warn!(%cluster, error = %err, "output not written");
                            summary.failed.push((cluster.to_string(), err));
                        }
                    }
                }
                Outcome::Failed(err) => summary.failed.push((cluster.to_string(), err.to_string())),
                Outcome::Cancelled => summary.cancelled += 1,
            }
        }
        summary
    }

    fn job_for(&self, id: ClusterId) -> Result<GenerationJob> {
        let cluster = self.clusters.require(id)?;
        let layers = cluster
            .params()
            .composition_order()
            .into_iter()
            .map(|layer| {
                let entry = self
                    .entries
                    .get(&layer.entry)
                    .ok_or_else(|| CoreError::not_found("Entry", &layer.entry))?;
                Ok((entry.source.clone(), layer.weight))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(GenerationJob {
            cluster: id,
            params: cluster.params().clone(),
            layers,
        })
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Run a committing mutation with undo bookkeeping.
    fn committing<T>(
        &mut self,
        operation: &str,
        mutate: impl FnOnce(&mut ClusterModel, &mut EntryStore) -> Result<T>,
    ) -> Result<T> {
        let record = UndoRecord::capture(operation, &self.clusters, &self.entries);
        let was_empty = self.undo.is_empty();
        let value = mutate(&mut self.clusters, &mut self.entries)?;
        self.undo.push(record);
        tracing::debug!(operation, depth = self.undo.len(), "committed");
        if was_empty {
            self.events.emit(ModelEvent::UndoAvailable(true));
        }
        Ok(value)
    }

    fn commit_as(&mut self, operation: &str, id: ClusterId, params: MergeParameters) -> Result<bool> {
        let cluster = self.clusters.require(id)?;
        params.validate_for(cluster.members())?;
        if cluster.params() == &params {
            return Ok(false);
        }
        self.committing(operation, |clusters, _| clusters.commit_parameters(id, params))?;
        self.events.emit(ModelEvent::ClusterChanged(id));
        Ok(true)
    }

    fn close_stale_session(&mut self, id: ClusterId) {
        if self.sessions.close(id).is_ok() {
            self.events.emit(ModelEvent::SessionClosed(id));
        }
    }
}
