//! Background merge generation.
//!
//! Takes [`GenerationJob`]s (a cluster id plus a copy of its layers, taken
//! when generation is requested) and composes one output image per job on a
//! bounded worker pool.
//!
//! ## Task lifecycle
//!
//! ```text
//! pending ──► running ──► done
//!    │           ├──────► cancelled
//!    │           └──────► failed
//!    └──────────────────► cancelled   (cancelled before a worker picked it up)
//! ```
//!
//! A task stays in the table after it terminates until its result is taken
//! with [`MergePipeline::take_finished`] or [`MergePipeline::take`]. A cluster
//! may have at most one pending or running task.
//!
//! ## Progress and cancellation
//!
//! Layers are folded one at a time through the codec's `composite`. After each
//! layer the task's progress becomes `layers_done / layer_count` and a
//! [`GenerationEvent::Progress`] is published. The cancel flag is checked
//! before every layer and once more before the task is marked done; a
//! cancelled task produces no output.
//!
//! ## Parallel Processing
//!
//! Tasks run on a dedicated [rayon](https://docs.rs/rayon) pool, queued FIFO.
//! Jobs own their inputs, so edits committed while a task runs only affect the
//! next generation.

use crate::clusters::ClusterId;
use crate::error::{CoreError, Result};
use crate::events::EventBus;
use crate::imaging::{BackendError, ImageBackend};
use crate::params::MergeParameters;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Running,
    Done,
    Cancelled,
    Failed,
}

impl TaskStatus {
    pub fn is_in_flight(self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Running)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_in_flight()
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Done => "done",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Everything a worker needs to render one cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationJob {
    pub cluster: ClusterId,
    /// The committed parameters the job was built from.
    pub params: MergeParameters,
    /// Source path and weight per layer, in composition order.
    pub layers: Vec<(PathBuf, f32)>,
}

impl GenerationJob {
    /// `<first-layer-stem>_cluster_<id>.<extension>`
    pub fn output_file_name(&self, extension: &str) -> String {
        let stem = self
            .layers
            .first()
            .and_then(|(path, _)| path.file_stem())
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "merged".to_string());
        format!("{}_cluster_{}.{}", stem, self.cluster, extension)
    }
}

/// Read-only view of a task.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationTask {
    pub id: TaskId,
    pub cluster: ClusterId,
    pub status: TaskStatus,
    pub progress: f32,
    pub layer_count: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GenerationEvent {
    Queued { task: TaskId, cluster: ClusterId },
    Started { task: TaskId, cluster: ClusterId },
    Progress { task: TaskId, cluster: ClusterId, progress: f32 },
    Finished { task: TaskId, cluster: ClusterId, status: TaskStatus },
}

#[derive(Debug)]
pub enum Outcome<I> {
    Done(I),
    Cancelled,
    Failed(CoreError),
}

/// A terminated task handed back to the caller.
#[derive(Debug)]
pub struct FinishedTask<I> {
    pub task: TaskId,
    pub job: GenerationJob,
    pub outcome: Outcome<I>,
}

struct Slot<I> {
    job: GenerationJob,
    status: TaskStatus,
    progress: f32,
    cancel: Arc<AtomicBool>,
    output: Option<I>,
    error: Option<BackendError>,
}

impl<I> Slot<I> {
    fn view(&self, id: TaskId) -> GenerationTask {
        GenerationTask {
            id,
            cluster: self.job.cluster,
            status: self.status,
            progress: self.progress,
            layer_count: self.job.layers.len(),
            error: self.error.as_ref().map(|e| e.to_string()),
        }
    }

    fn into_finished(self, task: TaskId) -> FinishedTask<I> {
        let outcome = match (self.status, self.output, self.error) {
            (TaskStatus::Done, Some(image), _) => Outcome::Done(image),
            (TaskStatus::Failed, _, Some(err)) => Outcome::Failed(CoreError::Generation(err)),
            (TaskStatus::Failed, _, None) => Outcome::Failed(CoreError::Generation(
                BackendError::ProcessingFailed("unknown failure".to_string()),
            )),
            _ => Outcome::Cancelled,
        };
        FinishedTask {
            task,
            job: self.job,
            outcome,
        }
    }
}

struct Shared<I> {
    table: Mutex<BTreeMap<TaskId, Slot<I>>>,
    changed: Condvar,
    events: EventBus<GenerationEvent>,
}

impl<I> Shared<I> {
    fn lock(&self) -> MutexGuard<'_, BTreeMap<TaskId, Slot<I>>> {
        self.table.lock().expect("task table lock poisoned")
    }
}

pub struct MergePipeline<B: ImageBackend> {
    backend: Arc<B>,
    pool: rayon::ThreadPool,
    shared: Arc<Shared<B::Image>>,
    next_task: u64,
}

impl<B: ImageBackend> MergePipeline<B> {
    /// Pipeline with `workers` threads (at least one).
    pub fn new(backend: B, workers: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("merge-worker-{i}"))
            .build()?;
        Ok(Self {
            backend: Arc::new(backend),
            pool,
            shared: Arc::new(Shared {
                table: Mutex::new(BTreeMap::new()),
                changed: Condvar::new(),
                events: EventBus::new(),
            }),
            next_task: 1,
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn subscribe(&self) -> Receiver<GenerationEvent> {
        self.shared.events.subscribe()
    }

    /// Queue one task per job. Fails without queuing anything if any cluster
    /// already has a task in flight or appears twice.
    pub fn start(&mut self, jobs: Vec<GenerationJob>) -> Result<Vec<TaskId>> {
        let mut queued = Vec::with_capacity(jobs.len());
        {
            let mut table = self.shared.lock();
            let busy: BTreeSet<ClusterId> = table
                .values()
                .filter(|s| s.status.is_in_flight())
                .map(|s| s.job.cluster)
                .collect();
            let mut requested = BTreeSet::new();
            for job in &jobs {
                if busy.contains(&job.cluster) || !requested.insert(job.cluster) {
                    return Err(CoreError::Conflict(format!(
                        "cluster {} already has a generation in flight",
                        job.cluster
                    )));
                }
                if job.layers.is_empty() {
                    return Err(CoreError::Validation(format!(
                        "cluster {} has no layers to compose",
                        job.cluster
                    )));
                }
            }

            for job in jobs {
                let id = TaskId(self.next_task);
                self.next_task += 1;
                let cluster = job.cluster;
                table.insert(
                    id,
                    Slot {
                        job,
                        status: TaskStatus::Pending,
                        progress: 0.0,
                        cancel: Arc::new(AtomicBool::new(false)),
                        output: None,
                        error: None,
                    },
                );
                queued.push((id, cluster));
            }
        }

        for &(task, cluster) in &queued {
            tracing::info!(%task, %cluster, "generation queued");
            self.shared
                .events
                .emit(GenerationEvent::Queued { task, cluster });
            let backend = Arc::clone(&self.backend);
            let shared = Arc::clone(&self.shared);
            self.pool
                .spawn_fifo(move || run_task(backend.as_ref(), shared.as_ref(), task));
        }
        Ok(queued.into_iter().map(|(id, _)| id).collect())
    }

    /// Request cooperative cancellation. Pending tasks are cancelled at once;
    /// running tasks stop at the next layer boundary. Cancelling a finished
    /// task does nothing.
    pub fn cancel(&self, task: TaskId) -> Result<()> {
        let mut table = self.shared.lock();
        let slot = table
            .get_mut(&task)
            .ok_or_else(|| CoreError::not_found("Task", task))?;
        slot.cancel.store(true, Ordering::Release);
        if slot.status == TaskStatus::Pending {
            slot.status = TaskStatus::Cancelled;
            let cluster = slot.job.cluster;
            drop(table);
            self.shared.changed.notify_all();
            self.shared.events.emit(GenerationEvent::Finished {
                task,
                cluster,
                status: TaskStatus::Cancelled,
            });
        }
        tracing::info!(%task, "cancellation requested");
        Ok(())
    }

    /// Cancel every task still in flight.
    pub fn cancel_all(&self) {
        let in_flight: Vec<TaskId> = self
            .shared
            .lock()
            .iter()
            .filter(|(_, s)| s.status.is_in_flight())
            .map(|(id, _)| *id)
            .collect();
        for task in in_flight {
            // Tasks cannot disappear while in flight
            let _ = self.cancel(task);
        }
    }

    pub fn task(&self, task: TaskId) -> Option<GenerationTask> {
        self.shared.lock().get(&task).map(|s| s.view(task))
    }

    pub fn tasks(&self) -> Vec<GenerationTask> {
        self.shared
            .lock()
            .iter()
            .map(|(id, s)| s.view(*id))
            .collect()
    }

    pub fn is_in_flight(&self, cluster: ClusterId) -> bool {
        self.shared
            .lock()
            .values()
            .any(|s| s.job.cluster == cluster && s.status.is_in_flight())
    }

    pub fn is_idle(&self) -> bool {
        self.shared.lock().values().all(|s| s.status.is_terminal())
    }

    /// Block until `task` terminates.
    pub fn wait(&self, task: TaskId) -> Result<TaskStatus> {
        let table = self.shared.lock();
        if !table.contains_key(&task) {
            return Err(CoreError::not_found("Task", task));
        }
        let table = self
            .shared
            .changed
            .wait_while(table, |t| {
                t.get(&task).is_some_and(|s| s.status.is_in_flight())
            })
            .expect("task table lock poisoned");
        table
            .get(&task)
            .map(|s| s.status)
            .ok_or_else(|| CoreError::not_found("Task", task))
    }

    /// Block until no task is pending or running.
    pub fn wait_idle(&self) {
        let table = self.shared.lock();
        let _idle = self
            .shared
            .changed
            .wait_while(table, |t| t.values().any(|s| s.status.is_in_flight()))
            .expect("task table lock poisoned");
    }

    /// Remove and return every terminated task, in task order.
    pub fn take_finished(&self) -> Vec<FinishedTask<B::Image>> {
        let mut table = self.shared.lock();
        let done: Vec<TaskId> = table
            .iter()
            .filter(|(_, s)| s.status.is_terminal())
            .map(|(id, _)| *id)
            .collect();
        done.into_iter()
            .filter_map(|id| table.remove(&id).map(|slot| slot.into_finished(id)))
            .collect()
    }

    /// Remove and return one task if it has terminated; `Ok(None)` while it
    /// is still in flight.
    pub fn take(&self, task: TaskId) -> Result<Option<FinishedTask<B::Image>>> {
        let mut table = self.shared.lock();
        let status = table
            .get(&task)
            .map(|s| s.status)
            .ok_or_else(|| CoreError::not_found("Task", task))?;
        if status.is_in_flight() {
            return Ok(None);
        }
        Ok(table.remove(&task).map(|slot| slot.into_finished(task)))
    }
}

/// Worker body: claim the slot, compose, publish the terminal state.
#[tracing::instrument(skip(backend, shared))]
fn run_task<B: ImageBackend>(backend: &B, shared: &Shared<B::Image>, task: TaskId) {
    let (cluster, layers, cancel) = {
        let mut table = shared.lock();
        let Some(slot) = table.get_mut(&task) else {
            return;
        };
        // Cancelled while queued
        if slot.status != TaskStatus::Pending {
            return;
        }
        slot.status = TaskStatus::Running;
        (
            slot.job.cluster,
            slot.job.layers.clone(),
            Arc::clone(&slot.cancel),
        )
    };
    shared.events.emit(GenerationEvent::Started { task, cluster });

    let result = compose(backend, &layers, &cancel, |progress| {
        if let Some(slot) = shared.lock().get_mut(&task) {
            slot.progress = progress;
        }
        shared.events.emit(GenerationEvent::Progress {
            task,
            cluster,
            progress,
        });
    });

    let status = {
        let mut table = shared.lock();
        let Some(slot) = table.get_mut(&task) else {
            return;
        };
        slot.status = match result {
            Ok(Some(image)) => {
                slot.output = Some(image);
                TaskStatus::Done
            }
            Ok(None) => TaskStatus::Cancelled,
            Err(err) => {
                tracing::warn!(%task, %cluster, error = %err, "generation failed");
                slot.error = Some(err);
                TaskStatus::Failed
            }
        };
        slot.status
    };
    shared.changed.notify_all();
    tracing::info!(%task, %cluster, %status, "generation finished");
    shared.events.emit(GenerationEvent::Finished {
        task,
        cluster,
        status,
    });
}

/// Fold layers through the backend. `Ok(None)` means cancelled.
fn compose<B: ImageBackend>(
    backend: &B,
    layers: &[(PathBuf, f32)],
    cancel: &AtomicBool,
    mut on_progress: impl FnMut(f32),
) -> std::result::Result<Option<B::Image>, BackendError> {
    let total = layers.len();
    let mut acc: Option<B::Image> = None;
    for (done, (path, weight)) in layers.iter().enumerate() {
        if cancel.load(Ordering::Acquire) {
            return Ok(None);
        }
        let layer = load_layer(backend, path)?;
        let next = match acc.take() {
            None => backend.composite(&[(layer, *weight)])?,
            Some(prev) => backend.composite(&[(prev, 1.0), (layer, *weight)])?,
        };
        acc = Some(next);
        tracing::debug!(layer = done + 1, total, "layer composited");
        on_progress((done + 1) as f32 / total as f32);
    }
    if cancel.load(Ordering::Acquire) {
        return Ok(None);
    }
    acc.map(Some)
        .ok_or_else(|| BackendError::ProcessingFailed("no layers to compose".to_string()))
}

fn load_layer<B: ImageBackend>(backend: &B, path: &Path) -> std::result::Result<B::Image, BackendError> {
    backend.load(path).map_err(|e| match e {
        BackendError::Io(io) => BackendError::ProcessingFailed(format!(
            "cannot read {}: {}",
            path.display(),
            io
        )),
        other => other,
    })
}
