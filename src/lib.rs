//! # Cluster Merge
//!
//! Group source images into clusters, tune how each cluster's members are
//! layered, and render one merged image per cluster.
//!
//! # Architecture: Model, Sessions, Pipeline
//!
//! ```text
//! EntryStore ──► ClusterModel ◄── EditSession (working copy)
//!                    │   ▲
//!        snapshot    │   │ restore
//!                    ▼   │
//!                 UndoStack
//!                    │
//!   committed params │ copy
//!                    ▼
//!             MergePipeline ──► ImageBackend (load / composite / save)
//! ```
//!
//! [`project::Project`] owns all of it and is the only entry point for
//! commands. Model commands run one at a time on the caller's thread;
//! generation runs on a worker pool against copies of the committed
//! parameters, so editing never waits for rendering and rendering never sees
//! a half-applied edit.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`entries`] | Loaded source images and their selection flags |
//! | [`params`] | Layers, weights and merge settings of a cluster |
//! | [`clusters`] | Cluster model: membership, committed parameters, dirty flags |
//! | [`session`] | Transactional edit sessions over a cluster's parameters |
//! | [`undo`] | Snapshot-based undo of committed operations |
//! | [`events`] | Typed change notifications over channels |
//! | [`pipeline`] | Background generation with progress and cancellation |
//! | [`project`] | Command surface tying the above together |
//! | [`project_file`] | JSON project persistence |
//! | [`imaging`] | Codec seam and the `image`-crate backend |
//! | [`scan`] | Source image discovery |
//! | [`config`] | `cluster-merge.toml` loading, merging and validation |
//! | [`output`] | CLI output formatting |
//! | [`error`] | Error kinds shared by the core |
//!
//! # Design Decisions
//!
//! ## Snapshots Over Inverse Commands
//!
//! Every undoable command captures the full cluster model and entry store
//! before it mutates. Restoring a snapshot is trivially correct for every
//! operation, including cascades like removing the last member of a cluster,
//! and a project holds few enough clusters that cloning them is cheap.
//!
//! ## Codec Behind a Trait
//!
//! The core never touches pixels. [`imaging::ImageBackend`] is the seam: the
//! binary uses [`imaging::RustBackend`], tests use a recording mock that
//! composes lists of source names instead of images.

pub mod clusters;
pub mod config;
pub mod entries;
pub mod error;
pub mod events;
pub mod imaging;
pub mod output;
pub mod params;
pub mod pipeline;
pub mod project;
pub mod project_file;
pub mod scan;
pub mod session;
pub mod undo;

#[cfg(test)]
pub(crate) mod test_helpers;
