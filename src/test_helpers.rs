//! Shared test utilities for the cluster-merge test suite.
//!
//! Provides fake source paths, stable entry ids, and prebuilt stores and
//! projects that run against the recording mock codec.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let (mut project, ids) = mock_project(&["dawn", "dusk"]);
//! let cluster = project.create_cluster(&ids).unwrap();
//! assert_eq!(ids[0], id("dawn"));
//! ```

use std::path::{Path, PathBuf};

use crate::entries::{EntryId, EntryStore};
use crate::imaging::backend::tests::MockBackend;
use crate::project::Project;

// =========================================================================
// Names and ids
// =========================================================================

/// Fake source path for `name`. Never touches disk.
pub fn source(name: &str) -> PathBuf {
    PathBuf::from(format!("/photos/{name}.png"))
}

/// The id an entry loaded from [`source(name)`](source) gets.
pub fn id(name: &str) -> EntryId {
    EntryId::from_source(&source(name))
}

// =========================================================================
// Prebuilt state
// =========================================================================

/// Store with one entry per name, ids returned in the same order.
pub fn entry_store(names: &[&str]) -> (EntryStore, Vec<EntryId>) {
    let mut store = EntryStore::new();
    let ids = names
        .iter()
        .map(|name| store.add(&source(name)).unwrap())
        .collect();
    (store, ids)
}

/// Project over a [`MockBackend`] with one entry per name and no clusters.
/// Loading entries records no undo history.
pub fn mock_project(names: &[&str]) -> (Project<MockBackend>, Vec<EntryId>) {
    let mut project = Project::new(MockBackend::new(), 2).unwrap();
    let ids = names
        .iter()
        .map(|name| project.add_entry(&source(name)).unwrap())
        .collect();
    (project, ids)
}

/// Write a solid-colour PNG, creating parent directories.
pub fn write_png(path: &Path, width: u32, height: u32, color: [u8; 4]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    image::RgbaImage::from_pixel(width, height, image::Rgba(color))
        .save(path)
        .unwrap();
}
