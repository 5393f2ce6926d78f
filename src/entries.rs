//! Entry store: the loaded source images.
//!
//! An [`ImageEntry`] references a source file on disk. Pixels are never held
//! here; the codec loads them from [`ImageEntry::source`] when a cluster is
//! generated. Entries are immutable apart from their `selected` flag.
//!
//! ## Identifiers
//!
//! [`EntryId`] is derived from the source path (first 16 hex digits of its
//! SHA-256), so the same file always gets the same id across project loads.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Stable identifier of a source image.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntryId(String);

impl EntryId {
    pub fn from_source(path: &Path) -> Self {
        let digest = Sha256::digest(path.to_string_lossy().as_bytes());
        let hex = format!("{:x}", digest);
        Self(hex[..16].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageEntry {
    pub id: EntryId,
    /// Display name, the file name of the source.
    pub name: String,
    pub source: PathBuf,
    pub selected: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryStore {
    entries: BTreeMap<EntryId, ImageEntry>,
}

impl EntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source image. New entries start selected.
    pub fn add(&mut self, source: &Path) -> Result<EntryId> {
        let id = EntryId::from_source(source);
        if self.entries.contains_key(&id) {
            return Err(CoreError::Conflict(format!(
                "{} is already loaded",
                source.display()
            )));
        }
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| source.to_string_lossy().into_owned());
        self.entries.insert(
            id.clone(),
            ImageEntry {
                id: id.clone(),
                name,
                source: source.to_path_buf(),
                selected: true,
            },
        );
        Ok(id)
    }

    /// Drop an entry from the store. Cluster membership is the caller's
    /// concern; see [`Project::remove_entry`](crate::project::Project::remove_entry).
    pub fn remove(&mut self, id: &EntryId) -> Result<ImageEntry> {
        self.entries
            .remove(id)
            .ok_or_else(|| CoreError::not_found("Entry", id))
    }

    pub fn set_selected(&mut self, id: &EntryId, selected: bool) -> Result<()> {
        let entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| CoreError::not_found("Entry", id))?;
        entry.selected = selected;
        Ok(())
    }

    /// Selected entries in id order.
    pub fn list_selected(&self) -> Vec<EntryId> {
        self.entries
            .values()
            .filter(|e| e.selected)
            .map(|e| e.id.clone())
            .collect()
    }

    pub fn get(&self, id: &EntryId) -> Option<&ImageEntry> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &EntryId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImageEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace the whole store from an undo snapshot, keeping the current
    /// selection of entries that exist on both sides. Selection is cosmetic
    /// and never rewound.
    pub(crate) fn restore(&mut self, mut snapshot: EntryStore) {
        for entry in snapshot.entries.values_mut() {
            if let Some(current) = self.entries.get(&entry.id) {
                entry.selected = current.selected;
            }
        }
        *self = snapshot;
    }
}
