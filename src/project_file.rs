//! On-disk project state.
//!
//! A project file is pretty-printed JSON listing the source images and the
//! clusters built from them:
//!
//! ```json
//! {
//!   "version": 1,
//!   "entries": [
//!     { "source": "IMG_0001.jpg", "selected": true },
//!     { "source": "IMG_0002.jpg", "selected": true }
//!   ],
//!   "clusters": [
//!     {
//!       "layers": [
//!         { "source": "IMG_0001.jpg", "weight": 1.0 },
//!         { "source": "IMG_0002.jpg", "weight": 0.5 }
//!       ],
//!       "settings": { "order": "bottom-up" },
//!       "dirty": true,
//!       "selected": false
//!     }
//!   ]
//! }
//! ```
//!
//! Relative sources resolve against the project file's directory, so loaded
//! sources are always absolute. Loading replays every record through the
//! normal entry and cluster commands, so a file that breaks a model invariant
//! (an entry in two clusters, a bad weight) is rejected instead of loaded.
//! Cluster ids are not stored; they are handed out in file order on load.

use crate::clusters::ClusterModel;
use crate::entries::{EntryId, EntryStore};
use crate::error::CoreError;
use crate::params::{Layer, MergeParameters, MergeSettings};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const PROJECT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum ProjectFileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid project: {0}")]
    Core(#[from] CoreError),
    #[error("Unsupported project version {0} (expected {PROJECT_VERSION})")]
    UnsupportedVersion(u32),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectFile {
    pub version: u32,
    #[serde(default)]
    pub entries: Vec<EntryRecord>,
    #[serde(default)]
    pub clusters: Vec<ClusterRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryRecord {
    pub source: PathBuf,
    #[serde(default = "default_true")]
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterRecord {
    /// Layers in stored order; members are exactly these sources.
    pub layers: Vec<LayerRecord>,
    #[serde(default)]
    pub settings: MergeSettings,
    /// Files written by hand have never been generated.
    #[serde(default = "default_true")]
    pub dirty: bool,
    #[serde(default)]
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerRecord {
    pub source: PathBuf,
    pub weight: f32,
}

fn default_true() -> bool {
    true
}

impl Default for ProjectFile {
    fn default() -> Self {
        Self {
            version: PROJECT_VERSION,
            entries: Vec::new(),
            clusters: Vec::new(),
        }
    }
}

impl ProjectFile {
    /// Read a project file, resolving relative sources against its directory.
    pub fn load(path: &Path) -> Result<Self, ProjectFileError> {
        let content = fs::read_to_string(path)?;
        let mut file: ProjectFile = serde_json::from_str(&content)?;
        if file.version != PROJECT_VERSION {
            return Err(ProjectFileError::UnsupportedVersion(file.version));
        }
        let base = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        file.resolve_sources(&fs::canonicalize(base)?);
        Ok(file)
    }

    /// Write as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<(), ProjectFileError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Record the current model. Clusters are written in id order.
    pub fn capture(entries: &EntryStore, clusters: &ClusterModel) -> Self {
        let source_of = |id: &EntryId| {
            entries
                .get(id)
                .map(|e| e.source.clone())
                .unwrap_or_default()
        };
        Self {
            version: PROJECT_VERSION,
            entries: entries
                .iter()
                .map(|e| EntryRecord {
                    source: e.source.clone(),
                    selected: e.selected,
                })
                .collect(),
            clusters: clusters
                .iter()
                .map(|c| ClusterRecord {
                    layers: c
                        .params()
                        .layers()
                        .iter()
                        .map(|l| LayerRecord {
                            source: source_of(&l.entry),
                            weight: l.weight,
                        })
                        .collect(),
                    settings: c.params().settings(),
                    dirty: c.is_dirty(),
                    selected: c.is_selected(),
                })
                .collect(),
        }
    }

    /// Rebuild the model through the regular commands.
    pub fn build(&self) -> Result<(EntryStore, ClusterModel), CoreError> {
        let mut entries = EntryStore::new();
        for record in &self.entries {
            let id = entries.add(&record.source)?;
            entries.set_selected(&id, record.selected)?;
        }

        let mut clusters = ClusterModel::new();
        for record in &self.clusters {
            let layers: Vec<Layer> = record
                .layers
                .iter()
                .map(|l| Layer {
                    entry: EntryId::from_source(&l.source),
                    weight: l.weight,
                })
                .collect();
            let members: Vec<EntryId> = layers.iter().map(|l| l.entry.clone()).collect();
            let id = clusters.create_cluster(&entries, &members)?;
            clusters.commit_parameters(id, MergeParameters::new(layers, record.settings))?;
            clusters.set_selected(id, record.selected)?;
            if !record.dirty {
                clusters.mark_clean(id);
            }
        }
        Ok((entries, clusters))
    }

    /// Store sources relative to `base` where possible.
    pub fn relativize_sources(&mut self, base: &Path) {
        self.map_sources(|p| match p.strip_prefix(base) {
            Ok(rel) if !base.as_os_str().is_empty() => rel.to_path_buf(),
            _ => p.to_path_buf(),
        });
    }

    fn resolve_sources(&mut self, base: &Path) {
        self.map_sources(|p| {
            if p.is_relative() {
                base.join(p)
            } else {
                p.to_path_buf()
            }
        });
    }

    fn map_sources(&mut self, f: impl Fn(&Path) -> PathBuf) {
        for entry in &mut self.entries {
            entry.source = f(&entry.source);
        }
        for layer in self.clusters.iter_mut().flat_map(|c| c.layers.iter_mut()) {
            layer.source = f(&layer.source);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{entry_store, source};
    use tempfile::TempDir;

    fn sample_model() -> (EntryStore, ClusterModel) {
        let (mut entries, ids) = entry_store(&["a", "b", "c"]);
        entries.set_selected(&ids[2], false).unwrap();
        let mut clusters = ClusterModel::new();
        let c = clusters.create_cluster(&entries, &ids[..2]).unwrap();
        let mut params = clusters.require(c).unwrap().params().clone();
        params.set_weight(&ids[1], 0.25).unwrap();
        params.reorder(&[ids[1].clone(), ids[0].clone()]).unwrap();
        clusters.commit_parameters(c, params).unwrap();
        clusters.set_selected(c, true).unwrap();
        clusters.mark_clean(c);
        (entries, clusters)
    }

    #[test]
    fn capture_then_build_restores_model() {
        let (entries, clusters) = sample_model();
        let file = ProjectFile::capture(&entries, &clusters);
        let (rebuilt_entries, rebuilt_clusters) = file.build().unwrap();
        assert_eq!(rebuilt_entries, entries);
        assert_eq!(rebuilt_clusters, clusters);
    }

    #[test]
    fn save_and_load_through_disk() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("project.json");
        let (entries, clusters) = sample_model();
        ProjectFile::capture(&entries, &clusters).save(&path).unwrap();

        let loaded = ProjectFile::load(&path).unwrap();
        let (e, c) = loaded.build().unwrap();
        assert_eq!(e.len(), 3);
        let cluster = c.iter().next().unwrap();
        assert_eq!(cluster.params().weights(), vec![0.25, 1.0]);
        assert!(!cluster.is_dirty());
        assert!(cluster.is_selected());
    }

    #[test]
    fn relative_sources_resolve_against_project_dir() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("project.json");
        fs::write(
            &path,
            r#"{
                "version": 1,
                "entries": [{ "source": "dawn.png" }],
                "clusters": [{ "layers": [{ "source": "dawn.png", "weight": 0.5 }] }]
            }"#,
        )
        .unwrap();

        let file = ProjectFile::load(&path).unwrap();
        let dir = fs::canonicalize(tmp.path()).unwrap();
        assert_eq!(file.entries[0].source, dir.join("dawn.png"));
        let (entries, clusters) = file.build().unwrap();
        assert!(entries.iter().all(|e| e.selected));
        let cluster = clusters.iter().next().unwrap();
        assert!(cluster.is_dirty());
        assert!(!cluster.is_selected());
    }

    #[test]
    fn relativize_strips_base() {
        let mut file = ProjectFile {
            entries: vec![EntryRecord {
                source: source("a"),
                selected: true,
            }],
            ..ProjectFile::default()
        };
        file.relativize_sources(Path::new("/photos"));
        assert_eq!(file.entries[0].source, PathBuf::from("a.png"));
    }

    #[test]
    fn unsupported_version_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("project.json");
        fs::write(&path, r#"{ "version": 7 }"#).unwrap();
        assert!(matches!(
            ProjectFile::load(&path),
            Err(ProjectFileError::UnsupportedVersion(7))
        ));
    }

    #[test]
    fn entry_in_two_clusters_rejected() {
        let layer = LayerRecord {
            source: source("a"),
            weight: 1.0,
        };
        let cluster = ClusterRecord {
            layers: vec![layer],
            settings: MergeSettings::default(),
            dirty: true,
            selected: false,
        };
        let file = ProjectFile {
            entries: vec![EntryRecord {
                source: source("a"),
                selected: true,
            }],
            clusters: vec![cluster.clone(), cluster],
            ..ProjectFile::default()
        };
        assert!(matches!(file.build(), Err(CoreError::Conflict(_))));
    }

    #[test]
    fn out_of_range_weight_rejected() {
        let file = ProjectFile {
            entries: vec![EntryRecord {
                source: source("a"),
                selected: true,
            }],
            clusters: vec![ClusterRecord {
                layers: vec![LayerRecord {
                    source: source("a"),
                    weight: 1.5,
                }],
                settings: MergeSettings::default(),
                dirty: true,
                selected: false,
            }],
            ..ProjectFile::default()
        };
        assert!(matches!(file.build(), Err(CoreError::Validation(_))));
    }

    #[test]
    fn cluster_referencing_unknown_entry_rejected() {
        let file = ProjectFile {
            clusters: vec![ClusterRecord {
                layers: vec![LayerRecord {
                    source: source("ghost"),
                    weight: 1.0,
                }],
                settings: MergeSettings::default(),
                dirty: true,
                selected: false,
            }],
            ..ProjectFile::default()
        };
        assert!(matches!(file.build(), Err(CoreError::NotFound { .. })));
    }
}
