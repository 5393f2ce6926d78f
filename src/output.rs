//! CLI output formatting for every command.
//!
//! # Information-First Display
//!
//! Output is **information-centric, not file-centric**. Every entity leads
//! with its positional index and display name; source paths and status are
//! indented context lines beneath it.
//!
//! # Output Format
//!
//! ## Scan
//!
//! ```text
//! Images in shoot/ (3)
//! 001 IMG_0001.jpg
//! 002 IMG_0002.jpg
//! 003 IMG_0003.jpg
//! ```
//!
//! ## Show
//!
//! ```text
//! Entries
//! 001 IMG_0001.jpg
//!     Source: shoot/IMG_0001.jpg
//! 002 IMG_0002.jpg (unselected)
//!     Source: shoot/IMG_0002.jpg
//!
//! Clusters
//! 001 Cluster 1 (2 layers, dirty)
//!     Order: bottom-up
//!     001 IMG_0001.jpg weight 1.00
//!     002 IMG_0002.jpg weight 0.50
//! ```
//!
//! ## Generate
//!
//! ```text
//! Cluster 1: queued (task #1)
//! Cluster 1: 50%
//! Cluster 1: done
//!
//! Generated 1 cluster, 0 failed, 0 cancelled
//!     merged/IMG_0001_cluster_1.png
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::clusters::ClusterModel;
use crate::entries::{EntryId, EntryStore};
use crate::params::LayerOrder;
use crate::pipeline::GenerationEvent;
use std::path::{Path, PathBuf};

// ============================================================================
// Shared display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn plural(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{n} {one}")
    } else {
        format!("{n} {many}")
    }
}

fn entry_name(entries: &EntryStore, id: &EntryId) -> String {
    entries
        .get(id)
        .map(|e| e.name.clone())
        .unwrap_or_else(|| format!("<missing {id}>"))
}

fn order_label(order: LayerOrder) -> &'static str {
    match order {
        LayerOrder::BottomUp => "bottom-up",
        LayerOrder::TopDown => "top-down",
    }
}

// ============================================================================
// Scan
// ============================================================================

pub fn format_scan_output(dir: &Path, images: &[PathBuf]) -> Vec<String> {
    let mut lines = vec![format!("Images in {} ({})", dir.display(), images.len())];
    for (i, path) in images.iter().enumerate() {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        lines.push(format!("{} {}", format_index(i + 1), name));
    }
    lines
}

pub fn print_scan_output(dir: &Path, images: &[PathBuf]) {
    for line in format_scan_output(dir, images) {
        println!("{}", line);
    }
}

// ============================================================================
// Show
// ============================================================================

/// Format the entries and clusters of a project.
pub fn format_project(entries: &EntryStore, clusters: &ClusterModel) -> Vec<String> {
    let mut lines = vec!["Entries".to_string()];
    for (i, entry) in entries.iter().enumerate() {
        let flag = if entry.selected { "" } else { " (unselected)" };
        lines.push(format!("{} {}{}", format_index(i + 1), entry.name, flag));
        lines.push(format!("{}Source: {}", indent(1), entry.source.display()));
    }

    lines.push(String::new());
    lines.push("Clusters".to_string());
    for (i, cluster) in clusters.iter().enumerate() {
        let mut status = vec![plural(cluster.len(), "layer", "layers")];
        if cluster.is_dirty() {
            status.push("dirty".to_string());
        }
        if cluster.is_selected() {
            status.push("selected".to_string());
        }
        lines.push(format!(
            "{} Cluster {} ({})",
            format_index(i + 1),
            cluster.id,
            status.join(", ")
        ));
        lines.push(format!(
            "{}Order: {}",
            indent(1),
            order_label(cluster.params().settings().order)
        ));
        for (j, layer) in cluster.params().layers().iter().enumerate() {
            lines.push(format!(
                "{}{} {} weight {:.2}",
                indent(1),
                format_index(j + 1),
                entry_name(entries, &layer.entry),
                layer.weight
            ));
        }
    }
    lines
}

pub fn print_project(entries: &EntryStore, clusters: &ClusterModel) {
    for line in format_project(entries, clusters) {
        println!("{}", line);
    }
}

// ============================================================================
// Generate
// ============================================================================

/// Format a single pipeline event as a display line.
pub fn format_generation_event(event: &GenerationEvent) -> String {
    match event {
        GenerationEvent::Queued { task, cluster } => {
            format!("Cluster {}: queued (task {})", cluster, task)
        }
        GenerationEvent::Started { cluster, .. } => format!("Cluster {}: started", cluster),
        GenerationEvent::Progress {
            cluster, progress, ..
        } => format!("Cluster {}: {:.0}%", cluster, progress * 100.0),
        GenerationEvent::Finished {
            cluster, status, ..
        } => format!("Cluster {}: {}", cluster, status),
    }
}

/// Per-status totals of one `generate` run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct GenerateSummary {
    pub saved: Vec<PathBuf>,
    pub failed: Vec<(String, String)>,
    pub cancelled: usize,
}

pub fn format_generate_summary(summary: &GenerateSummary) -> Vec<String> {
    let mut lines = vec![format!(
        "Generated {}, {} failed, {} cancelled",
        plural(summary.saved.len(), "cluster", "clusters"),
        summary.failed.len(),
        summary.cancelled
    )];
    for path in &summary.saved {
        lines.push(format!("{}{}", indent(1), path.display()));
    }
    for (cluster, error) in &summary.failed {
        lines.push(format!("{}Cluster {}: {}", indent(1), cluster, error));
    }
    lines
}

pub fn print_generate_summary(summary: &GenerateSummary) {
    for line in format_generate_summary(summary) {
        println!("{}", line);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clusters::ClusterId;
    use crate::pipeline::{TaskId, TaskStatus};
    use crate::test_helpers::entry_store;

    // =========================================================================
    // Helper tests
    // =========================================================================

    #[test]
    fn format_index_pads_to_three_digits() {
        assert_eq!(format_index(1), "001");
        assert_eq!(format_index(42), "042");
        assert_eq!(format_index(100), "100");
    }

    #[test]
    fn plural_forms() {
        assert_eq!(plural(1, "layer", "layers"), "1 layer");
        assert_eq!(plural(3, "layer", "layers"), "3 layers");
    }

    // =========================================================================
    // Scan
    // =========================================================================

    #[test]
    fn scan_output_lists_file_names() {
        let images = vec![
            PathBuf::from("shoot/IMG_0001.jpg"),
            PathBuf::from("shoot/IMG_0002.jpg"),
        ];
        let lines = format_scan_output(Path::new("shoot"), &images);
        assert_eq!(
            lines,
            vec!["Images in shoot (2)", "001 IMG_0001.jpg", "002 IMG_0002.jpg"]
        );
    }

    // =========================================================================
    // Show
    // =========================================================================

    #[test]
    fn project_output_shows_layers_and_status() {
        let (mut entries, ids) = entry_store(&["dawn", "dusk"]);
        entries.set_selected(&ids[1], false).unwrap();
        let mut clusters = ClusterModel::new();
        let c = clusters.create_cluster(&entries, &ids).unwrap();
        let mut params = clusters.require(c).unwrap().params().clone();
        params.set_weight(&ids[1], 0.5).unwrap();
        clusters.commit_parameters(c, params).unwrap();

        let lines = format_project(&entries, &clusters);
        assert!(lines.contains(&"Entries".to_string()));
        assert!(lines.iter().any(|l| l.ends_with("dusk.png (unselected)")));
        assert!(lines.contains(&"001 Cluster 1 (2 layers, dirty)".to_string()));
        assert!(lines.contains(&"    Order: bottom-up".to_string()));
        assert!(lines.contains(&"    002 dusk.png weight 0.50".to_string()));
    }

    #[test]
    fn project_output_empty() {
        let lines = format_project(&EntryStore::new(), &ClusterModel::new());
        assert_eq!(lines, vec!["Entries", "", "Clusters"]);
    }

    // =========================================================================
    // Generate
    // =========================================================================

    #[test]
    fn generation_events_format() {
        let task = TaskId(4);
        let cluster = ClusterId(2);
        assert_eq!(
            format_generation_event(&GenerationEvent::Queued { task, cluster }),
            "Cluster 2: queued (task #4)"
        );
        assert_eq!(
            format_generation_event(&GenerationEvent::Progress {
                task,
                cluster,
                progress: 0.5
            }),
            "Cluster 2: 50%"
        );
        assert_eq!(
            format_generation_event(&GenerationEvent::Finished {
                task,
                cluster,
                status: TaskStatus::Cancelled
            }),
            "Cluster 2: cancelled"
        );
    }

    #[test]
    fn summary_lists_saved_and_failed() {
        let summary = GenerateSummary {
            saved: vec![PathBuf::from("merged/dawn_cluster_1.png")],
            failed: vec![("2".to_string(), "cannot read x.png".to_string())],
            cancelled: 1,
        };

        let lines = format_generate_summary(&summary);
        assert_eq!(lines[0], "Generated 1 cluster, 1 failed, 1 cancelled");
        assert_eq!(lines[1], "    merged/dawn_cluster_1.png");
        assert_eq!(lines[2], "    Cluster 2: cannot read x.png");
    }
}
