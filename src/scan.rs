//! Source image discovery.
//!
//! Lists the images directly inside a directory, the starting point for
//! `init`. Only files with a [supported extension](crate::imaging::supported_input_extensions)
//! are returned; subdirectories and hidden files are ignored. Results are
//! sorted by file name so a scan is reproducible across filesystems.

use crate::imaging::is_supported_image;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
}

pub fn scan_images(dir: &Path) -> Result<Vec<PathBuf>, ScanError> {
    if !dir.is_dir() {
        return Err(ScanError::NotADirectory(dir.to_path_buf()));
    }
    let mut images = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry?;
        let path = entry.path();
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if entry.file_type().is_file() && !hidden && is_supported_image(path) {
            images.push(path.to_path_buf());
        }
    }
    tracing::debug!(dir = %dir.display(), count = images.len(), "scanned");
    Ok(images)
}
