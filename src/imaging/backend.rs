//! Image codec backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the three operations the merge core
//! consumes: load, composite and save. The core never interprets pixel
//! formats; it only passes the backend's opaque [`ImageBackend::Image`]
//! handles around.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image`
//! crate.

use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Trait for image codec backends.
///
/// Handles are produced by `load`/`composite` and may be moved across worker
/// threads, hence the `Send + Sync` bounds.
pub trait ImageBackend: Send + Sync + 'static {
    type Image: Send + Sync + 'static;

    /// Decode a source image.
    fn load(&self, path: &Path) -> Result<Self::Image, BackendError>;

    /// Compose layers in order over a transparent canvas, each layer's opacity
    /// scaled by its weight.
    ///
    /// Composing `[(acc, 1.0), (next, w)]` must equal composing the layers of
    /// `acc` followed by `(next, w)`, so callers can fold one layer at a time.
    fn composite(&self, layers: &[(Self::Image, f32)]) -> Result<Self::Image, BackendError>;

    /// Encode an image to disk, format chosen from the extension.
    fn save(&self, image: &Self::Image, path: &Path) -> Result<(), BackendError>;
}
