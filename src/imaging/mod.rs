//! Image codec seam, the only place pixels are touched.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Load** | `image::ImageReader` |
//! | **Composite** | weighted "over" blend, parallel per pixel |
//! | **Save** | `image::DynamicImage::save_with_format` |
//!
//! The module is split into:
//! - **Backend**: [`ImageBackend`] trait (+ a recording mock for tests)
//! - **Rust backend**: [`RustBackend`], the `image`-crate implementation

pub mod backend;
pub mod rust_backend;

pub use backend::{BackendError, ImageBackend};
pub use rust_backend::{Canvas, RustBackend, is_supported_image, supported_input_extensions};
