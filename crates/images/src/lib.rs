//! Inkbook Image Storage
//!
//! This crate extracts inline-encoded images out of inkbook document trees and
//! stores them in content-addressed files, so that persisted documents carry
//! small reference paths instead of megabytes of base64 text.
//!
//! ## Design Principles
//!
//! - Document trees and binary image bytes are deliberately separated
//! - Image files are immutable once stored (new content creates a new file)
//! - Files are named by the SHA-256 of their inline payload, so identical
//!   images are stored exactly once per scope
//! - Documents remain valid even when an image file is absent: loading leaves
//!   the unresolved reference in place and reports a warning
//!
//! ## Storage Layout
//!
//! Each `(user, book)` pair owns an isolated flat directory:
//!
//! ```text
//! <image_data_dir>/
//! └── <user_id>/
//!     └── <book_id>/
//!         └── <sha256hex>.<ext>
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use inkbook_images::{extract_images, inline_images, ImageStore, Scope};
//! use serde_json::json;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = ImageStore::new("image_data");
//! let scope = Scope::new("u1", "b1")?;
//!
//! let document = json!({ "shapes": [{ "type": "image", "src": "data:image/png;base64,AAAA" }] });
//! let stored = extract_images(&store, &scope, &document)?;
//! let restored = inline_images(&store, &scope, &stored);
//! assert_eq!(restored.document, document);
//! # Ok(())
//! # }
//! ```

mod constants;
mod data_url;
mod store;
mod transform;

pub use constants::{IMAGE_FIELD, INLINE_IMAGE_PREFIX, REFERENCE_ROUTE};
pub use data_url::{encode_data_url, subtype_for_extension, DataUrl};
pub use store::{ImageStore, Scope};
pub use transform::{extract_images, inline_images, InlineWarning, Inlined};

use std::path::PathBuf;

/// Errors that can occur while extracting or storing images.
///
/// All of these are fatal on the save path: a failed extraction must not
/// leave a partially rewritten document behind. The load path never surfaces
/// them past the call boundary; see [`inline_images`].
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    /// A scope identifier or filename is empty or not path-safe
    #[error("invalid identifier {0:?}: must be non-empty and contain no path separators")]
    InvalidIdentifier(String),

    /// An inline image string did not match `data:<mime>;...,<payload>`
    #[error("malformed inline image data: {0}")]
    MalformedDataUrl(String),

    /// The base64 payload of an inline image could not be decoded
    #[error("failed to decode inline image payload: {0}")]
    PayloadDecode(#[from] base64::DecodeError),

    /// Scoped storage directory could not be created
    #[error("failed to create storage directory {path}: {source}")]
    DirCreation {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An image file could not be written
    #[error("failed to write image file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An image file could not be read
    #[error("failed to read image file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub type ImageResult<T> = std::result::Result<T, ImageError>;
