//! Shared constants for the image storage subsystem.

/// The one reserved document field whose string value is interpreted as an
/// image. Every other field is opaque and passed through unmodified.
pub const IMAGE_FIELD: &str = "src";

/// Prefix that marks a `src` value as an inline-encoded image on the save
/// path. The media type is expected to be `image/*` but the subtype is not
/// validated further.
pub const INLINE_IMAGE_PREFIX: &str = "data:image/";

/// Route under which stored images are addressable. Reference paths written
/// into documents are `<REFERENCE_ROUTE>/<user_id>/<book_id>/<filename>` and
/// double as HTTP paths served by the REST layer.
pub const REFERENCE_ROUTE: &str = "/api/images";
