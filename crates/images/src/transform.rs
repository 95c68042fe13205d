//! The two inverse document transforms: extract on save, inline on load.
//!
//! Both walk the same tree shape depth-first and only ever touch string
//! values keyed by [`IMAGE_FIELD`]; everything else passes through with its
//! value and structural position unchanged. The input document is deep-copied
//! before any rewriting, so the caller's tree is never mutated.
//!
//! The two paths fail differently on purpose. Extraction is fatal on any
//! error: silently persisting a document that still carries inline bytes, or
//! dropping an image, risks data loss. Inlining degrades gracefully: an image
//! that cannot be read is left as its reference path and reported as a
//! warning, because a missing image is better than a failed load of the whole
//! document.

use serde_json::Value;

use crate::constants::{IMAGE_FIELD, INLINE_IMAGE_PREFIX};
use crate::data_url::{encode_data_url, DataUrl};
use crate::store::{ImageStore, Scope};
use crate::ImageResult;

/// Replaces every inline image in `document` with a reference path, storing
/// each distinct payload exactly once under the scope.
///
/// A non-container document (scalar or null) is returned as-is without
/// provisioning any directory. Otherwise the scope directory is created if
/// absent, the document is deep-copied, and every `src` field whose string
/// value starts with `data:image/` is stored and rewritten.
///
/// # Errors
///
/// Any failure — malformed data URL, undecodable payload, directory creation,
/// file write — fails the whole call; no partially rewritten document is
/// returned.
pub fn extract_images(store: &ImageStore, scope: &Scope, document: &Value) -> ImageResult<Value> {
    if !is_container(document) {
        return Ok(document.clone());
    }

    store.ensure_scope_dir(scope)?;

    let mut copy = document.clone();
    extract_node(store, scope, &mut copy)?;

    Ok(copy)
}

fn extract_node(store: &ImageStore, scope: &Scope, node: &mut Value) -> ImageResult<()> {
    match node {
        Value::Array(items) => {
            for item in items {
                extract_node(store, scope, item)?;
            }
        }
        Value::Object(fields) => {
            for (key, value) in fields.iter_mut() {
                match value {
                    Value::String(text)
                        if key == IMAGE_FIELD && text.starts_with(INLINE_IMAGE_PREFIX) =>
                    {
                        let reference = store_inline_image(store, scope, text)?;
                        *value = Value::String(reference);
                    }
                    other => extract_node(store, scope, other)?,
                }
            }
        }
        _ => {}
    }

    Ok(())
}

/// Stores one inline image and returns the reference path that replaces it.
///
/// The payload is only decoded when the content-addressed file is absent; a
/// repeated payload costs one existence check and no write.
fn store_inline_image(store: &ImageStore, scope: &Scope, text: &str) -> ImageResult<String> {
    let data_url = DataUrl::parse(text)?;
    let filename = data_url.filename();

    if store.write_if_absent(scope, &filename, || data_url.decode())? {
        tracing::debug!(filename = %filename, "stored inline image");
    }

    Ok(scope.reference_path(&filename))
}

/// A `src` field the load path could not resolve.
///
/// The field keeps its reference path in the returned document; the warning
/// records which reference failed and why.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, thiserror::Error)]
#[error("failed to inline {reference}: {reason}")]
pub struct InlineWarning {
    pub reference: String,
    pub reason: String,
}

/// Result of [`inline_images`]: the rewritten document plus any per-field
/// failures that were tolerated along the way.
#[derive(Debug)]
pub struct Inlined {
    pub document: Value,
    pub warnings: Vec<InlineWarning>,
}

/// Replaces every reference path scoped to `scope` with its inline image
/// form, read back from storage.
///
/// `src` strings that do not start with exactly this scope's reference prefix
/// — references belonging to other scopes, or arbitrary unrelated strings —
/// are left verbatim. A reference that cannot be resolved (missing file,
/// permission error, unsafe filename) is also left verbatim; the failure is
/// logged and accumulated in [`Inlined::warnings`], and the call itself
/// always succeeds.
pub fn inline_images(store: &ImageStore, scope: &Scope, document: &Value) -> Inlined {
    let mut warnings = Vec::new();

    if !is_container(document) {
        return Inlined {
            document: document.clone(),
            warnings,
        };
    }

    let prefix = scope.reference_prefix();
    let mut copy = document.clone();
    inline_node(store, scope, &prefix, &mut copy, &mut warnings);

    Inlined {
        document: copy,
        warnings,
    }
}

fn inline_node(
    store: &ImageStore,
    scope: &Scope,
    prefix: &str,
    node: &mut Value,
    warnings: &mut Vec<InlineWarning>,
) {
    match node {
        Value::Array(items) => {
            for item in items {
                inline_node(store, scope, prefix, item, warnings);
            }
        }
        Value::Object(fields) => {
            for (key, value) in fields.iter_mut() {
                match value {
                    Value::String(reference)
                        if key == IMAGE_FIELD && reference.starts_with(prefix) =>
                    {
                        match load_reference(store, scope, reference) {
                            Ok(inline) => *value = Value::String(inline),
                            Err(reason) => {
                                tracing::warn!(
                                    reference = %reference,
                                    reason = %reason,
                                    "failed to inline stored image, leaving reference in place"
                                );
                                warnings.push(InlineWarning {
                                    reference: reference.clone(),
                                    reason,
                                });
                            }
                        }
                    }
                    other => inline_node(store, scope, prefix, other, warnings),
                }
            }
        }
        _ => {}
    }
}

/// Resolves one reference path to its inline form. All failures are folded
/// into a reason string; the caller decides what to do with it.
fn load_reference(store: &ImageStore, scope: &Scope, reference: &str) -> Result<String, String> {
    let filename = std::path::Path::new(reference)
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| "reference has no filename component".to_string())?;

    let extension = std::path::Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .ok_or_else(|| "stored filename has no extension".to_string())?;

    let bytes = store.read(scope, filename).map_err(|err| err.to_string())?;

    Ok(encode_data_url(extension, &bytes))
}

fn is_container(value: &Value) -> bool {
    matches!(value, Value::Array(_) | Value::Object(_))
}
