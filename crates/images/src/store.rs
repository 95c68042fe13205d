//! Scoped content-addressed image storage.
//!
//! Every `(user, book)` pair owns one flat directory of image files named by
//! the SHA-256 of their inline payload. The store enforces a write-once
//! policy: a file that already exists is never rewritten or re-validated —
//! content addressing guarantees the bytes would be identical anyway.
//!
//! # Security Model
//!
//! Scope identifiers and filenames are validated to be single path segments
//! before any path is built from them, so a document cannot steer reads or
//! writes outside its scope directory.

use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::REFERENCE_ROUTE;
use crate::{ImageError, ImageResult};

/// The `(user, book)` pair that partitions image storage.
///
/// A scope determines both the storage directory and the reference-path
/// prefix written into documents, so save and load must be called with the
/// same identifiers for references to resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    user_id: String,
    book_id: String,
}

impl Scope {
    /// Creates a scope from user and book identifiers.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::InvalidIdentifier`] if either identifier is
    /// empty, is `.` or `..`, or contains a path separator or NUL byte.
    pub fn new(user_id: impl Into<String>, book_id: impl Into<String>) -> ImageResult<Self> {
        let user_id = user_id.into();
        let book_id = book_id.into();

        validate_path_segment(&user_id)?;
        validate_path_segment(&book_id)?;

        Ok(Self { user_id, book_id })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn book_id(&self) -> &str {
        &self.book_id
    }

    /// The reference-path prefix for this scope, with a trailing slash:
    /// `/api/images/<user_id>/<book_id>/`.
    ///
    /// Only `src` values starting with exactly this prefix are resolved on
    /// load; references belonging to other scopes are left untouched.
    pub fn reference_prefix(&self) -> String {
        format!("{REFERENCE_ROUTE}/{}/{}/", self.user_id, self.book_id)
    }

    /// The full reference path for a stored filename.
    pub fn reference_path(&self, filename: &str) -> String {
        format!("{}{filename}", self.reference_prefix())
    }
}

/// Validates that a value is safe to use as one path segment.
fn validate_path_segment(value: &str) -> ImageResult<()> {
    let unsafe_segment = value.is_empty()
        || value == "."
        || value == ".."
        || value.contains(['/', '\\', '\0']);

    if unsafe_segment {
        return Err(ImageError::InvalidIdentifier(value.to_string()));
    }

    Ok(())
}

/// Content-addressed file storage for inline images.
///
/// The store is constructed once with the storage root and is otherwise
/// stateless; directories are created lazily on first save into a scope and
/// are never deleted by this subsystem. Nothing is cached between calls, so
/// concurrent callers see the filesystem directly.
#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    /// Creates a store rooted at `root`. The directory itself is provisioned
    /// lazily by [`Self::ensure_scope_dir`].
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The directory owned by a scope: `<root>/<user_id>/<book_id>`.
    pub fn scope_dir(&self, scope: &Scope) -> PathBuf {
        self.root.join(scope.user_id()).join(scope.book_id())
    }

    /// Creates the scope directory (and any missing parents) if absent.
    ///
    /// Idempotent and safe under concurrent callers.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::DirCreation`] on filesystem failure; a save that
    /// cannot provision its directory must abort as a whole.
    pub fn ensure_scope_dir(&self, scope: &Scope) -> ImageResult<PathBuf> {
        let dir = self.scope_dir(scope);
        fs::create_dir_all(&dir).map_err(|source| ImageError::DirCreation {
            path: dir.clone(),
            source,
        })?;

        Ok(dir)
    }

    /// Whether a stored file exists in the scope.
    ///
    /// Unsafe filenames are reported as absent rather than resolved.
    pub fn exists(&self, scope: &Scope, filename: &str) -> bool {
        validate_path_segment(filename).is_ok() && self.scope_dir(scope).join(filename).is_file()
    }

    /// Writes a file unless it already exists.
    ///
    /// Returns `true` when a write happened. `bytes` produces the file
    /// content and is only invoked when the file is absent, so callers can
    /// defer decoding work behind the one existence check. The check and the
    /// write are deliberately not atomic: two concurrent savers of the same
    /// new image may both write, but content addressing makes the redundant
    /// write byte-identical.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::InvalidIdentifier`] for an unsafe filename,
    /// [`ImageError::FileWrite`] on filesystem failure, and whatever error
    /// `bytes` itself produced.
    pub fn write_if_absent(
        &self,
        scope: &Scope,
        filename: &str,
        bytes: impl FnOnce() -> ImageResult<Vec<u8>>,
    ) -> ImageResult<bool> {
        validate_path_segment(filename)?;

        let path = self.scope_dir(scope).join(filename);
        if path.exists() {
            return Ok(false);
        }

        let bytes = bytes()?;
        fs::write(&path, &bytes).map_err(|source| ImageError::FileWrite {
            path: path.clone(),
            source,
        })?;

        Ok(true)
    }

    /// Reads a stored file's bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::InvalidIdentifier`] for an unsafe filename and
    /// [`ImageError::FileRead`] when the file is missing or unreadable.
    pub fn read(&self, scope: &Scope, filename: &str) -> ImageResult<Vec<u8>> {
        validate_path_segment(filename)?;

        let path = self.scope_dir(scope).join(filename);
        fs::read(&path).map_err(|source| ImageError::FileRead { path, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn scope() -> Scope {
        Scope::new("u1", "b1").unwrap()
    }

    #[test]
    fn scope_rejects_unsafe_identifiers() {
        assert!(matches!(
            Scope::new("", "b1"),
            Err(ImageError::InvalidIdentifier(_))
        ));
        assert!(matches!(
            Scope::new("u1", ".."),
            Err(ImageError::InvalidIdentifier(_))
        ));
        assert!(matches!(
            Scope::new("u1/evil", "b1"),
            Err(ImageError::InvalidIdentifier(_))
        ));
        assert!(matches!(
            Scope::new("u1", "b\\1"),
            Err(ImageError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn scope_builds_reference_paths() {
        let scope = scope();

        assert_eq!(scope.reference_prefix(), "/api/images/u1/b1/");
        assert_eq!(scope.reference_path("abc.png"), "/api/images/u1/b1/abc.png");
    }

    #[test]
    fn ensure_scope_dir_creates_nested_directories() {
        let temp = TempDir::new().unwrap();
        let store = ImageStore::new(temp.path());

        let dir = store.ensure_scope_dir(&scope()).unwrap();

        assert!(dir.is_dir());
        assert_eq!(dir, temp.path().join("u1").join("b1"));

        // Idempotent on a second call.
        assert_eq!(store.ensure_scope_dir(&scope()).unwrap(), dir);
    }

    #[test]
    fn write_if_absent_skips_existing_files() {
        let temp = TempDir::new().unwrap();
        let store = ImageStore::new(temp.path());
        store.ensure_scope_dir(&scope()).unwrap();

        assert!(store
            .write_if_absent(&scope(), "a.png", || Ok(b"first".to_vec()))
            .unwrap());
        assert!(!store
            .write_if_absent(&scope(), "a.png", || Ok(b"second".to_vec()))
            .unwrap());

        // The original bytes survive the skipped second write.
        assert_eq!(store.read(&scope(), "a.png").unwrap(), b"first");
    }

    #[test]
    fn write_if_absent_does_not_produce_bytes_for_existing_files() {
        let temp = TempDir::new().unwrap();
        let store = ImageStore::new(temp.path());
        store.ensure_scope_dir(&scope()).unwrap();

        store
            .write_if_absent(&scope(), "a.png", || Ok(b"bytes".to_vec()))
            .unwrap();

        // The byte source must not run when the file already exists.
        let written = store
            .write_if_absent(&scope(), "a.png", || {
                panic!("byte source invoked for an existing file")
            })
            .unwrap();
        assert!(!written);
    }

    #[test]
    fn read_missing_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let store = ImageStore::new(temp.path());

        assert!(matches!(
            store.read(&scope(), "missing.png"),
            Err(ImageError::FileRead { .. })
        ));
    }

    #[test]
    fn unsafe_filenames_are_refused() {
        let temp = TempDir::new().unwrap();
        let store = ImageStore::new(temp.path());
        store.ensure_scope_dir(&scope()).unwrap();

        assert!(!store.exists(&scope(), ".."));
        assert!(matches!(
            store.read(&scope(), "../escape.png"),
            Err(ImageError::InvalidIdentifier(_))
        ));
        assert!(matches!(
            store.write_if_absent(&scope(), "..", || Ok(b"x".to_vec())),
            Err(ImageError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn scopes_are_isolated_on_disk() {
        let temp = TempDir::new().unwrap();
        let store = ImageStore::new(temp.path());

        let first = Scope::new("u1", "b1").unwrap();
        let second = Scope::new("u2", "b2").unwrap();
        store.ensure_scope_dir(&first).unwrap();
        store.ensure_scope_dir(&second).unwrap();

        store
            .write_if_absent(&first, "a.png", || Ok(b"bytes".to_vec()))
            .unwrap();

        assert!(store.exists(&first, "a.png"));
        assert!(!store.exists(&second, "a.png"));
    }
}
