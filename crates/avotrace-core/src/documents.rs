//! # Document Archive
//!
//! Files attached to lots (phytosanitary certificates, bills of lading,
//! photos). Metadata is a versioned [`DocumentRecord`] in the `documents`
//! collection; the bytes live in a [`BlobStore`] under
//! `documents/<id>/<file_name>`.
//!
//! Keys are path-like strings. The filesystem store maps them to paths
//! under a base directory and refuses any key that would escape it.

use crate::primitives::{MAX_DOCUMENT_SIZE, MAX_FIELD_LENGTH};
use crate::types::{RecordId, Timestamp, TraceError, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, RwLock};

// =============================================================================
// BLOB STORE
// =============================================================================

/// Storage for file contents.
///
/// Implementations may be swapped (object storage, network share) without
/// touching the ledger.
pub trait BlobStore: Send + Sync {
    /// Store a blob. Overwrites if the key already exists.
    fn put(&self, key: &str, data: &[u8]) -> Result<(), TraceError>;

    /// Retrieve a blob. Returns None if the key does not exist.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, TraceError>;

    /// Delete a blob. Returns whether something was removed.
    fn delete(&self, key: &str) -> Result<bool, TraceError>;

    /// Check whether a blob exists.
    fn exists(&self, key: &str) -> Result<bool, TraceError>;

    /// Keys starting with `prefix`, sorted.
    fn list(&self, prefix: &str) -> Result<Vec<String>, TraceError>;
}

/// Reject keys that are empty, absolute, or contain `.`/`..` segments.
fn check_key(key: &str) -> Result<(), TraceError> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key
            .split('/')
            .any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if bad {
        return Err(TraceError::InvalidInput(format!("invalid blob key: {key:?}")));
    }
    Ok(())
}

fn io(e: std::io::Error) -> TraceError {
    TraceError::IoError(e.to_string())
}

/// Filesystem-backed blob store.
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    base_dir: PathBuf,
}

impl FileBlobStore {
    /// Create a store rooted at `base_dir`, creating the directory if needed.
    pub fn open(base_dir: impl AsRef<Path>) -> Result<Self, TraceError> {
        fs::create_dir_all(base_dir.as_ref()).map_err(io)?;
        let base_dir = base_dir.as_ref().canonicalize().map_err(io)?;
        Ok(Self { base_dir })
    }

    /// Resolve a key to a path under the base directory.
    fn resolve(&self, key: &str) -> Result<PathBuf, TraceError> {
        check_key(key)?;
        let path = self.base_dir.join(key);

        // Existing paths may be symlinks; make sure they still land inside.
        if path.exists() {
            let canonical = path.canonicalize().map_err(io)?;
            if !canonical.starts_with(&self.base_dir) {
                return Err(TraceError::InvalidInput(format!(
                    "path traversal detected in key: {key:?}"
                )));
            }
        }
        Ok(path)
    }

    fn walk(&self, dir: &Path, prefix: &str, out: &mut Vec<String>) -> Result<(), TraceError> {
        if !dir.is_dir() {
            return Ok(());
        }
        for entry in fs::read_dir(dir).map_err(io)? {
            let path = entry.map_err(io)?.path();
            if path.is_dir() {
                self.walk(&path, prefix, out)?;
            } else if let Ok(rel) = path.strip_prefix(&self.base_dir) {
                let key = rel
                    .components()
                    .filter_map(|c| match c {
                        Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
                    .join("/");
                if key.starts_with(prefix) {
                    out.push(key);
                }
            }
        }
        Ok(())
    }
}

impl BlobStore for FileBlobStore {
    fn put(&self, key: &str, data: &[u8]) -> Result<(), TraceError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io)?;
        }
        fs::write(&path, data).map_err(io)
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, TraceError> {
        let path = self.resolve(key)?;
        if !path.is_file() {
            return Ok(None);
        }
        fs::read(&path).map(Some).map_err(io)
    }

    fn delete(&self, key: &str) -> Result<bool, TraceError> {
        let path = self.resolve(key)?;
        if !path.is_file() {
            return Ok(false);
        }
        fs::remove_file(&path).map_err(io)?;
        // Drop the now-empty per-document directory.
        if let Some(parent) = path.parent().filter(|p| *p != self.base_dir) {
            let _ = fs::remove_dir(parent);
        }
        Ok(true)
    }

    fn exists(&self, key: &str) -> Result<bool, TraceError> {
        Ok(self.resolve(key)?.is_file())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, TraceError> {
        let mut keys = Vec::new();
        self.walk(&self.base_dir, prefix, &mut keys)?;
        keys.sort();
        Ok(keys)
    }
}

/// In-memory blob store for tests and volatile sessions.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> TraceError {
    TraceError::IoError("blob store lock poisoned".to_string())
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, key: &str, data: &[u8]) -> Result<(), TraceError> {
        check_key(key)?;
        self.blobs
            .write()
            .map_err(poisoned)?
            .insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, TraceError> {
        check_key(key)?;
        Ok(self.blobs.read().map_err(poisoned)?.get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<bool, TraceError> {
        check_key(key)?;
        Ok(self.blobs.write().map_err(poisoned)?.remove(key).is_some())
    }

    fn exists(&self, key: &str) -> Result<bool, TraceError> {
        check_key(key)?;
        Ok(self.blobs.read().map_err(poisoned)?.contains_key(key))
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, TraceError> {
        Ok(self
            .blobs
            .read()
            .map_err(poisoned)?
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

impl<B: BlobStore + ?Sized> BlobStore for Arc<B> {
    fn put(&self, key: &str, data: &[u8]) -> Result<(), TraceError> {
        (**self).put(key, data)
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, TraceError> {
        (**self).get(key)
    }

    fn delete(&self, key: &str) -> Result<bool, TraceError> {
        (**self).delete(key)
    }

    fn exists(&self, key: &str) -> Result<bool, TraceError> {
        (**self).exists(key)
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, TraceError> {
        (**self).list(prefix)
    }
}

/// Which way [`reconcile_blob`] copied a blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobTransfer {
    Uploaded,
    Downloaded,
}

/// Make `key` present in both stores when either one has it.
///
/// Blob keys embed the document id, so a key never changes content and
/// copying in either direction is safe.
pub fn reconcile_blob(
    local: &dyn BlobStore,
    remote: &dyn BlobStore,
    key: &str,
) -> Result<Option<BlobTransfer>, TraceError> {
    if local.exists(key)? {
        if remote.exists(key)? {
            return Ok(None);
        }
        let Some(data) = local.get(key)? else {
            return Ok(None);
        };
        remote.put(key, &data)?;
        return Ok(Some(BlobTransfer::Uploaded));
    }

    match remote.get(key)? {
        Some(data) if data.len() > MAX_DOCUMENT_SIZE => Err(TraceError::InvalidInput(format!(
            "remote blob {key} is {} bytes, above the {MAX_DOCUMENT_SIZE} byte limit",
            data.len()
        ))),
        Some(data) => {
            local.put(key, &data)?;
            Ok(Some(BlobTransfer::Downloaded))
        }
        None => Ok(None),
    }
}

// =============================================================================
// DOCUMENT METADATA
// =============================================================================

/// Metadata of an archived file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: RecordId,
    pub lot_id: Option<RecordId>,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub blob_key: String,
    pub uploaded_by: UserId,
    pub uploaded_at: Timestamp,
    pub version: u64,
}

impl DocumentRecord {
    /// Validate an upload and build its metadata (unsaved).
    pub fn new(
        lot_id: Option<RecordId>,
        file_name: &str,
        content_type: &str,
        size: usize,
        uploaded_by: UserId,
        now: Timestamp,
    ) -> Result<Self, TraceError> {
        let file_name = file_name.trim();
        validate_file_name(file_name)?;
        if size > MAX_DOCUMENT_SIZE {
            return Err(TraceError::InvalidInput(format!(
                "file size {size} exceeds maximum {MAX_DOCUMENT_SIZE}"
            )));
        }
        let content_type = match content_type.trim() {
            "" => "application/octet-stream",
            ct => ct,
        };
        if content_type.len() > MAX_FIELD_LENGTH {
            return Err(TraceError::InvalidInput("content type too long".to_string()));
        }

        let id = RecordId::generate();
        Ok(Self {
            id,
            lot_id,
            file_name: file_name.to_string(),
            content_type: content_type.to_string(),
            size_bytes: size as u64,
            blob_key: format!("documents/{id}/{file_name}"),
            uploaded_by,
            uploaded_at: now,
            version: 0,
        })
    }
}

/// File names are a single path segment.
pub fn validate_file_name(name: &str) -> Result<(), TraceError> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(TraceError::InvalidInput("file name is empty".to_string()));
    }
    if name.contains(['/', '\\', '\0']) {
        return Err(TraceError::InvalidInput(format!(
            "file name must not contain path separators: {name:?}"
        )));
    }
    if name.len() > 255 {
        return Err(TraceError::InvalidInput(
            "file name longer than 255 bytes".to_string(),
        ));
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn user() -> UserId {
        UserId::new("ana").expect("valid")
    }

    #[test]
    fn file_store_roundtrip() {
        let dir = tempdir().expect("create temp dir");
        let store = FileBlobStore::open(dir.path()).expect("open");

        store.put("documents/a/cert.pdf", b"%PDF").expect("put");
        assert!(store.exists("documents/a/cert.pdf").expect("exists"));
        assert_eq!(
            store.get("documents/a/cert.pdf").expect("get"),
            Some(b"%PDF".to_vec())
        );
        assert_eq!(
            store.list("documents/").expect("list"),
            vec!["documents/a/cert.pdf".to_string()]
        );
        assert!(store.delete("documents/a/cert.pdf").expect("delete"));
        assert!(!store.delete("documents/a/cert.pdf").expect("delete"));
        assert_eq!(store.get("documents/a/cert.pdf").expect("get"), None);
    }

    #[test]
    fn traversal_keys_rejected() {
        let dir = tempdir().expect("create temp dir");
        let store = FileBlobStore::open(dir.path()).expect("open");
        for key in ["../etc/passwd", "/abs", "a/../../b", "a//b", "a\\b", ""] {
            assert!(store.put(key, b"x").is_err(), "key {key:?}");
        }
    }

    #[test]
    fn memory_store_lists_by_prefix() {
        let store = MemoryBlobStore::new();
        store.put("documents/1/a.txt", b"a").expect("put");
        store.put("documents/2/b.txt", b"b").expect("put");
        store.put("other/c.txt", b"c").expect("put");
        assert_eq!(store.list("documents/").expect("list").len(), 2);
    }

    #[test]
    fn reconcile_copies_whichever_side_is_missing() {
        let local = MemoryBlobStore::new();
        let remote = MemoryBlobStore::new();
        local.put("documents/1/a.pdf", b"ours").expect("put");
        remote.put("documents/2/b.pdf", b"theirs").expect("put");

        assert_eq!(
            reconcile_blob(&local, &remote, "documents/1/a.pdf").expect("reconcile"),
            Some(BlobTransfer::Uploaded)
        );
        assert_eq!(
            reconcile_blob(&local, &remote, "documents/2/b.pdf").expect("reconcile"),
            Some(BlobTransfer::Downloaded)
        );
        assert_eq!(
            reconcile_blob(&local, &remote, "documents/1/a.pdf").expect("reconcile"),
            None
        );
        assert_eq!(
            reconcile_blob(&local, &remote, "documents/3/gone.pdf").expect("reconcile"),
            None
        );
        assert_eq!(
            remote.get("documents/1/a.pdf").expect("get"),
            Some(b"ours".to_vec())
        );
        assert_eq!(
            local.get("documents/2/b.pdf").expect("get"),
            Some(b"theirs".to_vec())
        );
    }

    #[test]
    fn record_builds_blob_key() {
        let rec = DocumentRecord::new(None, "bl.pdf", "", 10, user(), Timestamp(1)).expect("new");
        assert_eq!(rec.blob_key, format!("documents/{}/bl.pdf", rec.id));
        assert_eq!(rec.content_type, "application/octet-stream");
    }

    #[test]
    fn bad_names_and_sizes_rejected() {
        assert!(DocumentRecord::new(None, "../x", "text/plain", 1, user(), Timestamp(1)).is_err());
        assert!(DocumentRecord::new(None, "a/b.txt", "text/plain", 1, user(), Timestamp(1)).is_err());
        assert!(
            DocumentRecord::new(
                None,
                "big.bin",
                "",
                MAX_DOCUMENT_SIZE + 1,
                user(),
                Timestamp(1)
            )
            .is_err()
        );
    }
}
