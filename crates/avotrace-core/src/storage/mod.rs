//! # Versioned Document Storage
//!
//! Every collection is a map `RecordId -> StoredDocument { version, body }`.
//! The body is an opaque postcard blob owned by the [`Ledger`](crate::Ledger).
//!
//! ## Optimistic concurrency
//!
//! A write names the version it was based on. The store refuses the whole
//! batch if any base does not match what is stored:
//!
//! | Operation | Stored | Result |
//! |-----------|--------|--------|
//! | `Put { base: None }` | absent | written at version 1 |
//! | `Put { base: None }` | version v | `VersionConflict` |
//! | `Put { base: Some(v) }` | version v | written at v + 1 |
//! | `Put { base: Some(v) }` | other / absent | `VersionConflict` |
//! | `Delete { expected: None }` | anything | removed (no-op if absent) |
//! | `Delete { expected: Some(v) }` | version v | removed |
//!
//! ## Backends
//!
//! - `MemoryStore`: `BTreeMap` per collection (fast, volatile)
//! - `RedbStore`: one redb table per collection (ACID, persistent)
//! - `StorageBackend`: enum dispatch between the two

mod memory;
mod redb_store;

pub use memory::MemoryStore;
pub use redb_store::RedbStore;

use crate::primitives::MAX_BATCH_OPS;
use crate::types::{Collection, RecordId, TraceError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// DOCUMENTS AND WRITES
// =============================================================================

/// A stored document: version counter plus encoded body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub version: u64,
    pub body: Vec<u8>,
}

/// One operation of an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteOp {
    /// Create (`base: None`) or replace (`base: Some(version)`) a document.
    Put {
        collection: Collection,
        id: RecordId,
        base: Option<u64>,
        body: Vec<u8>,
    },
    /// Remove a document, optionally only if it is still at `expected`.
    Delete {
        collection: Collection,
        id: RecordId,
        expected: Option<u64>,
    },
}

impl WriteOp {
    /// The key this operation targets.
    #[must_use]
    pub fn key(&self) -> (Collection, RecordId) {
        match self {
            WriteOp::Put { collection, id, .. } | WriteOp::Delete { collection, id, .. } => {
                (*collection, *id)
            }
        }
    }
}

/// Encode a typed document body.
pub fn encode_body<T: Serialize>(value: &T) -> Result<Vec<u8>, TraceError> {
    postcard::to_allocvec(value).map_err(|e| TraceError::SerializationError(e.to_string()))
}

/// Decode a typed document body.
pub fn decode_body<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, TraceError> {
    postcard::from_bytes(bytes).map_err(|e| TraceError::DeserializationError(e.to_string()))
}

// =============================================================================
// STORE TRAIT
// =============================================================================

/// Abstract versioned document store.
///
/// Implemented by the local backends, by the tiered store, and by the
/// HTTP client of a remote server.
pub trait DocumentStore {
    /// Fetch one document.
    fn get(
        &self,
        collection: Collection,
        id: RecordId,
    ) -> Result<Option<StoredDocument>, TraceError>;

    /// Every document of a collection, ordered by id.
    fn scan(&self, collection: Collection) -> Result<Vec<(RecordId, StoredDocument)>, TraceError>;

    /// Apply a batch atomically. Returns the new version per operation
    /// (0 for deletes).
    fn commit(&mut self, ops: &[WriteOp]) -> Result<Vec<u64>, TraceError>;

    /// Store an exact copy of a document, version included, without any
    /// version check. `None` removes the key.
    fn replicate(
        &mut self,
        collection: Collection,
        id: RecordId,
        doc: Option<StoredDocument>,
    ) -> Result<(), TraceError>;

    /// Number of documents in a collection.
    fn count(&self, collection: Collection) -> Result<usize, TraceError> {
        Ok(self.scan(collection)?.len())
    }
}

impl<S: DocumentStore + ?Sized> DocumentStore for Box<S> {
    fn get(
        &self,
        collection: Collection,
        id: RecordId,
    ) -> Result<Option<StoredDocument>, TraceError> {
        (**self).get(collection, id)
    }

    fn scan(&self, collection: Collection) -> Result<Vec<(RecordId, StoredDocument)>, TraceError> {
        (**self).scan(collection)
    }

    fn commit(&mut self, ops: &[WriteOp]) -> Result<Vec<u64>, TraceError> {
        (**self).commit(ops)
    }

    fn replicate(
        &mut self,
        collection: Collection,
        id: RecordId,
        doc: Option<StoredDocument>,
    ) -> Result<(), TraceError> {
        (**self).replicate(collection, id, doc)
    }

    fn count(&self, collection: Collection) -> Result<usize, TraceError> {
        (**self).count(collection)
    }
}

// =============================================================================
// COMMIT PLANNING (shared by all backends)
// =============================================================================

/// Check every operation of a batch against the current versions and
/// return the version each one will produce.
///
/// `current` reads the stored version of a key. Later operations in the
/// same batch see the effect of earlier ones, so a create followed by an
/// update of the same key is valid. Nothing is written here.
pub(crate) fn plan_commit<F>(ops: &[WriteOp], mut current: F) -> Result<Vec<u64>, TraceError>
where
    F: FnMut(Collection, RecordId) -> Result<Option<u64>, TraceError>,
{
    if ops.len() > MAX_BATCH_OPS {
        return Err(TraceError::InvalidInput(format!(
            "batch of {} operations exceeds maximum {}",
            ops.len(),
            MAX_BATCH_OPS
        )));
    }

    let mut staged: BTreeMap<(Collection, RecordId), Option<u64>> = BTreeMap::new();
    let mut versions = Vec::with_capacity(ops.len());

    for op in ops {
        let key = op.key();
        let found = match staged.get(&key) {
            Some(v) => *v,
            None => current(key.0, key.1)?,
        };

        let (expected, next) = match op {
            WriteOp::Put { base, .. } => (*base, Some(base.map_or(1, |b| b.saturating_add(1)))),
            WriteOp::Delete { expected: None, .. } => (found, None),
            WriteOp::Delete { expected, .. } => (*expected, None),
        };

        if expected != found {
            return Err(TraceError::VersionConflict {
                collection: key.0,
                id: key.1,
                expected,
                found,
            });
        }

        staged.insert(key, next);
        versions.push(next.unwrap_or(0));
    }

    Ok(versions)
}

// =============================================================================
// STORAGE BACKEND
// =============================================================================

/// Storage backend for a [`Ledger`](crate::Ledger).
#[derive(Debug)]
pub enum StorageBackend {
    /// In-memory maps (fast, volatile unless exported).
    InMemory(MemoryStore),
    /// Disk-backed redb database (ACID, persistent).
    Persistent(RedbStore),
}

impl Default for StorageBackend {
    fn default() -> Self {
        Self::InMemory(MemoryStore::new())
    }
}

impl StorageBackend {
    /// Open (or create) a redb database at `path`.
    pub fn persistent(path: impl AsRef<std::path::Path>) -> Result<Self, TraceError> {
        RedbStore::open(path).map(Self::Persistent)
    }

    /// Check if using persistent storage.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self, Self::Persistent(_))
    }
}

impl DocumentStore for StorageBackend {
    fn get(
        &self,
        collection: Collection,
        id: RecordId,
    ) -> Result<Option<StoredDocument>, TraceError> {
        match self {
            Self::InMemory(store) => store.get(collection, id),
            Self::Persistent(store) => store.get(collection, id),
        }
    }

    fn scan(&self, collection: Collection) -> Result<Vec<(RecordId, StoredDocument)>, TraceError> {
        match self {
            Self::InMemory(store) => store.scan(collection),
            Self::Persistent(store) => store.scan(collection),
        }
    }

    fn commit(&mut self, ops: &[WriteOp]) -> Result<Vec<u64>, TraceError> {
        match self {
            Self::InMemory(store) => store.commit(ops),
            Self::Persistent(store) => store.commit(ops),
        }
    }

    fn replicate(
        &mut self,
        collection: Collection,
        id: RecordId,
        doc: Option<StoredDocument>,
    ) -> Result<(), TraceError> {
        match self {
            Self::InMemory(store) => store.replicate(collection, id, doc),
            Self::Persistent(store) => store.replicate(collection, id, doc),
        }
    }

    fn count(&self, collection: Collection) -> Result<usize, TraceError> {
        match self {
            Self::InMemory(store) => store.count(collection),
            Self::Persistent(store) => store.count(collection),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn put(id: RecordId, base: Option<u64>) -> WriteOp {
        WriteOp::Put {
            collection: Collection::Lots,
            id,
            base,
            body: vec![1, 2, 3],
        }
    }

    #[test]
    fn create_then_update_in_one_batch() {
        let id = RecordId::generate();
        let versions = plan_commit(&[put(id, None), put(id, Some(1))], |_, _| Ok(None))
            .expect("plan");
        assert_eq!(versions, vec![1, 2]);
    }

    #[test]
    fn stale_base_conflicts() {
        let id = RecordId::generate();
        let err = plan_commit(&[put(id, Some(3))], |_, _| Ok(Some(4))).expect_err("conflict");
        assert!(matches!(
            err,
            TraceError::VersionConflict {
                expected: Some(3),
                found: Some(4),
                ..
            }
        ));
    }

    #[test]
    fn create_over_existing_conflicts() {
        let id = RecordId::generate();
        assert!(plan_commit(&[put(id, None)], |_, _| Ok(Some(1))).is_err());
    }

    #[test]
    fn unconditional_delete_of_missing_key_is_noop() {
        let id = RecordId::generate();
        let op = WriteOp::Delete {
            collection: Collection::Lots,
            id,
            expected: None,
        };
        assert_eq!(plan_commit(&[op], |_, _| Ok(None)).expect("plan"), vec![0]);
    }

    #[test]
    fn oversized_batch_rejected() {
        let ops: Vec<WriteOp> = (0..=MAX_BATCH_OPS)
            .map(|_| put(RecordId::generate(), None))
            .collect();
        assert!(matches!(
            plan_commit(&ops, |_, _| Ok(None)),
            Err(TraceError::InvalidInput(_))
        ));
    }
}
