//! # redb-backed Document Storage
//!
//! A disk-backed document store using the redb embedded database:
//! - ACID transactions (a batch is one write transaction)
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//!
//! Layout: one table per [`Collection`], keyed by the 128-bit record id.
//! Values are postcard-encoded [`StoredDocument`]s, so the version travels
//! with the body.

use super::{DocumentStore, StoredDocument, WriteOp, decode_body, encode_body, plan_commit};
use crate::types::{Collection, RecordId, TraceError};
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::path::Path;

type DocTable = TableDefinition<'static, u128, &'static [u8]>;

const LOTS: DocTable = TableDefinition::new("lots");
const ARCHIVE: DocTable = TableDefinition::new("archive");
const EMPLOYEES: DocTable = TableDefinition::new("employees");
const SHIFTS: DocTable = TableDefinition::new("shifts");
const INSPECTIONS: DocTable = TableDefinition::new("inspections");
const DOCUMENTS: DocTable = TableDefinition::new("documents");
const OUTBOX: DocTable = TableDefinition::new("outbox");
const SYNC_STATE: DocTable = TableDefinition::new("sync_state");

const fn table(collection: Collection) -> DocTable {
    match collection {
        Collection::Lots => LOTS,
        Collection::Archive => ARCHIVE,
        Collection::Employees => EMPLOYEES,
        Collection::Shifts => SHIFTS,
        Collection::Inspections => INSPECTIONS,
        Collection::Documents => DOCUMENTS,
        Collection::Outbox => OUTBOX,
        Collection::SyncState => SYNC_STATE,
    }
}

fn io(e: impl std::fmt::Display) -> TraceError {
    TraceError::IoError(e.to_string())
}

fn decode(bytes: &[u8]) -> Result<StoredDocument, TraceError> {
    decode_body(bytes)
}

/// A disk-backed document store.
pub struct RedbStore {
    db: Database,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TraceError> {
        let db = Database::create(path.as_ref()).map_err(io)?;

        // Initialize tables if they don't exist
        {
            let write_txn = db.begin_write().map_err(io)?;
            for collection in Collection::ALL {
                let _ = write_txn.open_table(table(collection)).map_err(io)?;
            }
            write_txn.commit().map_err(io)?;
        }

        tracing::debug!(path = %path.as_ref().display(), "opened redb store");
        Ok(Self { db })
    }

    /// Compact the database file.
    pub fn compact(&mut self) -> Result<bool, TraceError> {
        self.db.compact().map_err(io)
    }
}

impl DocumentStore for RedbStore {
    fn get(
        &self,
        collection: Collection,
        id: RecordId,
    ) -> Result<Option<StoredDocument>, TraceError> {
        let read_txn = self.db.begin_read().map_err(io)?;
        let docs = read_txn.open_table(table(collection)).map_err(io)?;
        docs.get(id.as_u128())
            .map_err(io)?
            .map(|guard| decode(guard.value()))
            .transpose()
    }

    fn scan(&self, collection: Collection) -> Result<Vec<(RecordId, StoredDocument)>, TraceError> {
        let read_txn = self.db.begin_read().map_err(io)?;
        let docs = read_txn.open_table(table(collection)).map_err(io)?;

        let mut out = Vec::new();
        for entry in docs.iter().map_err(io)? {
            let (key, value) = entry.map_err(io)?;
            out.push((RecordId::from_u128(key.value()), decode(value.value())?));
        }
        Ok(out)
    }

    fn commit(&mut self, ops: &[WriteOp]) -> Result<Vec<u64>, TraceError> {
        let write_txn = self.db.begin_write().map_err(io)?;

        // Versions are checked inside the write transaction so no other
        // writer can slip in between the check and the write.
        let versions = plan_commit(ops, |collection, id| {
            let docs = write_txn.open_table(table(collection)).map_err(io)?;
            let found = docs.get(id.as_u128()).map_err(io)?;
            found.map(|guard| decode(guard.value()).map(|d| d.version)).transpose()
        })?;

        for (op, version) in ops.iter().zip(&versions) {
            match op {
                WriteOp::Put {
                    collection,
                    id,
                    body,
                    ..
                } => {
                    let bytes = encode_body(&StoredDocument {
                        version: *version,
                        body: body.clone(),
                    })?;
                    let mut docs = write_txn.open_table(table(*collection)).map_err(io)?;
                    docs.insert(id.as_u128(), bytes.as_slice()).map_err(io)?;
                }
                WriteOp::Delete { collection, id, .. } => {
                    let mut docs = write_txn.open_table(table(*collection)).map_err(io)?;
                    docs.remove(id.as_u128()).map_err(io)?;
                }
            }
        }

        write_txn.commit().map_err(io)?;
        tracing::debug!(ops = ops.len(), "committed batch");
        Ok(versions)
    }

    fn replicate(
        &mut self,
        collection: Collection,
        id: RecordId,
        doc: Option<StoredDocument>,
    ) -> Result<(), TraceError> {
        let write_txn = self.db.begin_write().map_err(io)?;
        {
            let mut docs = write_txn.open_table(table(collection)).map_err(io)?;
            match doc {
                Some(doc) => {
                    let bytes = encode_body(&doc)?;
                    docs.insert(id.as_u128(), bytes.as_slice()).map_err(io)?;
                }
                None => {
                    docs.remove(id.as_u128()).map_err(io)?;
                }
            }
        }
        write_txn.commit().map_err(io)
    }

    fn count(&self, collection: Collection) -> Result<usize, TraceError> {
        let read_txn = self.db.begin_read().map_err(io)?;
        let docs = read_txn.open_table(table(collection)).map_err(io)?;
        Ok(docs.len().map_err(io)? as usize)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn put(collection: Collection, id: RecordId, base: Option<u64>, body: &[u8]) -> WriteOp {
        WriteOp::Put {
            collection,
            id,
            base,
            body: body.to_vec(),
        }
    }

    #[test]
    fn basic_operations() {
        let dir = tempdir().expect("create temp dir");
        let mut store = RedbStore::open(dir.path().join("test.redb")).expect("open");
        let id = RecordId::generate();

        assert_eq!(
            store
                .commit(&[put(Collection::Lots, id, None, b"one")])
                .expect("create"),
            vec![1]
        );
        let doc = store.get(Collection::Lots, id).expect("get").expect("some");
        assert_eq!(doc.version, 1);
        assert_eq!(doc.body, b"one");
        assert_eq!(store.count(Collection::Lots).expect("count"), 1);
        assert_eq!(store.count(Collection::Archive).expect("count"), 0);
    }

    #[test]
    fn conflict_aborts_whole_batch() {
        let dir = tempdir().expect("create temp dir");
        let mut store = RedbStore::open(dir.path().join("test.redb")).expect("open");
        let a = RecordId::generate();
        let b = RecordId::generate();
        store
            .commit(&[put(Collection::Lots, a, None, b"a")])
            .expect("seed");

        let result = store.commit(&[
            put(Collection::Archive, b, None, b"b"),
            put(Collection::Lots, a, Some(5), b"stale"),
        ]);
        assert!(matches!(result, Err(TraceError::VersionConflict { .. })));
        assert_eq!(store.count(Collection::Archive).expect("count"), 0);
        let doc = store.get(Collection::Lots, a).expect("get").expect("some");
        assert_eq!(doc.body, b"a");
    }

    #[test]
    fn scan_is_ordered_by_id() {
        let dir = tempdir().expect("create temp dir");
        let mut store = RedbStore::open(dir.path().join("test.redb")).expect("open");
        let ops: Vec<WriteOp> = (0..20)
            .map(|_| put(Collection::Shifts, RecordId::generate(), None, b"s"))
            .collect();
        store.commit(&ops).expect("commit");

        let ids: Vec<RecordId> = store
            .scan(Collection::Shifts)
            .expect("scan")
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn recovery_persistence_after_reopen() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("test.redb");
        let id = RecordId::generate();

        {
            let mut store = RedbStore::open(&path).expect("open");
            store
                .commit(&[put(Collection::Employees, id, None, b"v1")])
                .expect("create");
            store
                .commit(&[put(Collection::Employees, id, Some(1), b"v2")])
                .expect("update");
        }

        let store = RedbStore::open(&path).expect("reopen");
        let doc = store
            .get(Collection::Employees, id)
            .expect("get")
            .expect("some");
        assert_eq!(doc.version, 2);
        assert_eq!(doc.body, b"v2");
    }

    #[test]
    fn recovery_compact_and_reopen() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("test.redb");
        let id = RecordId::generate();

        {
            let mut store = RedbStore::open(&path).expect("open");
            store
                .commit(&[put(Collection::Documents, id, None, b"meta")])
                .expect("create");
            store.compact().expect("compact");
        }

        let store = RedbStore::open(&path).expect("reopen");
        assert!(store.get(Collection::Documents, id).expect("get").is_some());
    }

    #[test]
    fn replicate_overwrites_and_removes() {
        let dir = tempdir().expect("create temp dir");
        let mut store = RedbStore::open(dir.path().join("test.redb")).expect("open");
        let id = RecordId::generate();

        store
            .replicate(
                Collection::Lots,
                id,
                Some(StoredDocument {
                    version: 12,
                    body: b"remote".to_vec(),
                }),
            )
            .expect("replicate");
        assert_eq!(
            store
                .get(Collection::Lots, id)
                .expect("get")
                .map(|d| d.version),
            Some(12)
        );

        store.replicate(Collection::Lots, id, None).expect("remove");
        assert!(store.get(Collection::Lots, id).expect("get").is_none());
    }
}
