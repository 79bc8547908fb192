//! In-memory document store.

use super::{DocumentStore, StoredDocument, WriteOp, plan_commit};
use crate::types::{Collection, RecordId, TraceError};
use std::collections::BTreeMap;

/// Volatile store: one ordered map per collection.
///
/// Ordering by id keeps `scan` deterministic, which the snapshot checksum
/// relies on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStore {
    collections: BTreeMap<Collection, BTreeMap<RecordId, StoredDocument>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of documents across all collections.
    #[must_use]
    pub fn total_documents(&self) -> usize {
        self.collections.values().map(BTreeMap::len).sum()
    }

    /// Iterate every document in (collection, id) order.
    pub fn iter(&self) -> impl Iterator<Item = (Collection, RecordId, &StoredDocument)> {
        self.collections
            .iter()
            .flat_map(|(c, docs)| docs.iter().map(move |(id, doc)| (*c, *id, doc)))
    }

    /// Insert a document as-is. Used when rebuilding from a snapshot.
    pub(crate) fn insert_raw(&mut self, collection: Collection, id: RecordId, doc: StoredDocument) {
        self.collections
            .entry(collection)
            .or_default()
            .insert(id, doc);
    }
}

impl DocumentStore for MemoryStore {
    fn get(
        &self,
        collection: Collection,
        id: RecordId,
    ) -> Result<Option<StoredDocument>, TraceError> {
        Ok(self
            .collections
            .get(&collection)
            .and_then(|docs| docs.get(&id))
            .cloned())
    }

    fn scan(&self, collection: Collection) -> Result<Vec<(RecordId, StoredDocument)>, TraceError> {
        Ok(self
            .collections
            .get(&collection)
            .map(|docs| docs.iter().map(|(id, doc)| (*id, doc.clone())).collect())
            .unwrap_or_default())
    }

    fn commit(&mut self, ops: &[WriteOp]) -> Result<Vec<u64>, TraceError> {
        let versions = plan_commit(ops, |collection, id| {
            Ok(self
                .collections
                .get(&collection)
                .and_then(|docs| docs.get(&id))
                .map(|doc| doc.version))
        })?;

        for (op, version) in ops.iter().zip(&versions) {
            match op {
                WriteOp::Put {
                    collection,
                    id,
                    body,
                    ..
                } => {
                    self.insert_raw(
                        *collection,
                        *id,
                        StoredDocument {
                            version: *version,
                            body: body.clone(),
                        },
                    );
                }
                WriteOp::Delete { collection, id, .. } => {
                    if let Some(docs) = self.collections.get_mut(collection) {
                        docs.remove(id);
                    }
                }
            }
        }
        Ok(versions)
    }

    fn replicate(
        &mut self,
        collection: Collection,
        id: RecordId,
        doc: Option<StoredDocument>,
    ) -> Result<(), TraceError> {
        match doc {
            Some(doc) => self.insert_raw(collection, id, doc),
            None => {
                if let Some(docs) = self.collections.get_mut(&collection) {
                    docs.remove(&id);
                }
            }
        }
        Ok(())
    }

    fn count(&self, collection: Collection) -> Result<usize, TraceError> {
        Ok(self.collections.get(&collection).map_or(0, BTreeMap::len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_delete() {
        let mut store = MemoryStore::new();
        let id = RecordId::generate();

        let v = store
            .commit(&[WriteOp::Put {
                collection: Collection::Employees,
                id,
                base: None,
                body: b"a".to_vec(),
            }])
            .expect("create");
        assert_eq!(v, vec![1]);

        let v = store
            .commit(&[WriteOp::Put {
                collection: Collection::Employees,
                id,
                base: Some(1),
                body: b"b".to_vec(),
            }])
            .expect("update");
        assert_eq!(v, vec![2]);

        let doc = store
            .get(Collection::Employees, id)
            .expect("get")
            .expect("present");
        assert_eq!(doc.body, b"b");
        assert_eq!(store.get(Collection::Lots, id).expect("get"), None);

        store
            .commit(&[WriteOp::Delete {
                collection: Collection::Employees,
                id,
                expected: Some(2),
            }])
            .expect("delete");
        assert_eq!(store.count(Collection::Employees).expect("count"), 0);
    }

    #[test]
    fn failed_batch_writes_nothing() {
        let mut store = MemoryStore::new();
        let a = RecordId::generate();
        let b = RecordId::generate();

        let result = store.commit(&[
            WriteOp::Put {
                collection: Collection::Lots,
                id: a,
                base: None,
                body: vec![1],
            },
            WriteOp::Put {
                collection: Collection::Lots,
                id: b,
                base: Some(7),
                body: vec![2],
            },
        ]);
        assert!(matches!(result, Err(TraceError::VersionConflict { .. })));
        assert_eq!(store.total_documents(), 0);
    }

    #[test]
    fn replicate_keeps_version() {
        let mut store = MemoryStore::new();
        let id = RecordId::generate();
        store
            .replicate(
                Collection::Shifts,
                id,
                Some(StoredDocument {
                    version: 9,
                    body: vec![],
                }),
            )
            .expect("replicate");
        let doc = store.get(Collection::Shifts, id).expect("get");
        assert_eq!(doc.map(|d| d.version), Some(9));

        store
            .replicate(Collection::Shifts, id, None)
            .expect("remove");
        assert_eq!(store.count(Collection::Shifts).expect("count"), 0);
    }
}
