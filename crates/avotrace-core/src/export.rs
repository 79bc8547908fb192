//! # Snapshot Export
//!
//! > redb files are not bit-identical across runs, so backups and the CLI
//! > "file" backend go through a canonical postcard stream instead. The
//! > stream is the source of truth when two stores are compared.
//!
//! Format:
//! ```text
//! [header_len: u32 LE] [SnapshotHeader (postcard)] [Snapshot (postcard)]
//! ```
//!
//! Documents are sorted by (collection, id) and carry their version, so
//! export -> import -> export is bit-exact.

use crate::primitives::{
    MAX_IMPORT_DOCUMENTS, MAX_SNAPSHOT_SIZE, SNAPSHOT_MAGIC, SNAPSHOT_VERSION,
};
use crate::storage::{DocumentStore, MemoryStore, StoredDocument};
use crate::types::{Collection, RecordId, TraceError};
use serde::{Deserialize, Serialize};

// =============================================================================
// FORMAT
// =============================================================================

/// Header of a snapshot file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotHeader {
    /// Magic bytes to identify the format.
    pub magic: [u8; 4],

    /// Format version for compatibility.
    pub version: u8,

    /// Number of documents in the body.
    pub document_count: u64,

    /// XOR checksum of the body.
    pub checksum: u64,
}

impl SnapshotHeader {
    #[must_use]
    pub fn new(document_count: u64, checksum: u64) -> Self {
        Self {
            magic: SNAPSHOT_MAGIC,
            version: SNAPSHOT_VERSION,
            document_count,
            checksum,
        }
    }

    /// Validate magic and version.
    ///
    /// Error messages are kept generic so a rejected upload does not reveal
    /// the format.
    pub fn validate(&self) -> Result<(), TraceError> {
        if self.magic != SNAPSHOT_MAGIC {
            return Err(TraceError::DeserializationError(
                "Invalid file format".to_string(),
            ));
        }
        if self.version != SNAPSHOT_VERSION {
            return Err(TraceError::DeserializationError(
                "Unsupported file version".to_string(),
            ));
        }
        Ok(())
    }
}

/// One document in canonical form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct SnapshotEntry {
    collection: Collection,
    id: RecordId,
    version: u64,
    body: Vec<u8>,
}

/// Every document of a store, sorted by (collection, id).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
struct Snapshot {
    documents: Vec<SnapshotEntry>,
}

impl Snapshot {
    fn from_store<S: DocumentStore + ?Sized>(store: &S) -> Result<Self, TraceError> {
        let mut documents = Vec::new();
        for collection in Collection::ALL {
            for (id, doc) in store.scan(collection)? {
                documents.push(SnapshotEntry {
                    collection,
                    id,
                    version: doc.version,
                    body: doc.body,
                });
            }
        }
        // scan is ordered already; sorting makes the stream independent of
        // the backend.
        documents.sort_by(|a, b| (a.collection, a.id).cmp(&(b.collection, b.id)));
        Ok(Self { documents })
    }

    /// Deterministic checksum of the documents.
    ///
    /// This is **NOT** a cryptographic hash. It detects accidental
    /// corruption only; use the `crypto-hash` feature for a BLAKE3 digest.
    fn checksum(&self) -> u64 {
        let mut hash: u64 = 0;
        for doc in &self.documents {
            let id = doc.id.as_u128();
            hash ^= (doc.collection as u64).rotate_left(3);
            hash ^= ((id >> 64) as u64).rotate_left(13);
            hash ^= (id as u64).rotate_left(7);
            hash ^= doc.version.rotate_left(17);
            for (i, byte) in doc.body.iter().enumerate() {
                hash ^= (*byte as u64).rotate_left((i % 64) as u32);
            }
            hash ^= (doc.body.len() as u64).rotate_left(29);
        }
        hash
    }

    fn is_sorted_unique(&self) -> bool {
        self.documents
            .windows(2)
            .all(|w| (w[0].collection, w[0].id) < (w[1].collection, w[1].id))
    }
}

// =============================================================================
// EXPORT / IMPORT
// =============================================================================

/// Export every collection of a store.
pub fn export_snapshot<S: DocumentStore + ?Sized>(store: &S) -> Result<Vec<u8>, TraceError> {
    let snapshot = Snapshot::from_store(store)?;
    let header = SnapshotHeader::new(snapshot.documents.len() as u64, snapshot.checksum());

    let header_bytes = postcard::to_allocvec(&header)
        .map_err(|e| TraceError::SerializationError(format!("Header: {}", e)))?;
    let data_bytes = postcard::to_allocvec(&snapshot)
        .map_err(|e| TraceError::SerializationError(format!("Data: {}", e)))?;

    let mut result = Vec::with_capacity(4 + header_bytes.len() + data_bytes.len());
    result.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
    result.extend_from_slice(&header_bytes);
    result.extend_from_slice(&data_bytes);

    tracing::debug!(
        documents = header.document_count,
        bytes = result.len(),
        "snapshot exported"
    );
    Ok(result)
}

fn parse(data: &[u8]) -> Result<Snapshot, TraceError> {
    if data.len() > MAX_SNAPSHOT_SIZE {
        return Err(TraceError::DeserializationError(format!(
            "Snapshot of {} bytes exceeds maximum allowed {}",
            data.len(),
            MAX_SNAPSHOT_SIZE
        )));
    }
    let Some((len_bytes, rest)) = data.split_first_chunk::<4>() else {
        return Err(TraceError::DeserializationError(
            "Data too short".to_string(),
        ));
    };
    let header_len = u32::from_le_bytes(*len_bytes) as usize;
    if rest.len() < header_len {
        return Err(TraceError::DeserializationError(
            "Data too short for header".to_string(),
        ));
    }
    let (header_bytes, body_bytes) = rest.split_at(header_len);

    let header: SnapshotHeader = postcard::from_bytes(header_bytes)
        .map_err(|e| TraceError::DeserializationError(format!("Header: {}", e)))?;
    header.validate()?;

    // Refuse absurd counts before decoding the body.
    if header.document_count > MAX_IMPORT_DOCUMENTS {
        return Err(TraceError::DeserializationError(format!(
            "Document count {} exceeds maximum allowed {}",
            header.document_count, MAX_IMPORT_DOCUMENTS
        )));
    }

    let snapshot: Snapshot = postcard::from_bytes(body_bytes)
        .map_err(|e| TraceError::DeserializationError(format!("Data: {}", e)))?;

    let computed = snapshot.checksum();
    if computed != header.checksum {
        return Err(TraceError::DeserializationError(format!(
            "Checksum mismatch: expected {}, got {}",
            header.checksum, computed
        )));
    }
    if snapshot.documents.len() as u64 != header.document_count {
        return Err(TraceError::DeserializationError(
            "Document count mismatch".to_string(),
        ));
    }
    if !snapshot.is_sorted_unique() {
        return Err(TraceError::DeserializationError(
            "Documents out of order or duplicated".to_string(),
        ));
    }
    Ok(snapshot)
}

/// Rebuild an in-memory store from a snapshot.
pub fn import_snapshot(data: &[u8]) -> Result<MemoryStore, TraceError> {
    let snapshot = parse(data)?;
    let mut store = MemoryStore::new();
    for doc in snapshot.documents {
        store.insert_raw(
            doc.collection,
            doc.id,
            StoredDocument {
                version: doc.version,
                body: doc.body,
            },
        );
    }
    Ok(store)
}

/// Copy a snapshot into any store, versions included. Existing documents
/// with the same key are overwritten; others are left alone.
///
/// Returns the number of documents written.
pub fn restore_into<S: DocumentStore + ?Sized>(
    data: &[u8],
    store: &mut S,
) -> Result<usize, TraceError> {
    let snapshot = parse(data)?;
    let count = snapshot.documents.len();
    for doc in snapshot.documents {
        store.replicate(
            doc.collection,
            doc.id,
            Some(StoredDocument {
                version: doc.version,
                body: doc.body,
            }),
        )?;
    }
    tracing::info!(documents = count, "snapshot restored");
    Ok(count)
}

/// Checksum of a store's canonical snapshot. Equal stores have equal
/// checksums regardless of backend.
pub fn snapshot_checksum<S: DocumentStore + ?Sized>(store: &S) -> Result<u64, TraceError> {
    Ok(Snapshot::from_store(store)?.checksum())
}

/// Whether a store holds exactly the documents of a snapshot.
pub fn verify_snapshot<S: DocumentStore + ?Sized>(
    store: &S,
    data: &[u8],
) -> Result<bool, TraceError> {
    Ok(Snapshot::from_store(store)? == parse(data)?)
}

// =============================================================================
// CRYPTOGRAPHIC HASH
// =============================================================================

/// BLAKE3 digest of a store's snapshot, as a 64-character hex string.
#[cfg(feature = "crypto-hash")]
pub fn snapshot_crypto_hash<S: DocumentStore + ?Sized>(store: &S) -> Result<String, TraceError> {
    Ok(compute_blake3_hash(&export_snapshot(store)?))
}

/// BLAKE3 digest of raw bytes.
#[cfg(feature = "crypto-hash")]
#[must_use]
pub fn compute_blake3_hash(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::WriteOp;

    fn store_with(docs: &[(Collection, &[u8])]) -> MemoryStore {
        let mut store = MemoryStore::new();
        let ops: Vec<WriteOp> = docs
            .iter()
            .map(|(collection, body)| WriteOp::Put {
                collection: *collection,
                id: RecordId::generate(),
                base: None,
                body: body.to_vec(),
            })
            .collect();
        store.commit(&ops).expect("commit");
        store
    }

    #[test]
    fn export_import_export_is_bit_exact() {
        let store = store_with(&[
            (Collection::Lots, b"lot"),
            (Collection::Archive, b"archived"),
            (Collection::Employees, b"emp"),
            (Collection::Outbox, b"pending"),
        ]);
        let first = export_snapshot(&store).expect("export");
        let imported = import_snapshot(&first).expect("import");
        assert_eq!(imported, store);
        assert_eq!(export_snapshot(&imported).expect("export"), first);
        assert!(verify_snapshot(&store, &first).expect("verify"));
    }

    #[test]
    fn empty_store_roundtrips() {
        let data = export_snapshot(&MemoryStore::new()).expect("export");
        assert_eq!(import_snapshot(&data).expect("import").total_documents(), 0);
    }

    #[test]
    fn corrupted_body_rejected() {
        let store = store_with(&[(Collection::Lots, b"abcdef")]);
        let mut data = export_snapshot(&store).expect("export");
        let last = data.len() - 1;
        data[last] ^= 0xFF;
        assert!(import_snapshot(&data).is_err());
    }

    #[test]
    fn wrong_magic_rejected() {
        let header = SnapshotHeader {
            magic: *b"XXXX",
            ..SnapshotHeader::new(0, 0)
        };
        assert!(header.validate().is_err());
    }

    #[test]
    fn oversized_count_rejected_before_body() {
        let header = SnapshotHeader::new(MAX_IMPORT_DOCUMENTS + 1, 0);
        let header_bytes = postcard::to_allocvec(&header).expect("encode");
        let mut data = (header_bytes.len() as u32).to_le_bytes().to_vec();
        data.extend_from_slice(&header_bytes);
        let err = import_snapshot(&data).expect_err("too many");
        assert!(err.to_string().contains("exceeds maximum"));
    }

    #[test]
    fn truncated_input_rejected() {
        assert!(import_snapshot(&[1, 0]).is_err());
        assert!(import_snapshot(&[200, 0, 0, 0, 1]).is_err());
    }

    #[test]
    fn restore_keeps_versions() {
        let mut source = store_with(&[(Collection::Shifts, b"s")]);
        let (id, _) = source.scan(Collection::Shifts).expect("scan")[0].clone();
        source
            .commit(&[WriteOp::Put {
                collection: Collection::Shifts,
                id,
                base: Some(1),
                body: b"s2".to_vec(),
            }])
            .expect("update");

        let data = export_snapshot(&source).expect("export");
        let mut target = MemoryStore::new();
        assert_eq!(restore_into(&data, &mut target).expect("restore"), 1);
        let doc = target
            .get(Collection::Shifts, id)
            .expect("get")
            .expect("some");
        assert_eq!(doc.version, 2);
        assert_eq!(
            snapshot_checksum(&target).expect("checksum"),
            snapshot_checksum(&source).expect("checksum")
        );
    }

    #[cfg(feature = "crypto-hash")]
    #[test]
    fn blake3_hash_is_stable() {
        let store = store_with(&[(Collection::Lots, b"x")]);
        let a = snapshot_crypto_hash(&store).expect("hash");
        let b = snapshot_crypto_hash(&store).expect("hash");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }
}
