//! # Two-Tier Storage
//!
//! [`TieredStore`] pairs a local store (redb or memory) with a remote one
//! (usually the HTTP client of a shared server). It is itself a
//! [`DocumentStore`], so a [`Ledger`](crate::Ledger) runs on it unchanged.
//!
//! ## Reads
//! Local first. On a miss the remote is asked and the answer is cached
//! locally. A remote failure during read-through is logged and treated as a
//! miss, so the local tier keeps working offline.
//!
//! ## Writes
//! Local only. Every written key gets an outbox entry recording the remote
//! version the edit was based on, taken the first time the key becomes
//! dirty. The data write and the outbox update are one local batch.
//!
//! ## Sync
//! - `push`: send each outbox entry to the remote with its recorded base.
//!   A `VersionConflict` is settled by the [`ConflictPolicy`].
//! - `pull`: mirror remote documents locally, skipping keys with pending
//!   writes. Keys that were synced before and are gone remotely are removed.
//!
//! Bookkeeping lives in the local tier itself: one `outbox` and one
//! `sync_state` document per replicated collection. A clean local document
//! always carries the remote version it mirrors.

use crate::storage::{DocumentStore, StoredDocument, WriteOp, decode_body, encode_body};
use crate::types::{Collection, RecordId, Timestamp, TraceError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

// =============================================================================
// POLICY AND REPORT
// =============================================================================

/// How a push settles a version conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Discard the local edit and keep the remote document.
    #[default]
    RemoteWins,
    /// Re-send the local document on top of the remote's current version.
    LocalWins,
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictPolicy::RemoteWins => f.write_str("remote_wins"),
            ConflictPolicy::LocalWins => f.write_str("local_wins"),
        }
    }
}

impl FromStr for ConflictPolicy {
    type Err = TraceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "remote_wins" => Ok(ConflictPolicy::RemoteWins),
            "local_wins" => Ok(ConflictPolicy::LocalWins),
            _ => Err(TraceError::InvalidInput(format!(
                "unknown conflict policy: {s:?} (use remote_wins or local_wins)"
            ))),
        }
    }
}

/// What a sync run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Local writes accepted by the remote.
    pub pushed: usize,
    /// Remote documents copied into the local tier.
    pub pulled: usize,
    /// Local documents removed because the remote no longer has them.
    pub removed: usize,
    /// Pushes refused with a version conflict.
    pub conflicts: usize,
    /// Conflicts settled by keeping the remote document.
    pub resolved_remote: usize,
    /// Conflicts settled by overwriting the remote document.
    pub resolved_local: usize,
    /// Pushes that failed and stay queued, plus document contents that
    /// could not be copied.
    pub failed: usize,
    /// Document contents uploaded to the remote.
    pub content_pushed: usize,
    /// Document contents fetched from the remote.
    pub content_pulled: usize,
    /// Local contents dropped because no document refers to them anymore.
    pub content_removed: usize,
}

// =============================================================================
// BOOKKEEPING
// =============================================================================

/// A key written locally and not yet pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct PendingWrite {
    /// Remote version the first local edit was based on (None: not on the
    /// remote as far as this tier knows).
    remote_base: Option<u64>,
    queued_at: Timestamp,
}

/// Pending writes of one collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Outbox {
    entries: BTreeMap<RecordId, PendingWrite>,
}

/// Remote versions last mirrored for one collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct SyncState {
    remote_versions: BTreeMap<RecordId, u64>,
}

/// Key of the bookkeeping document for `collection`.
const fn meta_id(collection: Collection) -> RecordId {
    RecordId::from_u128(collection as u128 + 1)
}

/// A bookkeeping document together with the version it was read at.
struct Meta<T> {
    owner: Collection,
    version: Option<u64>,
    value: T,
    dirty: bool,
}

impl<T: Serialize + DeserializeOwned + Default> Meta<T> {
    fn load<S: DocumentStore + ?Sized>(
        store: &S,
        kind: Collection,
        owner: Collection,
    ) -> Result<Self, TraceError> {
        let (version, value) = match store.get(kind, meta_id(owner))? {
            Some(doc) => (Some(doc.version), decode_body(&doc.body)?),
            None => (None, T::default()),
        };
        Ok(Self {
            owner,
            version,
            value,
            dirty: false,
        })
    }

    fn put_op(&self, kind: Collection) -> Result<WriteOp, TraceError> {
        Ok(WriteOp::Put {
            collection: kind,
            id: meta_id(self.owner),
            base: self.version,
            body: encode_body(&self.value)?,
        })
    }

    /// Write the document back if it changed.
    fn save<S: DocumentStore + ?Sized>(
        &mut self,
        store: &mut S,
        kind: Collection,
    ) -> Result<(), TraceError> {
        if self.dirty {
            let versions = store.commit(&[self.put_op(kind)?])?;
            self.version = versions.first().copied();
            self.dirty = false;
        }
        Ok(())
    }
}

fn poisoned<T>(_: T) -> TraceError {
    TraceError::IoError("local tier lock poisoned".to_string())
}

// =============================================================================
// TIERED STORE
// =============================================================================

/// Local tier with a remote tier behind it.
pub struct TieredStore<L: DocumentStore, R: DocumentStore> {
    local: Mutex<L>,
    remote: R,
    policy: ConflictPolicy,
}

impl<L: DocumentStore, R: DocumentStore> fmt::Debug for TieredStore<L, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TieredStore")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl<L: DocumentStore, R: DocumentStore> TieredStore<L, R> {
    pub fn new(local: L, remote: R) -> Self {
        Self {
            local: Mutex::new(local),
            remote,
            policy: ConflictPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: ConflictPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn remote_mut(&mut self) -> &mut R {
        &mut self.remote
    }

    /// Give back the local tier.
    pub fn into_local(self) -> Result<L, TraceError> {
        self.local.into_inner().map_err(poisoned)
    }

    fn lock(&self) -> Result<MutexGuard<'_, L>, TraceError> {
        self.local.lock().map_err(poisoned)
    }

    /// Number of keys waiting to be pushed.
    pub fn pending(&self) -> Result<usize, TraceError> {
        let local = self.lock()?;
        let mut total = 0;
        for collection in Collection::DATA {
            let outbox = Meta::<Outbox>::load(&*local, Collection::Outbox, collection)?;
            total += outbox.value.entries.len();
        }
        Ok(total)
    }

    // -------------------------------------------------------------------------
    // Push
    // -------------------------------------------------------------------------

    /// Send every pending local write to the remote.
    pub fn push(&mut self) -> Result<SyncReport, TraceError> {
        let mut report = SyncReport::default();
        for collection in Collection::DATA {
            self.push_collection(collection, &mut report)?;
        }
        tracing::info!(
            pushed = report.pushed,
            conflicts = report.conflicts,
            failed = report.failed,
            "push finished"
        );
        Ok(report)
    }

    fn push_collection(
        &mut self,
        collection: Collection,
        report: &mut SyncReport,
    ) -> Result<(), TraceError> {
        let policy = self.policy;
        let local = self.local.get_mut().map_err(poisoned)?;
        let remote = &mut self.remote;

        let mut outbox = Meta::<Outbox>::load(&*local, Collection::Outbox, collection)?;
        if outbox.value.entries.is_empty() {
            return Ok(());
        }
        let mut state = Meta::<SyncState>::load(&*local, Collection::SyncState, collection)?;

        let pending: Vec<(RecordId, PendingWrite)> = outbox
            .value
            .entries
            .iter()
            .map(|(id, p)| (*id, *p))
            .collect();

        for (id, entry) in pending {
            let current = local.get(collection, id)?;
            let settled = match push_one(remote, collection, id, entry.remote_base, &current) {
                Ok(version) => {
                    report.pushed += 1;
                    mirror(local, &mut state, collection, id, current, version)?;
                    true
                }
                Err(TraceError::VersionConflict { found, .. }) => {
                    report.conflicts += 1;
                    tracing::warn!(%collection, %id, ?found, %policy, "push conflict");
                    match policy {
                        ConflictPolicy::RemoteWins => match remote.get(collection, id) {
                            Ok(theirs) => {
                                let version = theirs.as_ref().map(|d| d.version);
                                local.replicate(collection, id, theirs)?;
                                record_remote(&mut state, id, version);
                                report.resolved_remote += 1;
                                true
                            }
                            Err(e) => {
                                tracing::warn!(%collection, %id, error = %e, "fetching remote copy failed");
                                report.failed += 1;
                                false
                            }
                        },
                        ConflictPolicy::LocalWins => {
                            let retried = remote.get(collection, id).and_then(|theirs| {
                                let base = theirs.map(|d| d.version);
                                push_one(remote, collection, id, base, &current)
                            });
                            match retried {
                                Ok(version) => {
                                    mirror(local, &mut state, collection, id, current, version)?;
                                    report.resolved_local += 1;
                                    true
                                }
                                Err(e) => {
                                    tracing::warn!(%collection, %id, error = %e, "push retry failed");
                                    report.failed += 1;
                                    false
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(%collection, %id, error = %e, "push failed");
                    report.failed += 1;
                    false
                }
            };
            if settled {
                outbox.value.entries.remove(&id);
                outbox.dirty = true;
            }
        }

        outbox.save(local, Collection::Outbox)?;
        state.save(local, Collection::SyncState)
    }

    // -------------------------------------------------------------------------
    // Pull
    // -------------------------------------------------------------------------

    /// Mirror remote documents of `collections` into the local tier.
    pub fn pull(&mut self, collections: &[Collection]) -> Result<SyncReport, TraceError> {
        let mut report = SyncReport::default();
        for &collection in collections {
            if collection.is_replicated() {
                self.pull_collection(collection, &mut report)?;
            }
        }
        tracing::info!(
            pulled = report.pulled,
            removed = report.removed,
            "pull finished"
        );
        Ok(report)
    }

    fn pull_collection(
        &mut self,
        collection: Collection,
        report: &mut SyncReport,
    ) -> Result<(), TraceError> {
        let theirs = self.remote.scan(collection)?;
        let local = self.local.get_mut().map_err(poisoned)?;

        let outbox = Meta::<Outbox>::load(&*local, Collection::Outbox, collection)?;
        let mut state = Meta::<SyncState>::load(&*local, Collection::SyncState, collection)?;
        let ours: BTreeMap<RecordId, u64> = local
            .scan(collection)?
            .into_iter()
            .map(|(id, doc)| (id, doc.version))
            .collect();

        let mut seen = BTreeSet::new();
        for (id, doc) in theirs {
            seen.insert(id);
            if outbox.value.entries.contains_key(&id) {
                continue;
            }
            let version = doc.version;
            if ours.get(&id) != Some(&version) {
                local.replicate(collection, id, Some(doc))?;
                report.pulled += 1;
            }
            if state.value.remote_versions.get(&id) != Some(&version) {
                state.value.remote_versions.insert(id, version);
                state.dirty = true;
            }
        }

        for id in ours.keys().filter(|id| !seen.contains(*id)) {
            if outbox.value.entries.contains_key(id) {
                continue;
            }
            if state.value.remote_versions.remove(id).is_some() {
                local.replicate(collection, *id, None)?;
                state.dirty = true;
                report.removed += 1;
            }
        }

        state.save(local, Collection::SyncState)
    }

    /// Push, then pull every business collection.
    pub fn sync(&mut self) -> Result<SyncReport, TraceError> {
        let pushed = self.push()?;
        let pulled = self.pull(&Collection::DATA)?;
        Ok(SyncReport {
            pulled: pulled.pulled,
            removed: pulled.removed,
            ..pushed
        })
    }
}

/// Send one pending key. Returns the remote version after the write
/// (0 for a deletion).
fn push_one<R: DocumentStore + ?Sized>(
    remote: &mut R,
    collection: Collection,
    id: RecordId,
    base: Option<u64>,
    current: &Option<StoredDocument>,
) -> Result<u64, TraceError> {
    let op = match current {
        Some(doc) => WriteOp::Put {
            collection,
            id,
            base,
            body: doc.body.clone(),
        },
        // Created and deleted locally: nothing to tell the remote.
        None if base.is_none() => return Ok(0),
        None => WriteOp::Delete {
            collection,
            id,
            expected: base,
        },
    };
    let versions = remote.commit(&[op])?;
    Ok(versions.first().copied().unwrap_or(0))
}

/// After a successful push, make the local copy carry the remote version.
fn mirror<L: DocumentStore + ?Sized>(
    local: &mut L,
    state: &mut Meta<SyncState>,
    collection: Collection,
    id: RecordId,
    current: Option<StoredDocument>,
    version: u64,
) -> Result<(), TraceError> {
    match current {
        Some(doc) => {
            local.replicate(
                collection,
                id,
                Some(StoredDocument {
                    version,
                    body: doc.body,
                }),
            )?;
            record_remote(state, id, Some(version));
        }
        None => record_remote(state, id, None),
    }
    Ok(())
}

fn record_remote(state: &mut Meta<SyncState>, id: RecordId, version: Option<u64>) {
    let changed = match version {
        Some(v) => state.value.remote_versions.insert(id, v) != Some(v),
        None => state.value.remote_versions.remove(&id).is_some(),
    };
    state.dirty |= changed;
}

// =============================================================================
// DOCUMENT STORE
// =============================================================================

impl<L: DocumentStore, R: DocumentStore> DocumentStore for TieredStore<L, R> {
    fn get(
        &self,
        collection: Collection,
        id: RecordId,
    ) -> Result<Option<StoredDocument>, TraceError> {
        let mut local = self.lock()?;
        if let Some(doc) = local.get(collection, id)? {
            return Ok(Some(doc));
        }
        if !collection.is_replicated() {
            return Ok(None);
        }

        // A pending local delete must not be undone by the read-through.
        let outbox = Meta::<Outbox>::load(&*local, Collection::Outbox, collection)?;
        if outbox.value.entries.contains_key(&id) {
            return Ok(None);
        }

        match self.remote.get(collection, id) {
            Ok(Some(doc)) => {
                local.replicate(collection, id, Some(doc.clone()))?;
                let mut state = Meta::<SyncState>::load(&*local, Collection::SyncState, collection)?;
                record_remote(&mut state, id, Some(doc.version));
                state.save(&mut *local, Collection::SyncState)?;
                tracing::debug!(%collection, %id, "cached remote document");
                Ok(Some(doc))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                tracing::warn!(%collection, %id, error = %e, "remote read failed, treating as miss");
                Ok(None)
            }
        }
    }

    fn scan(&self, collection: Collection) -> Result<Vec<(RecordId, StoredDocument)>, TraceError> {
        self.lock()?.scan(collection)
    }

    fn commit(&mut self, ops: &[WriteOp]) -> Result<Vec<u64>, TraceError> {
        let local = self.local.get_mut().map_err(poisoned)?;
        let now = Timestamp::now();

        let mut outboxes: BTreeMap<Collection, Meta<Outbox>> = BTreeMap::new();
        for op in ops {
            let (collection, id) = op.key();
            if !collection.is_replicated() {
                continue;
            }
            let outbox = match outboxes.entry(collection) {
                std::collections::btree_map::Entry::Occupied(e) => e.into_mut(),
                std::collections::btree_map::Entry::Vacant(e) => {
                    e.insert(Meta::load(&*local, Collection::Outbox, collection)?)
                }
            };
            if !outbox.value.entries.contains_key(&id) {
                let remote_base = local.get(collection, id)?.map(|d| d.version);
                outbox.value.entries.insert(
                    id,
                    PendingWrite {
                        remote_base,
                        queued_at: now,
                    },
                );
                outbox.dirty = true;
            }
        }

        let mut batch = ops.to_vec();
        for outbox in outboxes.values().filter(|o| o.dirty) {
            batch.push(outbox.put_op(Collection::Outbox)?);
        }

        let mut versions = local.commit(&batch)?;
        versions.truncate(ops.len());
        Ok(versions)
    }

    fn replicate(
        &mut self,
        collection: Collection,
        id: RecordId,
        doc: Option<StoredDocument>,
    ) -> Result<(), TraceError> {
        self.local
            .get_mut()
            .map_err(poisoned)?
            .replicate(collection, id, doc)
    }

    fn count(&self, collection: Collection) -> Result<usize, TraceError> {
        self.lock()?.count(collection)
    }
}

// =============================================================================
// TESTS
// =============================================================================
