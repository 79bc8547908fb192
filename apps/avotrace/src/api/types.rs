//! # API Request/Response Types
//!
//! This module defines the JSON structures for the HTTP API, including the
//! replication wire format shared with [`crate::remote::RemoteStore`].

use avotrace_core::{
    ArchivedLot, Collection, EmployeeUpdate, Lot, LotQuery, LotSort, LotStatus, LotSummary,
    PayrollSummary, RecordId, Stage, StageRecord, StepCheck, StoredDocument, Timestamp,
    TraceError, UserId, Visibility, WriteOp,
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// HEALTH / STATUS
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Document counts per collection and lot counts for the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub collections: BTreeMap<String, usize>,
    pub lots: LotSummary,
}

// =============================================================================
// ERRORS
// =============================================================================

/// Details of a rejected write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictDetail {
    pub collection: Collection,
    pub id: RecordId,
    pub expected: Option<u64>,
    pub found: Option<u64>,
}

/// Body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    /// Required fields still empty (step incomplete only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing: Option<Vec<String>>,
    /// Set on version conflicts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict: Option<ConflictDetail>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            missing: None,
            conflict: None,
        }
    }
}

// =============================================================================
// LOTS
// =============================================================================

/// A lot with its derived progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LotView {
    #[serde(flatten)]
    pub lot: Lot,
    pub completion_percent: u8,
    /// First stage not yet completed.
    pub next_stage: Option<Stage>,
}

impl From<Lot> for LotView {
    fn from(lot: Lot) -> Self {
        Self {
            completion_percent: lot.completion_percent(),
            next_stage: lot.first_incomplete(),
            lot,
        }
    }
}

/// Query string of `GET /lots`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LotListParams {
    pub status: Option<String>,
    pub owner: Option<String>,
    pub visibility: Option<String>,
    pub prefix: Option<String>,
    /// RFC 3339 lower bound on creation time.
    pub from: Option<String>,
    /// RFC 3339 upper bound on creation time.
    pub to: Option<String>,
    pub sort: Option<String>,
    pub desc: bool,
    pub limit: Option<usize>,
}

fn parse_instant(value: &str) -> Result<Timestamp, TraceError> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|dt| Timestamp(dt.timestamp_millis()))
        .map_err(|_| TraceError::InvalidInput(format!("invalid RFC 3339 time: {value:?}")))
}

impl LotListParams {
    /// Convert to a [`LotQuery`], validating every filter.
    pub fn to_query(&self) -> Result<LotQuery, TraceError> {
        Ok(LotQuery {
            status: self
                .status
                .as_deref()
                .map(str::parse::<LotStatus>)
                .transpose()?,
            owner: self.owner.as_deref().map(UserId::new).transpose()?,
            visibility: self
                .visibility
                .as_deref()
                .map(str::parse::<Visibility>)
                .transpose()?,
            lot_number_prefix: self.prefix.clone().filter(|p| !p.is_empty()),
            created_from: self.from.as_deref().map(parse_instant).transpose()?,
            created_to: self.to.as_deref().map(parse_instant).transpose()?,
            sort: self
                .sort
                .as_deref()
                .map(str::parse::<LotSort>)
                .transpose()?
                .unwrap_or_default(),
            descending: self.desc,
            limit: self.limit,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LotListResponse {
    pub count: usize,
    pub lots: Vec<LotView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateLotRequest {
    pub lot_number: String,
    #[serde(default)]
    pub visibility: Visibility,
}

/// Body of `PUT /lots/{id}/stages` and `POST /lots/{id}/advance`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRequest {
    #[serde(default)]
    pub expected_version: Option<u64>,
    pub record: StageRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvanceResponse {
    pub lot: LotView,
    pub stage: Stage,
    pub newly_completed: bool,
    pub lot_completed: bool,
    pub archived: bool,
    /// The working copy was removed after archival.
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRequest {
    #[serde(default)]
    pub expected_version: Option<u64>,
    pub stage: Stage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameRequest {
    #[serde(default)]
    pub expected_version: Option<u64>,
    pub lot_number: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DuplicateRequest {
    #[serde(default)]
    pub lot_number: Option<String>,
}

/// Optimistic concurrency guard, as a JSON body or a query string.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpectedVersion {
    pub expected_version: Option<u64>,
}

/// One row of the per-step report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepStatus {
    pub stage: Stage,
    pub number: u8,
    pub completed: bool,
    pub valid: bool,
    pub missing: Vec<String>,
}

impl From<StepCheck> for StepStatus {
    fn from(check: StepCheck) -> Self {
        Self {
            stage: check.stage,
            number: check.number,
            completed: check.completed,
            valid: check.valid,
            missing: check.missing.into_iter().map(str::to_string).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResponse {
    pub lot_id: RecordId,
    pub lot_number: String,
    pub completion_percent: u8,
    pub steps: Vec<StepStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveListResponse {
    pub count: usize,
    pub lots: Vec<ArchivedLot>,
}

// =============================================================================
// EXPORTS
// =============================================================================

/// Snapshot export response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotResponse {
    /// Base64 of the binary snapshot.
    pub data: String,
    pub checksum: u64,
    pub size_bytes: usize,
}

/// Cryptographic hash response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashResponse {
    pub hash: String,
    pub algorithm: String,
    pub checksum: u64,
}

// =============================================================================
// PERSONNEL
// =============================================================================

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EmployeeListParams {
    pub active_only: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateEmployeeRequest {
    #[serde(default)]
    pub expected_version: Option<u64>,
    #[serde(flatten)]
    pub update: EmployeeUpdate,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShiftListParams {
    pub employee_id: Option<RecordId>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayrollParams {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayrollResponse {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub total_gross_cents: u64,
    pub summaries: Vec<PayrollSummary>,
}

// =============================================================================
// QUALITY / DOCUMENTS
// =============================================================================

/// `?lot_id=` filter of the inspection and document listings.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LotFilterParams {
    pub lot_id: Option<RecordId>,
}

/// Query string of `POST /documents`; the body is the raw file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadParams {
    pub file_name: String,
    #[serde(default)]
    pub lot_id: Option<RecordId>,
}

// =============================================================================
// REPLICATION
// =============================================================================

fn decode_base64(data: &str) -> Result<Vec<u8>, TraceError> {
    STANDARD
        .decode(data)
        .map_err(|e| TraceError::DeserializationError(format!("Invalid base64 body: {}", e)))
}

/// A stored document on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicatedDocument {
    pub id: RecordId,
    pub version: u64,
    /// Base64 of the encoded body.
    pub body: String,
}

impl ReplicatedDocument {
    pub fn from_stored(id: RecordId, doc: &StoredDocument) -> Self {
        Self {
            id,
            version: doc.version,
            body: STANDARD.encode(&doc.body),
        }
    }

    pub fn into_stored(self) -> Result<(RecordId, StoredDocument), TraceError> {
        let body = decode_base64(&self.body)?;
        Ok((
            self.id,
            StoredDocument {
                version: self.version,
                body,
            },
        ))
    }
}

/// Every document of one collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationScan {
    pub collection: Collection,
    pub documents: Vec<ReplicatedDocument>,
}

/// A [`WriteOp`] on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ReplicationOp {
    Put {
        collection: Collection,
        id: RecordId,
        base: Option<u64>,
        body: String,
    },
    Delete {
        collection: Collection,
        id: RecordId,
        expected: Option<u64>,
    },
}

impl From<&WriteOp> for ReplicationOp {
    fn from(op: &WriteOp) -> Self {
        match op {
            WriteOp::Put {
                collection,
                id,
                base,
                body,
            } => ReplicationOp::Put {
                collection: *collection,
                id: *id,
                base: *base,
                body: STANDARD.encode(body),
            },
            WriteOp::Delete {
                collection,
                id,
                expected,
            } => ReplicationOp::Delete {
                collection: *collection,
                id: *id,
                expected: *expected,
            },
        }
    }
}

impl ReplicationOp {
    fn collection(&self) -> Collection {
        match self {
            ReplicationOp::Put { collection, .. } | ReplicationOp::Delete { collection, .. } => {
                *collection
            }
        }
    }

    /// Decode into a [`WriteOp`]. Sync bookkeeping collections are refused.
    pub fn into_write_op(self) -> Result<WriteOp, TraceError> {
        let collection = self.collection();
        if !collection.is_replicated() {
            return Err(TraceError::InvalidInput(format!(
                "collection {collection} is not replicated"
            )));
        }
        Ok(match self {
            ReplicationOp::Put {
                collection,
                id,
                base,
                body,
            } => WriteOp::Put {
                collection,
                id,
                base,
                body: decode_base64(&body)?,
            },
            ReplicationOp::Delete {
                collection,
                id,
                expected,
            } => WriteOp::Delete {
                collection,
                id,
                expected,
            },
        })
    }
}

/// Body of `POST /replication/commit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRequest {
    pub ops: Vec<ReplicationOp>,
}

/// New version per operation (0 for deletes).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitResponse {
    pub versions: Vec<u64>,
}
