//! # Core Type Definitions
//!
//! This module contains the shared types of the avotrace CORE:
//! - Identifiers (`RecordId`, `UserId`)
//! - Time (`Timestamp`)
//! - Storage addressing (`Collection`)
//! - Access control (`Visibility`, `Viewer`)
//! - Error types (`TraceError`)
//!
//! All types implement `Ord` where they are used as keys, so that listings
//! built from `BTreeMap`/`BTreeSet` come out in a stable order.

use crate::primitives::MAX_USER_ID_LENGTH;
use crate::stage::Stage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Identifier of a stored document (lot, employee, shift, inspection, file).
///
/// Random (UUID v4) so that records created offline on different clients
/// never collide when they are pushed to the shared store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub Uuid);

impl RecordId {
    /// Generate a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// The identifier as a 128-bit integer (storage key).
    #[must_use]
    pub const fn as_u128(&self) -> u128 {
        self.0.as_u128()
    }

    /// Rebuild an identifier from its storage key.
    #[must_use]
    pub const fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for RecordId {
    type Err = TraceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| TraceError::InvalidInput(format!("invalid record id: {s:?}")))
    }
}

/// The acting user. Owner of lots, author of uploads and archives.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    /// Create a user id, rejecting empty or oversized names.
    pub fn new(s: impl Into<String>) -> Result<Self, TraceError> {
        let s = s.into();
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(TraceError::InvalidInput("user id is empty".to_string()));
        }
        if trimmed.len() > MAX_USER_ID_LENGTH {
            return Err(TraceError::InvalidInput(format!(
                "user id length {} exceeds maximum {}",
                trimmed.len(),
                MAX_USER_ID_LENGTH
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Get the user id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// TIME
// =============================================================================

/// Unix epoch milliseconds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// The current UTC wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp_millis())
    }

    /// Get the raw millisecond value.
    #[must_use]
    pub const fn millis(self) -> i64 {
        self.0
    }

    /// RFC 3339 rendering used in CSV reports. Falls back to the raw
    /// millisecond count for values chrono cannot represent.
    #[must_use]
    pub fn to_rfc3339(self) -> String {
        chrono::DateTime::<chrono::Utc>::from_timestamp_millis(self.0)
            .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
            .unwrap_or_else(|| self.0.to_string())
    }
}

// =============================================================================
// COLLECTIONS
// =============================================================================

/// A named document collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    /// Working lots (draft, in progress, completed).
    Lots,
    /// Frozen copies of completed lots.
    Archive,
    /// Personnel.
    Employees,
    /// Work schedule entries.
    Shifts,
    /// Quality control inspections.
    Inspections,
    /// Metadata of archived files.
    Documents,
    /// Local writes not yet pushed to the remote tier.
    Outbox,
    /// Remote versions last seen by the local tier.
    SyncState,
}

impl Collection {
    /// Collections holding business data, in a fixed order.
    pub const DATA: [Collection; 6] = [
        Collection::Lots,
        Collection::Archive,
        Collection::Employees,
        Collection::Shifts,
        Collection::Inspections,
        Collection::Documents,
    ];

    /// Every collection, including the internal sync bookkeeping.
    pub const ALL: [Collection; 8] = [
        Collection::Lots,
        Collection::Archive,
        Collection::Employees,
        Collection::Shifts,
        Collection::Inspections,
        Collection::Documents,
        Collection::Outbox,
        Collection::SyncState,
    ];

    /// The collection name (also the redb table name).
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Collection::Lots => "lots",
            Collection::Archive => "archive",
            Collection::Employees => "employees",
            Collection::Shifts => "shifts",
            Collection::Inspections => "inspections",
            Collection::Documents => "documents",
            Collection::Outbox => "outbox",
            Collection::SyncState => "sync_state",
        }
    }

    /// Whether the collection is replicated between tiers.
    #[must_use]
    pub const fn is_replicated(&self) -> bool {
        !matches!(self, Collection::Outbox | Collection::SyncState)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = TraceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Collection::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| TraceError::InvalidInput(format!("unknown collection: {s:?}")))
    }
}

// =============================================================================
// ACCESS CONTROL
// =============================================================================

/// Who can see a lot.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Visible to every user.
    #[default]
    Global,
    /// Visible to the owner and administrators only.
    Restricted,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Visibility::Global => f.write_str("global"),
            Visibility::Restricted => f.write_str("restricted"),
        }
    }
}

impl FromStr for Visibility {
    type Err = TraceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "global" => Ok(Visibility::Global),
            "restricted" => Ok(Visibility::Restricted),
            _ => Err(TraceError::InvalidInput(format!(
                "unknown visibility: {s:?} (use global or restricted)"
            ))),
        }
    }
}

/// The user a read or write is performed for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    /// The acting user.
    pub user: UserId,
    /// Administrators see restricted records of every owner.
    pub admin: bool,
}

impl Viewer {
    /// A regular (non-admin) user.
    #[must_use]
    pub fn user(user: UserId) -> Self {
        Self { user, admin: false }
    }

    /// An administrator.
    #[must_use]
    pub fn admin(user: UserId) -> Self {
        Self { user, admin: true }
    }

    /// Whether this viewer may see a record owned by `owner`.
    #[must_use]
    pub fn can_see(&self, owner: &UserId, visibility: Visibility) -> bool {
        self.admin || visibility == Visibility::Global || &self.user == owner
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the avotrace system.
///
/// - No silent failures
/// - Use `Result<T, TraceError>` for fallible operations
/// - The CORE never panics; every error is recoverable by the caller
#[derive(Debug, Error)]
pub enum TraceError {
    /// A field or argument failed validation.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The requested document does not exist (or is not visible).
    #[error("Not found: {collection}/{id}")]
    NotFound {
        collection: Collection,
        id: RecordId,
    },

    /// A stage cannot be completed because required fields are empty.
    #[error("Stage {stage} is incomplete, missing: {}", missing.join(", "))]
    StepIncomplete {
        stage: Stage,
        missing: Vec<&'static str>,
    },

    /// The requested lifecycle transition is not allowed from the current state.
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// A write was based on a version that is no longer current.
    #[error("Version conflict on {collection}/{id}: expected {expected:?}, found {found:?}")]
    VersionConflict {
        collection: Collection,
        id: RecordId,
        expected: Option<u64>,
        found: Option<u64>,
    },

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A deserialization error occurred.
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// An I/O or storage engine error occurred.
    #[error("I/O error: {0}")]
    IoError(String),

    /// The remote tier failed or refused the request.
    #[error("Remote error: {0}")]
    Remote(String),
}

impl TraceError {
    /// Shorthand for a `NotFound` error.
    #[must_use]
    pub fn not_found(collection: Collection, id: RecordId) -> Self {
        Self::NotFound { collection, id }
    }
}

// =============================================================================
// TESTS
// =============================================================================
