//! # Fixed Limits and Constants
//!
//! Hardcoded runtime constants for the avotrace CORE.
//!
//! These values are compiled into the binary and are immutable at runtime.
//! Anything operators may want to tune lives in the policy structs
//! (`LifecycleConfig`, `PayrollPolicy`, `QualityPolicy`) instead.

/// Number of handling stages a lot moves through.
pub const STAGE_COUNT: usize = 7;

/// Magic bytes for the snapshot export header.
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"AVTX";

/// Current snapshot format version.
///
/// Increment this when making breaking changes to the snapshot format.
pub const SNAPSHOT_VERSION: u8 = 1;

/// Suffix appended to the lot number of a duplicated lot when no new
/// number is given.
pub const DUPLICATE_SUFFIX: &str = "-COPY";

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length for a lot number.
pub const MAX_LOT_NUMBER_LENGTH: usize = 64;

/// Maximum length for any free-text field of a stage record or a
/// personnel/quality record.
///
/// Longer values are rejected before they reach storage.
pub const MAX_FIELD_LENGTH: usize = 4096;

/// Maximum length for a user identifier.
pub const MAX_USER_ID_LENGTH: usize = 128;

/// Maximum number of calibers listed on a packaging record.
pub const MAX_CALIBERS: usize = 32;

/// Maximum hourly rate of an employee, in cents (one million per hour).
pub const MAX_HOURLY_RATE_CENTS: u64 = 100_000_000;

/// Default page size when listing documents.
pub const DEFAULT_LIST_LIMIT: usize = 100;

/// Hard cap on the page size of any list operation.
pub const MAX_LIST_LIMIT: usize = 1000;

/// Maximum number of operations in a single storage commit.
pub const MAX_BATCH_OPS: usize = 1000;

/// Maximum size of an archived file (20 MiB).
pub const MAX_DOCUMENT_SIZE: usize = 20 * 1024 * 1024;

/// Maximum number of documents accepted from a snapshot import.
///
/// This prevents memory exhaustion from malicious or corrupted data.
pub const MAX_IMPORT_DOCUMENTS: u64 = 5_000_000;

/// Maximum allowed payload size for snapshot files (500 MB).
pub const MAX_SNAPSHOT_SIZE: usize = 500 * 1024 * 1024;
