//! # avotrace-core
//!
//! The lot lifecycle engine for avotrace - THE LOGIC.
//!
//! A lot of avocados moves through seven fixed stages (harvest, transport,
//! sorting, packaging, storage, export, delivery). Each stage has a form of
//! its own; a stage counts as completed once its required fields are present
//! and it has been explicitly advanced. Partial progress is saved after every
//! step, and a lot that completes the seventh stage is archived.
//!
//! Around the lot wizard sit the operations modules: personnel and payroll,
//! quality inspections, and a document archive.
//!
//! ## Architectural Constraints
//!
//! - No async, no network dependencies (pure Rust)
//! - Integer arithmetic only (kilograms, tenths of a degree, cents, minutes)
//! - Deterministic ordering for everything that is listed or exported
//! - Storage behind the [`DocumentStore`] trait; every write is versioned

// =============================================================================
// MODULES
// =============================================================================

pub mod documents;
pub mod export;
pub mod ledger;
pub mod lifecycle;
pub mod lot;
pub mod personnel;
pub mod primitives;
pub mod quality;
pub mod query;
pub mod records;
pub mod report;
pub mod stage;
pub mod storage;
pub mod sync;
pub mod types;
pub mod validator;

// =============================================================================
// RE-EXPORTS: Core Types
// =============================================================================

pub use types::{Collection, RecordId, Timestamp, TraceError, UserId, Viewer, Visibility};

// =============================================================================
// RE-EXPORTS: Lot Lifecycle
// =============================================================================

pub use lifecycle::{AdvanceOutcome, LifecycleConfig};
pub use lot::{ArchivedLot, Lot, LotStatus, completion_percent};
pub use query::{LotQuery, LotSort};
pub use records::{
    DeliveryRecord, ExportRecord, HarvestRecord, LotStages, PackagingRecord, SortingRecord,
    StageRecord, StorageRecord, TransportRecord,
};
pub use stage::Stage;
pub use validator::{StepCheck, StepValidator};

// =============================================================================
// RE-EXPORTS: Storage
// =============================================================================

pub use ledger::{AdvanceResult, Ledger, LotSummary};
pub use storage::{
    DocumentStore, MemoryStore, RedbStore, StorageBackend, StoredDocument, WriteOp,
};
pub use sync::{ConflictPolicy, SyncReport, TieredStore};

// =============================================================================
// RE-EXPORTS: Operations
// =============================================================================

pub use documents::{
    BlobStore, BlobTransfer, DocumentRecord, FileBlobStore, MemoryBlobStore, reconcile_blob,
};
pub use export::{
    SnapshotHeader, export_snapshot, import_snapshot, restore_into, snapshot_checksum,
    verify_snapshot,
};
pub use personnel::{
    Employee, EmployeeInput, EmployeeUpdate, PayrollPolicy, PayrollSummary, ShiftInput,
    WorkShift, compute_payroll,
};
pub use quality::{DefectKind, InspectionInput, QualityInspection, QualityPolicy, Verdict};
pub use report::{inspections_csv, lots_csv, payroll_csv};
