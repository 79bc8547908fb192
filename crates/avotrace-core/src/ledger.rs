//! # Ledger
//!
//! The repository layer: typed reads and writes over a [`DocumentStore`],
//! visibility enforcement, and the persistent form of every lifecycle
//! operation.
//!
//! Each mutating operation follows the same shape:
//! 1. load the current document (NotFound if missing or not visible)
//! 2. compare the caller's expected version, if any
//! 3. apply a pure transition from [`lifecycle`](crate::lifecycle)
//! 4. commit every resulting write in one batch
//!
//! A failure at any step writes nothing.

use crate::documents::{BlobStore, BlobTransfer, DocumentRecord, MemoryBlobStore, reconcile_blob};
use crate::lifecycle::{self, AdvanceOutcome, LifecycleConfig};
use crate::lot::{ArchivedLot, Lot, LotStatus, completion_percent};
use crate::personnel::{
    Employee, EmployeeInput, EmployeeUpdate, PayrollPolicy, PayrollSummary, ShiftInput, WorkShift,
    compute_payroll,
};
use crate::quality::{InspectionInput, QualityInspection, QualityPolicy};
use crate::query::LotQuery;
use crate::records::StageRecord;
use crate::stage::Stage;
use crate::storage::{DocumentStore, WriteOp, decode_body, encode_body};
use crate::sync::SyncReport;
use crate::types::{Collection, RecordId, Timestamp, TraceError, UserId, Viewer, Visibility};
use crate::validator::{StepCheck, StepValidator};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

// =============================================================================
// TYPED DOCUMENTS
// =============================================================================

/// A document type stored in one collection.
///
/// The version field inside the body is informational; on load it is
/// overwritten with the version the store reports.
trait Versioned: Serialize + DeserializeOwned {
    const COLLECTION: Collection;
    fn id(&self) -> RecordId;
    fn version(&self) -> u64;
    fn set_version(&mut self, version: u64);
}

macro_rules! versioned {
    ($ty:ty, $collection:expr) => {
        impl Versioned for $ty {
            const COLLECTION: Collection = $collection;
            fn id(&self) -> RecordId {
                self.id
            }
            fn version(&self) -> u64 {
                self.version
            }
            fn set_version(&mut self, version: u64) {
                self.version = version;
            }
        }
    };
}

versioned!(Lot, Collection::Lots);
versioned!(Employee, Collection::Employees);
versioned!(WorkShift, Collection::Shifts);
versioned!(QualityInspection, Collection::Inspections);
versioned!(DocumentRecord, Collection::Documents);

impl Versioned for ArchivedLot {
    const COLLECTION: Collection = Collection::Archive;
    fn id(&self) -> RecordId {
        self.lot.id
    }
    fn version(&self) -> u64 {
        self.lot.version
    }
    fn set_version(&mut self, version: u64) {
        self.lot.version = version;
    }
}

/// `None` for documents that have never been saved.
fn base_of<T: Versioned>(doc: &T) -> Option<u64> {
    match doc.version() {
        0 => None,
        v => Some(v),
    }
}

fn put_op<T: Versioned>(doc: &T, base: Option<u64>) -> Result<WriteOp, TraceError> {
    Ok(WriteOp::Put {
        collection: T::COLLECTION,
        id: doc.id(),
        base,
        body: encode_body(doc)?,
    })
}

/// Reject a write whose caller saw a different version than the stored one.
fn check_expected(
    collection: Collection,
    id: RecordId,
    expected: Option<u64>,
    found: u64,
) -> Result<(), TraceError> {
    match expected {
        Some(v) if v != found => Err(TraceError::VersionConflict {
            collection,
            id,
            expected: Some(v),
            found: Some(found),
        }),
        _ => Ok(()),
    }
}

// =============================================================================
// RESULTS
// =============================================================================

/// Result of [`Ledger::advance_step`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvanceResult {
    /// The lot after the transition. When the working copy was deleted
    /// after archival this is its final state.
    pub lot: Lot,
    pub outcome: AdvanceOutcome,
    /// Set when completing the lot archived it.
    pub archived: Option<ArchivedLot>,
    /// True when the working copy was removed after archival.
    pub deleted: bool,
}

/// Lot counts per status for one viewer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotSummary {
    /// Distinct lots; a completed lot kept after archival counts once.
    pub total: usize,
    pub draft: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub archived: usize,
    /// Mean completion of working lots, rounded half-up.
    pub average_completion_percent: u8,
}

// =============================================================================
// LEDGER
// =============================================================================

/// Typed repository over a document store and a blob store.
pub struct Ledger<S: DocumentStore> {
    store: S,
    blobs: Box<dyn BlobStore>,
    lifecycle: LifecycleConfig,
    payroll: PayrollPolicy,
    quality: QualityPolicy,
}

impl<S: DocumentStore> std::fmt::Debug for Ledger<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("lifecycle", &self.lifecycle)
            .field("payroll", &self.payroll)
            .field("quality", &self.quality)
            .finish_non_exhaustive()
    }
}

impl<S: DocumentStore> Ledger<S> {
    /// Create a ledger with default policies and an in-memory blob store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            blobs: Box::new(MemoryBlobStore::new()),
            lifecycle: LifecycleConfig::default(),
            payroll: PayrollPolicy::default(),
            quality: QualityPolicy::default(),
        }
    }

    /// Use `blobs` for document contents.
    #[must_use]
    pub fn with_blob_store(mut self, blobs: impl BlobStore + 'static) -> Self {
        self.blobs = Box::new(blobs);
        self
    }

    #[must_use]
    pub fn with_lifecycle(mut self, config: LifecycleConfig) -> Self {
        self.lifecycle = config;
        self
    }

    #[must_use]
    pub fn with_payroll_policy(mut self, policy: PayrollPolicy) -> Self {
        self.payroll = policy;
        self
    }

    #[must_use]
    pub fn with_quality_policy(mut self, policy: QualityPolicy) -> Self {
        self.quality = policy;
        self
    }

    pub fn lifecycle_config(&self) -> LifecycleConfig {
        self.lifecycle
    }

    /// Get a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get a mutable reference to the underlying store.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Consume the ledger and return the store.
    pub fn into_store(self) -> S {
        self.store
    }

    /// Number of documents in each business collection.
    pub fn collection_counts(&self) -> Result<Vec<(Collection, usize)>, TraceError> {
        Collection::DATA
            .iter()
            .map(|&c| Ok((c, self.store.count(c)?)))
            .collect()
    }

    // -------------------------------------------------------------------------
    // Generic load / save
    // -------------------------------------------------------------------------

    fn load<T: Versioned>(&self, id: RecordId) -> Result<Option<T>, TraceError> {
        match self.store.get(T::COLLECTION, id)? {
            Some(doc) => {
                let mut value: T = decode_body(&doc.body)?;
                value.set_version(doc.version);
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn load_all<T: Versioned>(&self) -> Result<Vec<T>, TraceError> {
        self.store
            .scan(T::COLLECTION)?
            .into_iter()
            .map(|(_, doc)| {
                let mut value: T = decode_body(&doc.body)?;
                value.set_version(doc.version);
                Ok(value)
            })
            .collect()
    }

    fn require<T: Versioned>(&self, id: RecordId) -> Result<T, TraceError> {
        self.load(id)?
            .ok_or_else(|| TraceError::not_found(T::COLLECTION, id))
    }

    /// Create or update one document based on the version it was read at.
    fn save<T: Versioned>(&mut self, doc: &mut T) -> Result<(), TraceError> {
        let op = put_op(doc, base_of(doc))?;
        let versions = self.store.commit(&[op])?;
        doc.set_version(versions.first().copied().unwrap_or_default());
        Ok(())
    }

    fn remove<T: Versioned>(&mut self, doc: &T) -> Result<(), TraceError> {
        self.store.commit(&[WriteOp::Delete {
            collection: T::COLLECTION,
            id: doc.id(),
            expected: Some(doc.version()),
        }])?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Lots
    // -------------------------------------------------------------------------

    fn visible_lot(&self, id: RecordId, viewer: &Viewer) -> Result<Lot, TraceError> {
        match self.load::<Lot>(id)? {
            Some(lot) if viewer.can_see(&lot.owner, lot.visibility) => Ok(lot),
            _ => Err(TraceError::not_found(Collection::Lots, id)),
        }
    }

    /// Lot number of a visible working or archived lot.
    fn visible_lot_number(&self, id: RecordId, viewer: &Viewer) -> Result<String, TraceError> {
        let number = match self.load::<Lot>(id)? {
            Some(lot) => viewer
                .can_see(&lot.owner, lot.visibility)
                .then_some(lot.lot_number),
            None => self
                .load::<ArchivedLot>(id)?
                .filter(|a| viewer.can_see(&a.lot.owner, a.lot.visibility))
                .map(|a| a.lot.lot_number),
        };
        number.ok_or_else(|| TraceError::not_found(Collection::Lots, id))
    }

    /// Whether records attached to `lot_id` may be shown. Records whose lot
    /// no longer exists stay visible.
    fn attachment_visible(&self, lot_id: Option<RecordId>, viewer: &Viewer) -> Result<bool, TraceError> {
        let Some(id) = lot_id else {
            return Ok(true);
        };
        if let Some(lot) = self.load::<Lot>(id)? {
            return Ok(viewer.can_see(&lot.owner, lot.visibility));
        }
        if let Some(archived) = self.load::<ArchivedLot>(id)? {
            return Ok(viewer.can_see(&archived.lot.owner, archived.lot.visibility));
        }
        Ok(true)
    }

    /// Load, check version, transform, save.
    fn update_lot<T>(
        &mut self,
        id: RecordId,
        expected: Option<u64>,
        viewer: &Viewer,
        apply: impl FnOnce(&mut Lot) -> Result<T, TraceError>,
    ) -> Result<(Lot, T), TraceError> {
        let mut lot = self.visible_lot(id, viewer)?;
        check_expected(Collection::Lots, id, expected, lot.version)?;
        let out = apply(&mut lot)?;
        self.save(&mut lot)?;
        Ok((lot, out))
    }

    /// Archive `lot` and, in the same batch, either update or delete the
    /// working copy. `lot_changed` says whether the working copy has
    /// unsaved modifications.
    fn commit_archive(
        &mut self,
        lot: &mut Lot,
        lot_changed: bool,
        by: &UserId,
        now: Timestamp,
    ) -> Result<(ArchivedLot, bool), TraceError> {
        let mut archived = lifecycle::archive(lot, by.clone(), now)?;
        let existing = self
            .store
            .get(Collection::Archive, lot.id)?
            .map(|d| d.version);

        let mut ops = vec![put_op(&archived, existing)?];
        let delete = self.lifecycle.delete_after_archive;
        if delete {
            ops.push(WriteOp::Delete {
                collection: Collection::Lots,
                id: lot.id,
                expected: Some(lot.version),
            });
        } else if lot_changed {
            ops.push(put_op(lot, base_of(lot))?);
        }

        let versions = self.store.commit(&ops)?;
        archived.set_version(versions.first().copied().unwrap_or_default());
        if !delete && lot_changed {
            lot.version = versions.get(1).copied().unwrap_or_default();
        }

        tracing::info!(lot = %lot.lot_number, id = %lot.id, deleted = delete, "lot archived");
        Ok((archived, delete))
    }

    /// Create and save a new draft owned by the viewer.
    pub fn create_lot(
        &mut self,
        lot_number: &str,
        visibility: Visibility,
        viewer: &Viewer,
    ) -> Result<Lot, TraceError> {
        let mut lot =
            lifecycle::create_draft(lot_number, viewer.user.clone(), visibility, Timestamp::now())?;
        self.save(&mut lot)?;
        tracing::debug!(lot = %lot.lot_number, id = %lot.id, "lot created");
        Ok(lot)
    }

    /// Fetch a working lot.
    pub fn get_lot(&self, id: RecordId, viewer: &Viewer) -> Result<Lot, TraceError> {
        self.visible_lot(id, viewer)
    }

    /// Working lots visible to the viewer, filtered and ordered by `query`.
    pub fn list_lots(&self, query: &LotQuery, viewer: &Viewer) -> Result<Vec<Lot>, TraceError> {
        Ok(query.apply(self.all_lots(viewer)?))
    }

    /// Every working lot visible to the viewer, oldest first, unpaged.
    pub fn all_lots(&self, viewer: &Viewer) -> Result<Vec<Lot>, TraceError> {
        let mut lots: Vec<Lot> = self
            .load_all::<Lot>()?
            .into_iter()
            .filter(|l| viewer.can_see(&l.owner, l.visibility))
            .collect();
        lots.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(lots)
    }

    /// Draft-save a stage record.
    pub fn save_stage(
        &mut self,
        id: RecordId,
        expected: Option<u64>,
        record: StageRecord,
        viewer: &Viewer,
    ) -> Result<Lot, TraceError> {
        let (lot, ()) = self.update_lot(id, expected, viewer, |lot| {
            lifecycle::save_stage(lot, record, Timestamp::now())
        })?;
        Ok(lot)
    }

    /// Validate and complete a stage. Completing the seventh stage archives
    /// the lot when `archive_on_complete` is set, in the same batch.
    pub fn advance_step(
        &mut self,
        id: RecordId,
        expected: Option<u64>,
        record: StageRecord,
        viewer: &Viewer,
    ) -> Result<AdvanceResult, TraceError> {
        let mut lot = self.visible_lot(id, viewer)?;
        check_expected(Collection::Lots, id, expected, lot.version)?;

        let now = Timestamp::now();
        let outcome = lifecycle::advance_step(&mut lot, record, now)?;

        if outcome.lot_completed && self.lifecycle.archive_on_complete {
            let (archived, deleted) = self.commit_archive(&mut lot, true, &viewer.user, now)?;
            return Ok(AdvanceResult {
                lot,
                outcome,
                archived: Some(archived),
                deleted,
            });
        }

        self.save(&mut lot)?;
        if outcome.lot_completed {
            tracing::info!(lot = %lot.lot_number, id = %lot.id, "lot completed");
        }
        Ok(AdvanceResult {
            lot,
            outcome,
            archived: None,
            deleted: false,
        })
    }

    /// Move the wizard to another stage.
    pub fn go_to_step(
        &mut self,
        id: RecordId,
        expected: Option<u64>,
        stage: Stage,
        viewer: &Viewer,
    ) -> Result<Lot, TraceError> {
        let (lot, ()) =
            self.update_lot(id, expected, viewer, |lot| lifecycle::go_to_step(lot, stage))?;
        Ok(lot)
    }

    /// Change a lot number.
    pub fn rename_lot(
        &mut self,
        id: RecordId,
        expected: Option<u64>,
        lot_number: &str,
        viewer: &Viewer,
    ) -> Result<Lot, TraceError> {
        let (lot, ()) = self.update_lot(id, expected, viewer, |lot| {
            lifecycle::set_lot_number(lot, lot_number, Timestamp::now())
        })?;
        Ok(lot)
    }

    /// Copy a working or archived lot as a new draft owned by the viewer.
    pub fn duplicate_lot(
        &mut self,
        id: RecordId,
        new_lot_number: Option<&str>,
        viewer: &Viewer,
    ) -> Result<Lot, TraceError> {
        let source = match self.visible_lot(id, viewer) {
            Ok(lot) => lot,
            Err(TraceError::NotFound { .. }) => self.get_archived(id, viewer)?.lot,
            Err(e) => return Err(e),
        };
        let mut copy =
            lifecycle::duplicate(&source, new_lot_number, viewer.user.clone(), Timestamp::now())?;
        self.save(&mut copy)?;
        tracing::debug!(source = %source.id, copy = %copy.id, "lot duplicated");
        Ok(copy)
    }

    /// Explicitly archive a completed lot.
    pub fn archive_lot(
        &mut self,
        id: RecordId,
        expected: Option<u64>,
        viewer: &Viewer,
    ) -> Result<ArchivedLot, TraceError> {
        let mut lot = self.visible_lot(id, viewer)?;
        check_expected(Collection::Lots, id, expected, lot.version)?;
        let (archived, _) = self.commit_archive(&mut lot, false, &viewer.user, Timestamp::now())?;
        Ok(archived)
    }

    /// Delete a working lot. Archive copies are kept.
    pub fn delete_lot(
        &mut self,
        id: RecordId,
        expected: Option<u64>,
        viewer: &Viewer,
    ) -> Result<(), TraceError> {
        let lot = self.visible_lot(id, viewer)?;
        check_expected(Collection::Lots, id, expected, lot.version)?;
        self.remove(&lot)?;
        tracing::debug!(lot = %lot.lot_number, id = %lot.id, "lot deleted");
        Ok(())
    }

    /// Archived lots visible to the viewer, most recently archived first.
    pub fn list_archive(&self, viewer: &Viewer) -> Result<Vec<ArchivedLot>, TraceError> {
        let mut archived: Vec<ArchivedLot> = self
            .load_all::<ArchivedLot>()?
            .into_iter()
            .filter(|a| viewer.can_see(&a.lot.owner, a.lot.visibility))
            .collect();
        archived.sort_by(|a, b| {
            b.archived_at
                .cmp(&a.archived_at)
                .then_with(|| a.lot.id.cmp(&b.lot.id))
        });
        Ok(archived)
    }

    /// Fetch an archived lot.
    pub fn get_archived(&self, id: RecordId, viewer: &Viewer) -> Result<ArchivedLot, TraceError> {
        match self.load::<ArchivedLot>(id)? {
            Some(a) if viewer.can_see(&a.lot.owner, a.lot.visibility) => Ok(a),
            _ => Err(TraceError::not_found(Collection::Archive, id)),
        }
    }

    /// Per-stage validity of a working lot.
    pub fn lot_validation(&self, id: RecordId, viewer: &Viewer) -> Result<Vec<StepCheck>, TraceError> {
        let lot = self.visible_lot(id, viewer)?;
        Ok(StepValidator::report(&lot))
    }

    /// Counts per status over everything the viewer can see.
    pub fn lot_summary(&self, viewer: &Viewer) -> Result<LotSummary, TraceError> {
        let lots = self.all_lots(viewer)?;
        let archive = self.list_archive(viewer)?;
        let archived_only = archive
            .iter()
            .filter(|a| !lots.iter().any(|l| l.id == a.id()))
            .count();

        let mut summary = LotSummary {
            total: lots.len() + archived_only,
            archived: archive.len(),
            ..LotSummary::default()
        };
        let mut percent_sum = 0usize;
        for lot in &lots {
            match lot.status {
                LotStatus::Draft => summary.draft += 1,
                LotStatus::InProgress => summary.in_progress += 1,
                LotStatus::Completed => summary.completed += 1,
                LotStatus::Archived => summary.archived += 1,
            }
            percent_sum += usize::from(completion_percent(lot.completed_steps.len()));
        }
        if !lots.is_empty() {
            summary.average_completion_percent =
                ((percent_sum * 2 + lots.len()) / (lots.len() * 2)) as u8;
        }
        Ok(summary)
    }

    // -------------------------------------------------------------------------
    // Personnel
    // -------------------------------------------------------------------------

    fn ensure_unique_document_number(
        &self,
        document_number: &str,
        except: Option<RecordId>,
    ) -> Result<(), TraceError> {
        let taken = self
            .load_all::<Employee>()?
            .iter()
            .any(|e| e.document_number == document_number && Some(e.id) != except);
        if taken {
            return Err(TraceError::InvalidInput(format!(
                "document number {document_number} is already registered"
            )));
        }
        Ok(())
    }

    /// Register a new employee.
    pub fn create_employee(&mut self, input: EmployeeInput) -> Result<Employee, TraceError> {
        let mut employee = Employee::new(input, Timestamp::now())?;
        self.ensure_unique_document_number(&employee.document_number, None)?;
        self.save(&mut employee)?;
        tracing::debug!(id = %employee.id, "employee created");
        Ok(employee)
    }

    pub fn get_employee(&self, id: RecordId) -> Result<Employee, TraceError> {
        self.require(id)
    }

    /// Apply a partial update to an employee.
    pub fn update_employee(
        &mut self,
        id: RecordId,
        expected: Option<u64>,
        update: EmployeeUpdate,
    ) -> Result<Employee, TraceError> {
        let mut employee: Employee = self.require(id)?;
        check_expected(Collection::Employees, id, expected, employee.version)?;
        employee.apply_update(update, Timestamp::now())?;
        self.ensure_unique_document_number(&employee.document_number, Some(id))?;
        self.save(&mut employee)?;
        Ok(employee)
    }

    /// Mark an employee inactive. Past shifts are kept for payroll.
    pub fn deactivate_employee(
        &mut self,
        id: RecordId,
        expected: Option<u64>,
    ) -> Result<Employee, TraceError> {
        let mut employee: Employee = self.require(id)?;
        check_expected(Collection::Employees, id, expected, employee.version)?;
        if !employee.active {
            return Ok(employee);
        }
        employee.active = false;
        employee.updated_at = Timestamp::now();
        self.save(&mut employee)?;
        tracing::debug!(id = %employee.id, "employee deactivated");
        Ok(employee)
    }

    /// Employees ordered by name.
    pub fn list_employees(&self, active_only: bool) -> Result<Vec<Employee>, TraceError> {
        let mut employees: Vec<Employee> = self
            .load_all::<Employee>()?
            .into_iter()
            .filter(|e| !active_only || e.active)
            .collect();
        employees.sort_by(|a, b| a.full_name.cmp(&b.full_name).then_with(|| a.id.cmp(&b.id)));
        Ok(employees)
    }

    /// Record a shift for an active employee.
    pub fn record_shift(&mut self, input: ShiftInput) -> Result<WorkShift, TraceError> {
        let employee: Employee = self.require(input.employee_id)?;
        if !employee.active {
            return Err(TraceError::InvalidInput(format!(
                "employee {} is inactive",
                employee.full_name
            )));
        }
        let mut shift = WorkShift::new(input, Timestamp::now())?;
        self.save(&mut shift)?;
        Ok(shift)
    }

    /// Shifts ordered by date and start time, optionally filtered.
    pub fn list_shifts(
        &self,
        employee_id: Option<RecordId>,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<WorkShift>, TraceError> {
        let mut shifts: Vec<WorkShift> = self
            .load_all::<WorkShift>()?
            .into_iter()
            .filter(|s| employee_id.is_none_or(|e| s.employee_id == e))
            .filter(|s| from.is_none_or(|f| s.date >= f))
            .filter(|s| to.is_none_or(|t| s.date <= t))
            .collect();
        shifts.sort_by(|a, b| {
            (a.date, a.start, a.id).cmp(&(b.date, b.start, b.id))
        });
        Ok(shifts)
    }

    pub fn delete_shift(&mut self, id: RecordId, expected: Option<u64>) -> Result<(), TraceError> {
        let shift: WorkShift = self.require(id)?;
        check_expected(Collection::Shifts, id, expected, shift.version)?;
        self.remove(&shift)
    }

    /// Pay for every employee with at least one shift in `[from, to]`,
    /// ordered by name.
    pub fn payroll(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<PayrollSummary>, TraceError> {
        let shifts = self.list_shifts(None, Some(from), Some(to))?;
        let mut out = Vec::new();
        for employee in self.list_employees(false)? {
            if !shifts.iter().any(|s| s.employee_id == employee.id) {
                continue;
            }
            out.push(compute_payroll(&employee, &shifts, from, to, &self.payroll)?);
        }
        Ok(out)
    }

    // -------------------------------------------------------------------------
    // Quality control
    // -------------------------------------------------------------------------

    /// Record an inspection. A referenced lot must exist and be visible;
    /// its number fills an empty `lot_number`.
    pub fn record_inspection(
        &mut self,
        mut input: InspectionInput,
        viewer: &Viewer,
    ) -> Result<QualityInspection, TraceError> {
        if let Some(lot_id) = input.lot_id {
            let number = self.visible_lot_number(lot_id, viewer)?;
            if input.lot_number.trim().is_empty() {
                input.lot_number = number;
            }
        }
        let mut inspection = QualityInspection::new(input, &self.quality, Timestamp::now())?;
        self.save(&mut inspection)?;
        tracing::debug!(
            id = %inspection.id,
            lot = %inspection.lot_number,
            verdict = %inspection.verdict,
            "inspection recorded"
        );
        Ok(inspection)
    }

    pub fn get_inspection(&self, id: RecordId, viewer: &Viewer) -> Result<QualityInspection, TraceError> {
        let inspection: QualityInspection = self.require(id)?;
        if !self.attachment_visible(inspection.lot_id, viewer)? {
            return Err(TraceError::not_found(Collection::Inspections, id));
        }
        Ok(inspection)
    }

    /// Inspections, newest first, optionally for one lot.
    pub fn list_inspections(
        &self,
        lot_id: Option<RecordId>,
        viewer: &Viewer,
    ) -> Result<Vec<QualityInspection>, TraceError> {
        let mut out = Vec::new();
        for inspection in self.load_all::<QualityInspection>()? {
            if lot_id.is_some_and(|id| inspection.lot_id != Some(id)) {
                continue;
            }
            if self.attachment_visible(inspection.lot_id, viewer)? {
                out.push(inspection);
            }
        }
        out.sort_by(|a, b| {
            (b.inspected_on, b.created_at, b.id).cmp(&(a.inspected_on, a.created_at, a.id))
        });
        Ok(out)
    }

    // -------------------------------------------------------------------------
    // Documents
    // -------------------------------------------------------------------------

    /// Store a file and its metadata. If the metadata cannot be saved the
    /// blob is removed again.
    pub fn attach_document(
        &mut self,
        lot_id: Option<RecordId>,
        file_name: &str,
        content_type: &str,
        content: &[u8],
        viewer: &Viewer,
    ) -> Result<DocumentRecord, TraceError> {
        if let Some(id) = lot_id {
            self.visible_lot_number(id, viewer)?;
        }
        let mut record = DocumentRecord::new(
            lot_id,
            file_name,
            content_type,
            content.len(),
            viewer.user.clone(),
            Timestamp::now(),
        )?;

        self.blobs.put(&record.blob_key, content)?;
        if let Err(e) = self.save(&mut record) {
            if let Err(cleanup) = self.blobs.delete(&record.blob_key) {
                tracing::warn!(key = %record.blob_key, error = %cleanup, "orphaned blob after failed attach");
            }
            return Err(e);
        }
        tracing::debug!(id = %record.id, file = %record.file_name, bytes = record.size_bytes, "document attached");
        Ok(record)
    }

    pub fn get_document(&self, id: RecordId, viewer: &Viewer) -> Result<DocumentRecord, TraceError> {
        let record: DocumentRecord = self.require(id)?;
        if !self.attachment_visible(record.lot_id, viewer)? {
            return Err(TraceError::not_found(Collection::Documents, id));
        }
        Ok(record)
    }

    /// Metadata and bytes of a document.
    pub fn document_content(
        &self,
        id: RecordId,
        viewer: &Viewer,
    ) -> Result<(DocumentRecord, Vec<u8>), TraceError> {
        let record = self.get_document(id, viewer)?;
        let bytes = self.blobs.get(&record.blob_key)?.ok_or_else(|| {
            TraceError::IoError(format!("content of document {id} is missing"))
        })?;
        Ok((record, bytes))
    }

    /// Documents, newest first, optionally for one lot.
    pub fn list_documents(
        &self,
        lot_id: Option<RecordId>,
        viewer: &Viewer,
    ) -> Result<Vec<DocumentRecord>, TraceError> {
        let mut out = Vec::new();
        for record in self.load_all::<DocumentRecord>()? {
            if lot_id.is_some_and(|id| record.lot_id != Some(id)) {
                continue;
            }
            if self.attachment_visible(record.lot_id, viewer)? {
                out.push(record);
            }
        }
        out.sort_by(|a, b| (b.uploaded_at, b.id).cmp(&(a.uploaded_at, a.id)));
        Ok(out)
    }

    /// Remove metadata, then the blob.
    pub fn delete_document(
        &mut self,
        id: RecordId,
        expected: Option<u64>,
        viewer: &Viewer,
    ) -> Result<(), TraceError> {
        let record = self.get_document(id, viewer)?;
        check_expected(Collection::Documents, id, expected, record.version)?;
        self.remove(&record)?;
        if let Err(e) = self.blobs.delete(&record.blob_key) {
            tracing::warn!(key = %record.blob_key, error = %e, "failed to delete document content");
        }
        Ok(())
    }

    /// The store holding document contents.
    pub fn blob_store(&self) -> &dyn BlobStore {
        self.blobs.as_ref()
    }

    /// Copy document contents between this ledger and `remote` so every
    /// document record known here has its bytes on both sides. Local
    /// contents no record refers to are removed.
    ///
    /// A document whose content cannot be copied counts as failed; the
    /// others carry on.
    pub fn sync_document_content(
        &self,
        remote: &dyn BlobStore,
        report: &mut SyncReport,
    ) -> Result<(), TraceError> {
        let records = self.load_all::<DocumentRecord>()?;
        for record in &records {
            match reconcile_blob(self.blobs.as_ref(), remote, &record.blob_key) {
                Ok(Some(BlobTransfer::Uploaded)) => report.content_pushed += 1,
                Ok(Some(BlobTransfer::Downloaded)) => report.content_pulled += 1,
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(id = %record.id, key = %record.blob_key, error = %e, "document content not synced");
                    report.failed += 1;
                }
            }
        }

        for key in self.blobs.list("documents/")? {
            if !records.iter().any(|r| r.blob_key == key) && self.blobs.delete(&key)? {
                report.content_removed += 1;
            }
        }
        tracing::info!(
            pushed = report.content_pushed,
            pulled = report.content_pulled,
            removed = report.content_removed,
            "document content synced"
        );
        Ok(())
    }

    /// Apply a batch received from another tier. Contents of documents
    /// deleted by the batch are removed once it is committed.
    pub fn commit_replicated(&mut self, ops: &[WriteOp]) -> Result<Vec<u64>, TraceError> {
        let deleted = ops.iter().filter_map(|op| match op {
            WriteOp::Delete {
                collection: Collection::Documents,
                id,
                ..
            } => Some(*id),
            _ => None,
        });
        let mut dropped = Vec::new();
        for id in deleted {
            if let Some(record) = self.load::<DocumentRecord>(id)? {
                dropped.push(record.blob_key);
            }
        }

        let versions = self.store.commit(ops)?;
        for key in dropped {
            if let Err(e) = self.blobs.delete(&key) {
                tracing::warn!(%key, error = %e, "failed to delete replicated document content");
            }
        }
        Ok(versions)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::records::{HarvestRecord, TransportRecord};
    use crate::storage::MemoryStore;

    fn viewer(name: &str) -> Viewer {
        Viewer::user(UserId::new(name).expect("valid"))
    }

    fn ledger() -> Ledger<MemoryStore> {
        Ledger::new(MemoryStore::new())
    }

    fn harvest() -> StageRecord {
        StageRecord::Harvest(HarvestRecord {
            harvest_date: "2026-03-01".to_string(),
            farmer_id: "F-7".to_string(),
            ..HarvestRecord::default()
        })
    }

    #[test]
    fn create_and_fetch() {
        let mut ledger = ledger();
        let ana = viewer("ana");
        let lot = ledger
            .create_lot("L-1", Visibility::Global, &ana)
            .expect("create");
        assert_eq!(lot.version, 1);
        let fetched = ledger.get_lot(lot.id, &ana).expect("get");
        assert_eq!(fetched, lot);
    }

    #[test]
    fn restricted_lot_hidden_from_others() {
        let mut ledger = ledger();
        let ana = viewer("ana");
        let luis = viewer("luis");
        let lot = ledger
            .create_lot("L-1", Visibility::Restricted, &ana)
            .expect("create");

        assert!(matches!(
            ledger.get_lot(lot.id, &luis),
            Err(TraceError::NotFound { .. })
        ));
        assert!(
            ledger
                .list_lots(&LotQuery::default(), &luis)
                .expect("list")
                .is_empty()
        );
        let admin = Viewer::admin(UserId::new("root").expect("valid"));
        assert!(ledger.get_lot(lot.id, &admin).is_ok());
    }

    #[test]
    fn stale_version_rejected() {
        let mut ledger = ledger();
        let ana = viewer("ana");
        let lot = ledger
            .create_lot("L-1", Visibility::Global, &ana)
            .expect("create");
        ledger
            .save_stage(lot.id, Some(1), harvest(), &ana)
            .expect("save");

        let err = ledger
            .rename_lot(lot.id, Some(1), "L-2", &ana)
            .expect_err("stale");
        assert!(matches!(
            err,
            TraceError::VersionConflict {
                expected: Some(1),
                found: Some(2),
                ..
            }
        ));
        assert_eq!(ledger.get_lot(lot.id, &ana).expect("get").lot_number, "L-1");
    }

    #[test]
    fn failed_advance_writes_nothing() {
        let mut ledger = ledger();
        let ana = viewer("ana");
        let lot = ledger
            .create_lot("L-1", Visibility::Global, &ana)
            .expect("create");
        let before = ledger
            .store()
            .get(Collection::Lots, lot.id)
            .expect("get");

        let result = ledger.advance_step(
            lot.id,
            None,
            StageRecord::Transport(TransportRecord::default()),
            &ana,
        );
        assert!(result.is_err());
        assert_eq!(
            ledger.store().get(Collection::Lots, lot.id).expect("get"),
            before
        );
    }

    #[test]
    fn duplicate_is_owned_by_caller() {
        let mut ledger = ledger();
        let ana = viewer("ana");
        let luis = viewer("luis");
        let lot = ledger
            .create_lot("L-1", Visibility::Global, &ana)
            .expect("create");
        ledger
            .advance_step(lot.id, None, harvest(), &ana)
            .expect("advance");

        let copy = ledger.duplicate_lot(lot.id, None, &luis).expect("dup");
        assert_eq!(copy.owner.as_str(), "luis");
        assert_eq!(copy.status, LotStatus::Draft);
        assert_eq!(copy.stages.harvest.farmer_id, "F-7");
        assert_eq!(ledger.store().count(Collection::Lots).expect("count"), 2);
    }

    #[test]
    fn employees_and_shifts() {
        let mut ledger = ledger();
        let emp = ledger
            .create_employee(EmployeeInput {
                full_name: "Rosa".to_string(),
                document_number: "123".to_string(),
                role: String::new(),
                hourly_rate_cents: 1000,
            })
            .expect("create");

        let dup = ledger.create_employee(EmployeeInput {
            full_name: "Other".to_string(),
            document_number: "123".to_string(),
            role: String::new(),
            hourly_rate_cents: 1000,
        });
        assert!(matches!(dup, Err(TraceError::InvalidInput(_))));

        let date = NaiveDate::from_ymd_opt(2026, 3, 2).expect("date");
        ledger
            .record_shift(ShiftInput {
                employee_id: emp.id,
                date,
                start: chrono::NaiveTime::from_hms_opt(8, 0, 0).expect("time"),
                end: chrono::NaiveTime::from_hms_opt(12, 0, 0).expect("time"),
                break_minutes: 0,
                notes: String::new(),
            })
            .expect("shift");

        let payroll = ledger.payroll(date, date).expect("payroll");
        assert_eq!(payroll.len(), 1);
        assert_eq!(payroll[0].gross_pay_cents, 4000);

        ledger.deactivate_employee(emp.id, None).expect("deactivate");
        assert!(ledger.list_employees(true).expect("list").is_empty());
        assert!(
            ledger
                .record_shift(ShiftInput {
                    employee_id: emp.id,
                    date,
                    start: chrono::NaiveTime::from_hms_opt(8, 0, 0).expect("time"),
                    end: chrono::NaiveTime::from_hms_opt(9, 0, 0).expect("time"),
                    break_minutes: 0,
                    notes: String::new(),
                })
                .is_err()
        );
    }

    #[test]
    fn documents_follow_lot_visibility() {
        let mut ledger = ledger();
        let ana = viewer("ana");
        let luis = viewer("luis");
        let lot = ledger
            .create_lot("L-1", Visibility::Restricted, &ana)
            .expect("create");

        assert!(
            ledger
                .attach_document(Some(lot.id), "cert.pdf", "application/pdf", b"%PDF", &luis)
                .is_err()
        );
        let doc = ledger
            .attach_document(Some(lot.id), "cert.pdf", "application/pdf", b"%PDF", &ana)
            .expect("attach");

        let (meta, bytes) = ledger.document_content(doc.id, &ana).expect("content");
        assert_eq!(meta.file_name, "cert.pdf");
        assert_eq!(bytes, b"%PDF");
        assert!(ledger.get_document(doc.id, &luis).is_err());
        assert!(ledger.list_documents(None, &luis).expect("list").is_empty());

        ledger.delete_document(doc.id, None, &ana).expect("delete");
        assert!(ledger.list_documents(None, &ana).expect("list").is_empty());
    }

    #[test]
    fn inspection_takes_lot_number() {
        let mut ledger = ledger();
        let ana = viewer("ana");
        let lot = ledger
            .create_lot("L-77", Visibility::Global, &ana)
            .expect("create");
        let inspection = ledger
            .record_inspection(
                InspectionInput {
                    lot_id: Some(lot.id),
                    lot_number: String::new(),
                    inspected_on: NaiveDate::from_ymd_opt(2026, 3, 2).expect("date"),
                    inspector: "QC".to_string(),
                    sample_size: 100,
                    defects: Default::default(),
                    dry_matter_permille: Some(230),
                    notes: String::new(),
                },
                &ana,
            )
            .expect("inspection");
        assert_eq!(inspection.lot_number, "L-77");
        assert_eq!(
            ledger
                .list_inspections(Some(lot.id), &ana)
                .expect("list")
                .len(),
            1
        );
    }
}
