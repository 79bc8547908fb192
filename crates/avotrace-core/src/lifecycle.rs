//! # Lot Lifecycle
//!
//! Pure draft/complete transitions on a [`Lot`]. Nothing here touches
//! storage; the [`Ledger`](crate::Ledger) loads a lot, applies one of these
//! functions and commits the result.
//!
//! Every function either succeeds and mutates the lot, or fails and leaves
//! it exactly as it was.
//!
//! ```text
//! draft ──advance──▶ in_progress ──advance (7th)──▶ completed ──archive──▶ archived
//!   ▲                                                   │
//!   └──────────────────── duplicate ◀───────────────────┘
//! ```

use crate::lot::{ArchivedLot, Lot, LotStatus};
use crate::primitives::{DUPLICATE_SUFFIX, MAX_LOT_NUMBER_LENGTH};
use crate::records::{LotStages, StageRecord};
use crate::stage::Stage;
use crate::types::{RecordId, Timestamp, TraceError, UserId, Visibility};
use crate::validator::StepValidator;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// =============================================================================
// CONFIGURATION
// =============================================================================

/// What happens when the last stage of a lot is completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Copy the lot to the archive as soon as it completes.
    pub archive_on_complete: bool,
    /// Remove the working copy after archiving it.
    pub delete_after_archive: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            archive_on_complete: true,
            delete_after_archive: false,
        }
    }
}

/// Result of a successful [`advance_step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvanceOutcome {
    /// The stage that was validated.
    pub stage: Stage,
    /// False when the stage had already been completed before.
    pub newly_completed: bool,
    /// True when this call completed the seventh stage.
    pub lot_completed: bool,
}

// =============================================================================
// TRANSITIONS
// =============================================================================

/// Create a new unsaved draft.
///
/// An empty lot number is allowed here; it blocks completion of the
/// harvest stage instead.
pub fn create_draft(
    lot_number: &str,
    owner: UserId,
    visibility: Visibility,
    now: Timestamp,
) -> Result<Lot, TraceError> {
    let lot_number = lot_number.trim();
    check_lot_number_length(lot_number)?;

    Ok(Lot {
        id: RecordId::generate(),
        lot_number: lot_number.to_string(),
        current_step: Stage::Harvest,
        completed_steps: BTreeSet::new(),
        status: LotStatus::Draft,
        stages: LotStages::default(),
        owner,
        visibility,
        created_at: now,
        updated_at: now,
        version: 0,
    })
}

/// Merge a stage record without completing the stage (draft save).
pub fn save_stage(lot: &mut Lot, record: StageRecord, now: Timestamp) -> Result<(), TraceError> {
    record.check_limits()?;
    let stage = record.stage();
    ensure_reachable(lot, stage)?;

    // A completed stage must keep satisfying its predicate.
    if lot.completed_steps.contains(&stage) {
        let missing = StepValidator::validate_record(&lot.lot_number, &record);
        if !missing.is_empty() {
            return Err(TraceError::StepIncomplete { stage, missing });
        }
    }

    lot.stages.set(record);
    lot.current_step = stage;
    lot.updated_at = now;
    Ok(())
}

/// Validate a stage record and, if complete, mark the stage done.
pub fn advance_step(
    lot: &mut Lot,
    record: StageRecord,
    now: Timestamp,
) -> Result<AdvanceOutcome, TraceError> {
    record.check_limits()?;
    let stage = record.stage();
    ensure_reachable(lot, stage)?;

    let missing = StepValidator::validate_record(&lot.lot_number, &record);
    if !missing.is_empty() {
        return Err(TraceError::StepIncomplete { stage, missing });
    }

    let was_complete = lot.is_complete();
    lot.stages.set(record);
    let newly_completed = lot.completed_steps.insert(stage);
    lot.current_step = lot.furthest_reachable();
    lot.refresh_status();
    lot.updated_at = now;

    Ok(AdvanceOutcome {
        stage,
        newly_completed,
        lot_completed: !was_complete && lot.is_complete(),
    })
}

/// Move the wizard to `stage` without changing any data.
pub fn go_to_step(lot: &mut Lot, stage: Stage) -> Result<(), TraceError> {
    ensure_reachable(lot, stage)?;
    lot.current_step = stage;
    Ok(())
}

/// Rename a lot.
pub fn set_lot_number(lot: &mut Lot, number: &str, now: Timestamp) -> Result<(), TraceError> {
    let number = number.trim();
    if number.is_empty() {
        return Err(TraceError::InvalidInput("lot number is empty".to_string()));
    }
    check_lot_number_length(number)?;
    lot.lot_number = number.to_string();
    lot.updated_at = now;
    Ok(())
}

/// Copy a lot as a fresh draft with the same stage data.
///
/// Without `new_lot_number` the copy is named `<source>-COPY`.
pub fn duplicate(
    lot: &Lot,
    new_lot_number: Option<&str>,
    owner: UserId,
    now: Timestamp,
) -> Result<Lot, TraceError> {
    let number = match new_lot_number.map(str::trim) {
        Some(n) if !n.is_empty() => n.to_string(),
        _ => format!("{}{}", lot.lot_number, DUPLICATE_SUFFIX),
    };
    let mut copy = create_draft(&number, owner, lot.visibility, now)?;
    copy.stages = lot.stages.clone();
    Ok(copy)
}

/// Freeze a completed lot into an archive copy.
pub fn archive(lot: &Lot, by: UserId, now: Timestamp) -> Result<ArchivedLot, TraceError> {
    if !lot.is_complete() {
        return Err(TraceError::InvalidTransition(format!(
            "lot {} is {} ({}%), only completed lots can be archived",
            lot.lot_number,
            lot.status,
            lot.completion_percent()
        )));
    }
    let mut frozen = lot.clone();
    frozen.status = LotStatus::Archived;
    Ok(ArchivedLot {
        lot: frozen,
        archived_at: now,
        archived_by: by,
    })
}

// =============================================================================
// HELPERS
// =============================================================================

fn ensure_reachable(lot: &Lot, stage: Stage) -> Result<(), TraceError> {
    let furthest = lot.furthest_reachable();
    if stage > furthest {
        return Err(TraceError::InvalidTransition(format!(
            "cannot open {} before {} is completed",
            stage, furthest
        )));
    }
    Ok(())
}

fn check_lot_number_length(number: &str) -> Result<(), TraceError> {
    if number.len() > MAX_LOT_NUMBER_LENGTH {
        return Err(TraceError::InvalidInput(format!(
            "lot number length {} exceeds maximum {}",
            number.len(),
            MAX_LOT_NUMBER_LENGTH
        )));
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
