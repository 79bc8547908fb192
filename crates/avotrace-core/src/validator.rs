//! # Step Validator
//!
//! Per-stage completeness predicates. Pure and deterministic: the result
//! depends only on the lot's own fields. There are no cross-stage rules
//! (date ordering, weight balance) and no numeric range checks.

use crate::lot::Lot;
use crate::primitives::STAGE_COUNT;
use crate::records::{Field, StageRecord};
use crate::stage::Stage;
use serde::Serialize;

/// Validity of one stage of a lot, as shown by the wizard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepCheck {
    pub stage: Stage,
    pub number: u8,
    pub completed: bool,
    pub valid: bool,
    pub missing: Vec<&'static str>,
}

/// Stateless namespace for the step predicates.
pub struct StepValidator;

impl StepValidator {
    /// Required fields of `stage` that are empty on `lot`, in form order.
    #[must_use]
    pub fn missing_fields(lot: &Lot, stage: Stage) -> Vec<&'static str> {
        collect_missing(&lot.lot_number, stage, &lot.stages.fields(stage))
    }

    /// Required fields missing from a record that has not been merged yet.
    ///
    /// The harvest stage also requires the lot number, which is passed in
    /// separately because it lives on the lot.
    #[must_use]
    pub fn validate_record(lot_number: &str, record: &StageRecord) -> Vec<&'static str> {
        collect_missing(lot_number, record.stage(), &record.fields())
    }

    /// Whether every required field of `stage` is present.
    #[must_use]
    pub fn is_step_valid(lot: &Lot, stage: Stage) -> bool {
        Self::missing_fields(lot, stage).is_empty()
    }

    /// Validity of every stage, in order.
    #[must_use]
    pub fn step_validity(lot: &Lot) -> [(Stage, bool); STAGE_COUNT] {
        Stage::ALL.map(|stage| (stage, Self::is_step_valid(lot, stage)))
    }

    /// Full per-stage report: completion flag, validity and missing fields.
    #[must_use]
    pub fn report(lot: &Lot) -> Vec<StepCheck> {
        Stage::ALL
            .iter()
            .map(|&stage| {
                let missing = Self::missing_fields(lot, stage);
                StepCheck {
                    stage,
                    number: stage.number(),
                    completed: lot.completed_steps.contains(&stage),
                    valid: missing.is_empty(),
                    missing,
                }
            })
            .collect()
    }
}

fn collect_missing(lot_number: &str, stage: Stage, fields: &[Field<'_>]) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if stage == Stage::Harvest && lot_number.trim().is_empty() {
        missing.push("lot_number");
    }
    missing.extend(
        fields
            .iter()
            .filter(|f| f.required && !f.value.is_present())
            .map(|f| f.name),
    );
    missing
}

// =============================================================================
// TESTS
// =============================================================================
