//! # Quality Control
//!
//! Inspections of a fruit sample. The verdict is computed, never entered:
//! the defect rate (per mille of the sample) and the dry matter content are
//! compared against a [`QualityPolicy`].

use crate::primitives::{MAX_FIELD_LENGTH, MAX_LOT_NUMBER_LENGTH};
use crate::types::{RecordId, Timestamp, TraceError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kinds of defects counted during an inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefectKind {
    Bruising,
    Sunburn,
    Scab,
    InsectDamage,
    MechanicalDamage,
    Rot,
    Other,
}

/// Inspection outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approved,
    Rejected,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Approved => f.write_str("approved"),
            Verdict::Rejected => f.write_str("rejected"),
        }
    }
}

/// Acceptance thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityPolicy {
    /// Highest acceptable defect rate, per mille of the sample.
    pub max_defect_permille: u32,
    /// Lowest acceptable dry matter content, per mille.
    pub min_dry_matter_permille: u32,
}

impl Default for QualityPolicy {
    fn default() -> Self {
        Self {
            max_defect_permille: 50,
            min_dry_matter_permille: 210,
        }
    }
}

/// A stored inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityInspection {
    pub id: RecordId,
    pub lot_id: Option<RecordId>,
    pub lot_number: String,
    pub inspected_on: NaiveDate,
    pub inspector: String,
    pub sample_size: u32,
    pub defects: BTreeMap<DefectKind, u32>,
    pub dry_matter_permille: Option<u32>,
    pub notes: String,
    pub defect_permille: u32,
    pub verdict: Verdict,
    pub created_at: Timestamp,
    pub version: u64,
}

/// Fields supplied when recording an inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionInput {
    #[serde(default)]
    pub lot_id: Option<RecordId>,
    /// May be left empty when `lot_id` is set; the lot's number is used.
    #[serde(default)]
    pub lot_number: String,
    pub inspected_on: NaiveDate,
    pub inspector: String,
    pub sample_size: u32,
    #[serde(default)]
    pub defects: BTreeMap<DefectKind, u32>,
    #[serde(default)]
    pub dry_matter_permille: Option<u32>,
    #[serde(default)]
    pub notes: String,
}

/// Defect rate and verdict for a sample.
pub fn assess(
    sample_size: u32,
    defects: &BTreeMap<DefectKind, u32>,
    dry_matter_permille: Option<u32>,
    policy: &QualityPolicy,
) -> Result<(u32, Verdict), TraceError> {
    if sample_size == 0 {
        return Err(TraceError::InvalidInput(
            "sample_size must be greater than zero".to_string(),
        ));
    }
    let total: u64 = defects.values().map(|&n| u64::from(n)).sum();
    if total > u64::from(sample_size) {
        return Err(TraceError::InvalidInput(format!(
            "{total} defects counted in a sample of {sample_size}"
        )));
    }
    if dry_matter_permille.is_some_and(|dm| dm > 1000) {
        return Err(TraceError::InvalidInput(
            "dry_matter_permille must be at most 1000".to_string(),
        ));
    }

    let permille = (total * 1000 / u64::from(sample_size)) as u32;
    let too_many_defects = permille > policy.max_defect_permille;
    let too_dry = dry_matter_permille.is_some_and(|dm| dm < policy.min_dry_matter_permille);

    let verdict = if too_many_defects || too_dry {
        Verdict::Rejected
    } else {
        Verdict::Approved
    };
    Ok((permille, verdict))
}

impl QualityInspection {
    /// Validate, assess and build an inspection (unsaved).
    pub fn new(
        input: InspectionInput,
        policy: &QualityPolicy,
        now: Timestamp,
    ) -> Result<Self, TraceError> {
        let lot_number = input.lot_number.trim().to_string();
        if lot_number.is_empty() {
            return Err(TraceError::InvalidInput("lot_number is required".to_string()));
        }
        if lot_number.len() > MAX_LOT_NUMBER_LENGTH {
            return Err(TraceError::InvalidInput(format!(
                "lot number length {} exceeds maximum {}",
                lot_number.len(),
                MAX_LOT_NUMBER_LENGTH
            )));
        }
        let inspector = input.inspector.trim().to_string();
        if inspector.is_empty() {
            return Err(TraceError::InvalidInput("inspector is required".to_string()));
        }
        if inspector.len() > MAX_FIELD_LENGTH || input.notes.len() > MAX_FIELD_LENGTH {
            return Err(TraceError::InvalidInput(format!(
                "inspection text exceeds maximum length {MAX_FIELD_LENGTH}"
            )));
        }

        let (defect_permille, verdict) = assess(
            input.sample_size,
            &input.defects,
            input.dry_matter_permille,
            policy,
        )?;

        Ok(Self {
            id: RecordId::generate(),
            lot_id: input.lot_id,
            lot_number,
            inspected_on: input.inspected_on,
            inspector,
            sample_size: input.sample_size,
            // Zero counts carry no information.
            defects: input.defects.into_iter().filter(|(_, n)| *n > 0).collect(),
            dry_matter_permille: input.dry_matter_permille,
            notes: input.notes,
            defect_permille,
            verdict,
            created_at: now,
            version: 0,
        })
    }

    /// Total number of defective fruits in the sample.
    #[must_use]
    pub fn total_defects(&self) -> u64 {
        self.defects.values().map(|&n| u64::from(n)).sum()
    }
}

// =============================================================================
// TESTS
// =============================================================================
