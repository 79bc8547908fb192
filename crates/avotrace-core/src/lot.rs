//! # Lots
//!
//! A lot is a batch of produce tracked through the seven handling stages.
//! Its status is never set by hand: it is derived from the completed set.

use crate::primitives::STAGE_COUNT;
use crate::records::LotStages;
use crate::stage::Stage;
use crate::types::{RecordId, Timestamp, UserId, Visibility};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

// =============================================================================
// STATUS
// =============================================================================

/// Lifecycle state of a lot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LotStatus {
    Draft,
    InProgress,
    Completed,
    Archived,
}

impl LotStatus {
    /// Status of a working lot with `completed` stages done.
    #[must_use]
    pub const fn from_completed_count(completed: usize) -> Self {
        if completed == 0 {
            LotStatus::Draft
        } else if completed < STAGE_COUNT {
            LotStatus::InProgress
        } else {
            LotStatus::Completed
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            LotStatus::Draft => "draft",
            LotStatus::InProgress => "in_progress",
            LotStatus::Completed => "completed",
            LotStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for LotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LotStatus {
    type Err = crate::types::TraceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(LotStatus::Draft),
            "in_progress" => Ok(LotStatus::InProgress),
            "completed" => Ok(LotStatus::Completed),
            "archived" => Ok(LotStatus::Archived),
            _ => Err(crate::types::TraceError::InvalidInput(format!(
                "unknown lot status: {s:?}"
            ))),
        }
    }
}

/// Percentage of stages completed, rounded half-up, integer arithmetic only.
///
/// `completed` is clamped to the stage count.
#[must_use]
pub const fn completion_percent(completed: usize) -> u8 {
    let count = if completed > STAGE_COUNT {
        STAGE_COUNT
    } else {
        completed
    };
    ((count * 200 + STAGE_COUNT) / (2 * STAGE_COUNT)) as u8
}

// =============================================================================
// LOT
// =============================================================================

/// A working lot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lot {
    pub id: RecordId,
    pub lot_number: String,
    pub current_step: Stage,
    pub completed_steps: BTreeSet<Stage>,
    pub status: LotStatus,
    pub stages: LotStages,
    pub owner: UserId,
    pub visibility: Visibility,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// Storage version this copy was read at (0 = never saved).
    pub version: u64,
}

impl Lot {
    /// Percentage of the seven stages completed.
    #[must_use]
    pub fn completion_percent(&self) -> u8 {
        completion_percent(self.completed_steps.len())
    }

    /// The first stage not yet completed, or `None` when all are done.
    #[must_use]
    pub fn first_incomplete(&self) -> Option<Stage> {
        Stage::ALL
            .into_iter()
            .find(|s| !self.completed_steps.contains(s))
    }

    /// Furthest stage the wizard may open: the first incomplete one, or
    /// Delivery once everything is done.
    #[must_use]
    pub fn furthest_reachable(&self) -> Stage {
        self.first_incomplete().unwrap_or(Stage::Delivery)
    }

    /// Whether all seven stages are completed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.completed_steps.len() == STAGE_COUNT
    }

    /// Recompute `status` from the completed set.
    pub fn refresh_status(&mut self) {
        self.status = LotStatus::from_completed_count(self.completed_steps.len());
    }
}

// =============================================================================
// ARCHIVE
// =============================================================================

/// A frozen copy of a completed lot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedLot {
    /// The lot as it was when archived, with status `archived`.
    pub lot: Lot,
    pub archived_at: Timestamp,
    pub archived_by: UserId,
}

impl ArchivedLot {
    #[must_use]
    pub fn id(&self) -> RecordId {
        self.lot.id
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_table() {
        let expected = [0, 14, 29, 43, 57, 71, 86, 100];
        for (count, pct) in expected.iter().enumerate() {
            assert_eq!(completion_percent(count), *pct, "count {count}");
        }
    }

    #[test]
    fn percent_clamps_above_stage_count() {
        assert_eq!(completion_percent(12), 100);
    }

    #[test]
    fn status_from_count() {
        assert_eq!(LotStatus::from_completed_count(0), LotStatus::Draft);
        assert_eq!(LotStatus::from_completed_count(1), LotStatus::InProgress);
        assert_eq!(LotStatus::from_completed_count(6), LotStatus::InProgress);
        assert_eq!(LotStatus::from_completed_count(7), LotStatus::Completed);
    }

    #[test]
    fn status_parses_back() {
        for status in [
            LotStatus::Draft,
            LotStatus::InProgress,
            LotStatus::Completed,
            LotStatus::Archived,
        ] {
            assert_eq!(status.as_str().parse::<LotStatus>().expect("parse"), status);
        }
    }
}
