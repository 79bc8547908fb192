//! # Handling Stages
//!
//! The seven fixed steps every lot moves through, in order:
//!
//! | # | Stage | Required before |
//! |---|-------|-----------------|
//! | 1 | Harvest | Transport |
//! | 2 | Transport | Sorting |
//! | 3 | Sorting | Packaging |
//! | 4 | Packaging | Storage |
//! | 5 | Storage | Export |
//! | 6 | Export | Delivery |
//! | 7 | Delivery | (terminal) |
//!
//! Stage numbers are 1-based because that is how operators and paper
//! forms refer to them.

use crate::types::TraceError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// =============================================================================
// STAGE ENUM
// =============================================================================

/// One of the seven handling steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Harvest,
    Transport,
    Sorting,
    Packaging,
    Storage,
    Export,
    Delivery,
}

impl Stage {
    /// All stages in handling order.
    pub const ALL: [Stage; 7] = [
        Stage::Harvest,
        Stage::Transport,
        Stage::Sorting,
        Stage::Packaging,
        Stage::Storage,
        Stage::Export,
        Stage::Delivery,
    ];

    /// The 1-based stage number.
    #[must_use]
    pub const fn number(&self) -> u8 {
        match self {
            Stage::Harvest => 1,
            Stage::Transport => 2,
            Stage::Sorting => 3,
            Stage::Packaging => 4,
            Stage::Storage => 5,
            Stage::Export => 6,
            Stage::Delivery => 7,
        }
    }

    /// Look a stage up by its 1-based number.
    #[must_use]
    pub const fn from_number(n: u8) -> Option<Stage> {
        match n {
            1 => Some(Stage::Harvest),
            2 => Some(Stage::Transport),
            3 => Some(Stage::Sorting),
            4 => Some(Stage::Packaging),
            5 => Some(Stage::Storage),
            6 => Some(Stage::Export),
            7 => Some(Stage::Delivery),
            _ => None,
        }
    }

    /// Get the stage name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Stage::Harvest => "harvest",
            Stage::Transport => "transport",
            Stage::Sorting => "sorting",
            Stage::Packaging => "packaging",
            Stage::Storage => "storage",
            Stage::Export => "export",
            Stage::Delivery => "delivery",
        }
    }

    /// Get the next stage, if any.
    #[must_use]
    pub const fn next(&self) -> Option<Stage> {
        Stage::from_number(self.number() + 1)
    }

    /// Get the previous stage, if any.
    #[must_use]
    pub const fn previous(&self) -> Option<Stage> {
        Stage::from_number(self.number() - 1)
    }

    /// Check if this stage is terminal (Delivery).
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Stage::Delivery)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Stage {
    type Err = TraceError;

    /// Accepts either the name (`"sorting"`) or the number (`"3"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(n) = s.parse::<u8>() {
            return Stage::from_number(n)
                .ok_or_else(|| TraceError::InvalidInput(format!("stage number {n} out of range 1..=7")));
        }
        Stage::ALL
            .iter()
            .copied()
            .find(|stage| stage.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| TraceError::InvalidInput(format!("unknown stage: {s:?}")))
    }
}

// =============================================================================
// TESTS
// =============================================================================
