//! # Lot Query
//!
//! Filtering, sorting and paging of lot listings. Equality and range
//! filters only, plus a single sort key. Ties are broken by id so the
//! order is stable between calls.

use crate::lot::{Lot, LotStatus};
use crate::primitives::{DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT};
use crate::types::{Timestamp, TraceError, UserId, Visibility};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::str::FromStr;

/// Sort key for lot listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LotSort {
    #[default]
    CreatedAt,
    UpdatedAt,
    LotNumber,
    Completion,
}

impl FromStr for LotSort {
    type Err = TraceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created_at" => Ok(LotSort::CreatedAt),
            "updated_at" => Ok(LotSort::UpdatedAt),
            "lot_number" => Ok(LotSort::LotNumber),
            "completion" => Ok(LotSort::Completion),
            _ => Err(TraceError::InvalidInput(format!(
                "unknown sort key: {s:?} (use created_at, updated_at, lot_number or completion)"
            ))),
        }
    }
}

/// Filter and order for [`Ledger::list_lots`](crate::Ledger::list_lots).
///
/// Every filter is optional. An empty query lists every visible lot,
/// oldest first, up to the default page size.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LotQuery {
    pub status: Option<LotStatus>,
    pub owner: Option<UserId>,
    pub visibility: Option<Visibility>,
    pub lot_number_prefix: Option<String>,
    /// Inclusive lower bound on `created_at`.
    pub created_from: Option<Timestamp>,
    /// Inclusive upper bound on `created_at`.
    pub created_to: Option<Timestamp>,
    pub sort: LotSort,
    pub descending: bool,
    pub limit: Option<usize>,
}

impl LotQuery {
    /// Effective page size, capped at `MAX_LIST_LIMIT`.
    #[must_use]
    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT)
    }

    /// Whether a lot passes every filter.
    #[must_use]
    pub fn matches(&self, lot: &Lot) -> bool {
        if self.status.is_some_and(|s| s != lot.status) {
            return false;
        }
        if self.owner.as_ref().is_some_and(|o| o != &lot.owner) {
            return false;
        }
        if self.visibility.is_some_and(|v| v != lot.visibility) {
            return false;
        }
        if let Some(prefix) = &self.lot_number_prefix {
            if !lot.lot_number.starts_with(prefix.as_str()) {
                return false;
            }
        }
        if self.created_from.is_some_and(|from| lot.created_at < from) {
            return false;
        }
        if self.created_to.is_some_and(|to| lot.created_at > to) {
            return false;
        }
        true
    }

    /// Filter, sort and truncate.
    #[must_use]
    pub fn apply(&self, lots: Vec<Lot>) -> Vec<Lot> {
        let mut selected: Vec<Lot> = lots.into_iter().filter(|l| self.matches(l)).collect();
        selected.sort_by(|a, b| {
            let ord = self.compare(a, b);
            if self.descending { ord.reverse() } else { ord }
        });
        selected.truncate(self.effective_limit());
        selected
    }

    fn compare(&self, a: &Lot, b: &Lot) -> Ordering {
        let primary = match self.sort {
            LotSort::CreatedAt => a.created_at.cmp(&b.created_at),
            LotSort::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            LotSort::LotNumber => a.lot_number.cmp(&b.lot_number),
            LotSort::Completion => a.completed_steps.len().cmp(&b.completed_steps.len()),
        };
        primary.then_with(|| a.id.cmp(&b.id))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::create_draft;
    use crate::stage::Stage;

    fn lot(number: &str, owner: &str, created: i64) -> Lot {
        create_draft(
            number,
            UserId::new(owner).expect("valid"),
            Visibility::Global,
            Timestamp(created),
        )
        .expect("draft")
    }

    #[test]
    fn filters_combine() {
        let lots = vec![
            lot("A-1", "ana", 10),
            lot("A-2", "luis", 20),
            lot("B-1", "ana", 30),
        ];
        let query = LotQuery {
            owner: Some(UserId::new("ana").expect("valid")),
            lot_number_prefix: Some("A-".to_string()),
            ..LotQuery::default()
        };
        let out = query.apply(lots);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].lot_number, "A-1");
    }

    #[test]
    fn created_range_is_inclusive() {
        let lots = vec![lot("1", "a", 10), lot("2", "a", 20), lot("3", "a", 30)];
        let query = LotQuery {
            created_from: Some(Timestamp(10)),
            created_to: Some(Timestamp(20)),
            ..LotQuery::default()
        };
        assert_eq!(query.apply(lots).len(), 2);
    }

    #[test]
    fn sort_by_completion_descending() {
        let mut done = lot("X", "a", 1);
        done.completed_steps.insert(Stage::Harvest);
        done.completed_steps.insert(Stage::Transport);
        let lots = vec![lot("Y", "a", 2), done];
        let query = LotQuery {
            sort: LotSort::Completion,
            descending: true,
            ..LotQuery::default()
        };
        assert_eq!(query.apply(lots)[0].lot_number, "X");
    }

    #[test]
    fn limit_is_capped() {
        let query = LotQuery {
            limit: Some(MAX_LIST_LIMIT * 10),
            ..LotQuery::default()
        };
        assert_eq!(query.effective_limit(), MAX_LIST_LIMIT);
        assert_eq!(LotQuery::default().effective_limit(), DEFAULT_LIST_LIMIT);
    }

    #[test]
    fn sort_key_parses() {
        assert_eq!(
            "lot_number".parse::<LotSort>().expect("parse"),
            LotSort::LotNumber
        );
        assert!("weight".parse::<LotSort>().is_err());
    }
}
