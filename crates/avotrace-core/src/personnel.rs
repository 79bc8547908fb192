//! # Personnel and Payroll
//!
//! Employees, work shifts and the payroll computation.
//!
//! ## Shift arithmetic
//!
//! A shift is a date plus a start and end time of day. When the end is not
//! after the start the shift crosses midnight, so a shift spans at most
//! 24 hours. Worked minutes are the span minus the unpaid break; the whole
//! shift counts toward the day it started on.
//!
//! ## Overtime
//!
//! Per employee and per day, minutes beyond `regular_minutes_per_day` are
//! overtime and paid at `overtime_percent` of the hourly rate. Money is
//! integer cents; divisions round half-up.

use crate::primitives::{MAX_FIELD_LENGTH, MAX_HOURLY_RATE_CENTS};
use crate::types::{RecordId, Timestamp, TraceError};
use chrono::{NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const MINUTES_PER_DAY: u32 = 24 * 60;

// =============================================================================
// POLICY
// =============================================================================

/// Payroll rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PayrollPolicy {
    /// Minutes per day paid at the regular rate.
    pub regular_minutes_per_day: u32,
    /// Overtime rate as a percentage of the regular rate.
    pub overtime_percent: u32,
}

impl Default for PayrollPolicy {
    fn default() -> Self {
        Self {
            regular_minutes_per_day: 480,
            overtime_percent: 150,
        }
    }
}

// =============================================================================
// EMPLOYEES
// =============================================================================

/// A member of staff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub id: RecordId,
    pub full_name: String,
    /// National id or passport number.
    pub document_number: String,
    pub role: String,
    pub hourly_rate_cents: u64,
    pub active: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub version: u64,
}

/// Fields supplied when hiring.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmployeeInput {
    pub full_name: String,
    pub document_number: String,
    pub role: String,
    pub hourly_rate_cents: u64,
}

/// Partial update; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmployeeUpdate {
    pub full_name: Option<String>,
    pub document_number: Option<String>,
    pub role: Option<String>,
    pub hourly_rate_cents: Option<u64>,
}

impl Employee {
    /// Validate input and build a new active employee (unsaved).
    pub fn new(input: EmployeeInput, now: Timestamp) -> Result<Self, TraceError> {
        let employee = Self {
            id: RecordId::generate(),
            full_name: input.full_name.trim().to_string(),
            document_number: input.document_number.trim().to_string(),
            role: input.role.trim().to_string(),
            hourly_rate_cents: input.hourly_rate_cents,
            active: true,
            created_at: now,
            updated_at: now,
            version: 0,
        };
        employee.validate()?;
        Ok(employee)
    }

    /// Apply a partial update. On error the employee is unchanged.
    pub fn apply_update(&mut self, update: EmployeeUpdate, now: Timestamp) -> Result<(), TraceError> {
        let mut next = self.clone();
        if let Some(name) = update.full_name {
            next.full_name = name.trim().to_string();
        }
        if let Some(doc) = update.document_number {
            next.document_number = doc.trim().to_string();
        }
        if let Some(role) = update.role {
            next.role = role.trim().to_string();
        }
        if let Some(rate) = update.hourly_rate_cents {
            next.hourly_rate_cents = rate;
        }
        next.validate()?;
        next.updated_at = now;
        *self = next;
        Ok(())
    }

    fn validate(&self) -> Result<(), TraceError> {
        require_text("full_name", &self.full_name)?;
        require_text("document_number", &self.document_number)?;
        check_length("role", &self.role)?;
        if self.hourly_rate_cents == 0 {
            return Err(TraceError::InvalidInput(
                "hourly_rate_cents must be greater than zero".to_string(),
            ));
        }
        if self.hourly_rate_cents > MAX_HOURLY_RATE_CENTS {
            return Err(TraceError::InvalidInput(format!(
                "hourly_rate_cents {} exceeds maximum {}",
                self.hourly_rate_cents, MAX_HOURLY_RATE_CENTS
            )));
        }
        Ok(())
    }
}

// =============================================================================
// SHIFTS
// =============================================================================

/// One scheduled or worked shift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkShift {
    pub id: RecordId,
    pub employee_id: RecordId,
    /// Day the shift starts on.
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
    /// Unpaid break.
    pub break_minutes: u32,
    pub notes: String,
    pub created_at: Timestamp,
    pub version: u64,
}

/// Fields supplied when recording a shift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftInput {
    pub employee_id: RecordId,
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
    #[serde(default)]
    pub break_minutes: u32,
    #[serde(default)]
    pub notes: String,
}

impl WorkShift {
    /// Validate and build a shift (unsaved).
    pub fn new(input: ShiftInput, now: Timestamp) -> Result<Self, TraceError> {
        let span = span_minutes(input.start, input.end);
        if input.break_minutes > span {
            return Err(TraceError::InvalidInput(format!(
                "break of {} minutes is longer than the {} minute shift",
                input.break_minutes, span
            )));
        }
        check_length("notes", &input.notes)?;
        Ok(Self {
            id: RecordId::generate(),
            employee_id: input.employee_id,
            date: input.date,
            start: input.start,
            end: input.end,
            break_minutes: input.break_minutes,
            notes: input.notes,
            created_at: now,
            version: 0,
        })
    }

    /// Whether the shift ends on the following day.
    #[must_use]
    pub fn crosses_midnight(&self) -> bool {
        self.end <= self.start
    }

    /// Paid minutes: span minus break.
    #[must_use]
    pub fn worked_minutes(&self) -> u32 {
        span_minutes(self.start, self.end).saturating_sub(self.break_minutes)
    }
}

/// Minutes from `start` to `end`, wrapping past midnight.
///
/// Equal times mean a full 24-hour shift.
#[must_use]
pub fn span_minutes(start: NaiveTime, end: NaiveTime) -> u32 {
    let s = start.num_seconds_from_midnight() / 60;
    let e = end.num_seconds_from_midnight() / 60;
    if e > s {
        e - s
    } else {
        e + MINUTES_PER_DAY - s
    }
}

// =============================================================================
// PAYROLL
// =============================================================================

/// Pay for one employee over a period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollSummary {
    pub employee_id: RecordId,
    pub full_name: String,
    pub days_worked: u32,
    pub regular_minutes: u64,
    pub overtime_minutes: u64,
    pub regular_pay_cents: u64,
    pub overtime_pay_cents: u64,
    pub gross_pay_cents: u64,
}

/// Compute pay for `employee` from the shifts dated within `[from, to]`.
///
/// Shifts of other employees are ignored, so the full shift list can be
/// passed in.
pub fn compute_payroll(
    employee: &Employee,
    shifts: &[WorkShift],
    from: NaiveDate,
    to: NaiveDate,
    policy: &PayrollPolicy,
) -> Result<PayrollSummary, TraceError> {
    if from > to {
        return Err(TraceError::InvalidInput(format!(
            "payroll period starts ({from}) after it ends ({to})"
        )));
    }

    let mut per_day: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    for shift in shifts
        .iter()
        .filter(|s| s.employee_id == employee.id && s.date >= from && s.date <= to)
    {
        *per_day.entry(shift.date).or_default() += u64::from(shift.worked_minutes());
    }

    let allowance = u64::from(policy.regular_minutes_per_day);
    let mut regular_minutes = 0u64;
    let mut overtime_minutes = 0u64;
    for &minutes in per_day.values() {
        regular_minutes = add(regular_minutes, minutes.min(allowance))?;
        overtime_minutes = add(overtime_minutes, minutes.saturating_sub(allowance))?;
    }

    let rate = employee.hourly_rate_cents;
    let regular_pay_cents = div_round(mul(regular_minutes, rate)?, 60)?;
    let overtime_pay_cents = div_round(
        mul(
            mul(overtime_minutes, rate)?,
            u64::from(policy.overtime_percent),
        )?,
        60 * 100,
    )?;

    Ok(PayrollSummary {
        employee_id: employee.id,
        full_name: employee.full_name.clone(),
        days_worked: u32::try_from(per_day.len()).map_err(|_| overflow())?,
        regular_minutes,
        overtime_minutes,
        regular_pay_cents,
        overtime_pay_cents,
        gross_pay_cents: add(regular_pay_cents, overtime_pay_cents)?,
    })
}

fn overflow() -> TraceError {
    TraceError::InvalidInput("payroll amount exceeds the representable range".to_string())
}

fn add(a: u64, b: u64) -> Result<u64, TraceError> {
    a.checked_add(b).ok_or_else(overflow)
}

fn mul(a: u64, b: u64) -> Result<u64, TraceError> {
    a.checked_mul(b).ok_or_else(overflow)
}

/// Integer division rounding half-up.
fn div_round(numerator: u64, denominator: u64) -> Result<u64, TraceError> {
    Ok(add(numerator, denominator / 2)? / denominator)
}

// =============================================================================
// HELPERS
// =============================================================================

fn require_text(name: &str, value: &str) -> Result<(), TraceError> {
    if value.is_empty() {
        return Err(TraceError::InvalidInput(format!("{name} is required")));
    }
    check_length(name, value)
}

fn check_length(name: &str, value: &str) -> Result<(), TraceError> {
    if value.len() > MAX_FIELD_LENGTH {
        return Err(TraceError::InvalidInput(format!(
            "{name} length {} exceeds maximum {}",
            value.len(),
            MAX_FIELD_LENGTH
        )));
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).expect("valid time")
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).expect("valid date")
    }

    fn employee(rate: u64) -> Employee {
        Employee::new(
            EmployeeInput {
                full_name: "Rosa Quispe".to_string(),
                document_number: "40123456".to_string(),
                role: "packer".to_string(),
                hourly_rate_cents: rate,
            },
            Timestamp(0),
        )
        .expect("valid employee")
    }

    fn shift(emp: &Employee, date: NaiveDate, start: NaiveTime, end: NaiveTime, brk: u32) -> WorkShift {
        WorkShift::new(
            ShiftInput {
                employee_id: emp.id,
                date,
                start,
                end,
                break_minutes: brk,
                notes: String::new(),
            },
            Timestamp(0),
        )
        .expect("valid shift")
    }

    #[test]
    fn day_shift_minutes() {
        let e = employee(1200);
        let s = shift(&e, day(2), time(8, 0), time(17, 0), 60);
        assert!(!s.crosses_midnight());
        assert_eq!(s.worked_minutes(), 480);
    }

    #[test]
    fn overnight_shift_minutes() {
        let e = employee(1200);
        let s = shift(&e, day(2), time(22, 0), time(6, 30), 30);
        assert!(s.crosses_midnight());
        assert_eq!(s.worked_minutes(), 480);
    }

    #[test]
    fn equal_times_is_full_day() {
        assert_eq!(span_minutes(time(6, 0), time(6, 0)), 1440);
    }

    #[test]
    fn break_longer_than_shift_rejected() {
        let e = employee(1200);
        let result = WorkShift::new(
            ShiftInput {
                employee_id: e.id,
                date: day(2),
                start: time(9, 0),
                end: time(10, 0),
                break_minutes: 61,
                notes: String::new(),
            },
            Timestamp(0),
        );
        assert!(matches!(result, Err(TraceError::InvalidInput(_))));
    }

    #[test]
    fn overtime_only_beyond_daily_allowance() {
        let e = employee(1200);
        let shifts = vec![
            // 10h worked: 8h regular + 2h overtime
            shift(&e, day(2), time(7, 0), time(17, 0), 0),
            // 6h worked: all regular
            shift(&e, day(3), time(8, 0), time(14, 0), 0),
        ];
        let summary = compute_payroll(&e, &shifts, day(1), day(31), &PayrollPolicy::default())
            .expect("payroll");

        assert_eq!(summary.days_worked, 2);
        assert_eq!(summary.regular_minutes, 840);
        assert_eq!(summary.overtime_minutes, 120);
        assert_eq!(summary.regular_pay_cents, 14 * 1200);
        assert_eq!(summary.overtime_pay_cents, 2 * 1800);
        assert_eq!(summary.gross_pay_cents, 16_800 + 3_600);
    }

    #[test]
    fn two_shifts_same_day_are_summed() {
        let e = employee(1000);
        let shifts = vec![
            shift(&e, day(4), time(6, 0), time(11, 0), 0),
            shift(&e, day(4), time(13, 0), time(18, 0), 0),
        ];
        let summary = compute_payroll(&e, &shifts, day(4), day(4), &PayrollPolicy::default())
            .expect("payroll");
        assert_eq!(summary.days_worked, 1);
        assert_eq!(summary.regular_minutes, 480);
        assert_eq!(summary.overtime_minutes, 120);
    }

    #[test]
    fn pay_rounds_half_up() {
        // 1 minute at 30 cents/hour = 0.5 cents -> 1
        let e = employee(30);
        let shifts = vec![shift(&e, day(5), time(8, 0), time(8, 1), 0)];
        let summary = compute_payroll(&e, &shifts, day(5), day(5), &PayrollPolicy::default())
            .expect("payroll");
        assert_eq!(summary.regular_pay_cents, 1);
    }

    #[test]
    fn period_and_employee_filters() {
        let a = employee(1000);
        let b = employee(1000);
        let shifts = vec![
            shift(&a, day(1), time(8, 0), time(9, 0), 0),
            shift(&a, day(20), time(8, 0), time(9, 0), 0),
            shift(&b, day(1), time(8, 0), time(16, 0), 0),
        ];
        let summary = compute_payroll(&a, &shifts, day(1), day(10), &PayrollPolicy::default())
            .expect("payroll");
        assert_eq!(summary.regular_minutes, 60);
        assert!(compute_payroll(&a, &shifts, day(10), day(1), &PayrollPolicy::default()).is_err());
    }

    #[test]
    fn employee_validation() {
        assert!(
            Employee::new(
                EmployeeInput {
                    full_name: " ".to_string(),
                    document_number: "1".to_string(),
                    role: String::new(),
                    hourly_rate_cents: 100,
                },
                Timestamp(0)
            )
            .is_err()
        );
        let mut e = employee(100);
        let before = e.clone();
        assert!(
            e.apply_update(
                EmployeeUpdate {
                    hourly_rate_cents: Some(0),
                    ..EmployeeUpdate::default()
                },
                Timestamp(5)
            )
            .is_err()
        );
        assert_eq!(e, before);
    }

    #[test]
    fn hourly_rate_is_capped() {
        let input = EmployeeInput {
            full_name: "Rosa Quispe".to_string(),
            document_number: "40123456".to_string(),
            role: String::new(),
            hourly_rate_cents: u64::MAX / 2,
        };
        assert!(matches!(
            Employee::new(input, Timestamp(0)),
            Err(TraceError::InvalidInput(_))
        ));
    }

    #[test]
    fn maximal_rate_twelve_hour_shift() {
        let e = employee(MAX_HOURLY_RATE_CENTS);
        let shifts = vec![shift(&e, day(6), time(8, 0), time(20, 0), 0)];
        let summary = compute_payroll(&e, &shifts, day(6), day(6), &PayrollPolicy::default())
            .expect("payroll");
        assert_eq!(summary.regular_pay_cents, 8 * MAX_HOURLY_RATE_CENTS);
        assert_eq!(summary.overtime_pay_cents, 6 * MAX_HOURLY_RATE_CENTS);
        assert_eq!(summary.gross_pay_cents, 14 * MAX_HOURLY_RATE_CENTS);
    }

    #[test]
    fn overflowing_pay_is_an_error() {
        // Bypasses validation the way a corrupted or foreign record would.
        let mut e = employee(1000);
        e.hourly_rate_cents = u64::MAX / 2;
        let shifts = vec![shift(&e, day(6), time(8, 0), time(20, 0), 0)];
        let result = compute_payroll(&e, &shifts, day(6), day(6), &PayrollPolicy::default());
        assert!(matches!(result, Err(TraceError::InvalidInput(_))));
    }
}
