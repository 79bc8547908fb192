//! # CSV Reports
//!
//! Flat exports for spreadsheets: one row per lot, per payroll summary, or
//! per inspection. Column sets are fixed so downstream sheets can rely on
//! them. Timestamps are rendered as RFC 3339, missing numbers as empty cells.

use crate::lot::Lot;
use crate::personnel::PayrollSummary;
use crate::quality::QualityInspection;
use crate::stage::Stage;
use crate::types::TraceError;

/// Columns of [`lots_csv`], in order.
pub const LOT_COLUMNS: [&str; 19] = [
    "lot_number",
    "status",
    "current_step",
    "completed_steps",
    "completion_percent",
    "owner",
    "visibility",
    "harvest_date",
    "farmer_id",
    "transport_company",
    "vehicle_id",
    "box_id",
    "net_weight_kg",
    "container_number",
    "destination_country",
    "delivery_date",
    "customer_name",
    "created_at",
    "updated_at",
];

/// Columns of [`payroll_csv`], in order.
pub const PAYROLL_COLUMNS: [&str; 8] = [
    "employee_id",
    "full_name",
    "days_worked",
    "regular_minutes",
    "overtime_minutes",
    "regular_pay_cents",
    "overtime_pay_cents",
    "gross_pay_cents",
];

/// Columns of [`inspections_csv`], in order.
pub const INSPECTION_COLUMNS: [&str; 9] = [
    "lot_number",
    "inspected_on",
    "inspector",
    "sample_size",
    "total_defects",
    "defect_permille",
    "dry_matter_permille",
    "verdict",
    "notes",
];

fn csv_err(e: impl std::fmt::Display) -> TraceError {
    TraceError::SerializationError(format!("CSV: {e}"))
}

fn opt(value: Option<u64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Write a header and rows into a UTF-8 string.
fn render<I>(header: &[&str], rows: I) -> Result<String, TraceError>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(header).map_err(csv_err)?;
    for row in rows {
        writer.write_record(&row).map_err(csv_err)?;
    }
    let bytes = writer.into_inner().map_err(csv_err)?;
    String::from_utf8(bytes).map_err(csv_err)
}

/// One row per lot. Completed steps are listed by number, `;`-separated.
pub fn lots_csv(lots: &[Lot]) -> Result<String, TraceError> {
    render(
        &LOT_COLUMNS,
        lots.iter().map(|lot| {
            let s = &lot.stages;
            let completed = lot
                .completed_steps
                .iter()
                .map(|stage| stage.number().to_string())
                .collect::<Vec<_>>()
                .join(";");
            vec![
                lot.lot_number.clone(),
                lot.status.to_string(),
                lot.current_step.name().to_string(),
                completed,
                lot.completion_percent().to_string(),
                lot.owner.to_string(),
                lot.visibility.to_string(),
                s.harvest.harvest_date.clone(),
                s.harvest.farmer_id.clone(),
                s.transport.transport_company.clone(),
                s.transport.vehicle_id.clone(),
                s.packaging.box_id.clone(),
                opt(s.packaging.net_weight_kg),
                s.export.container_number.clone(),
                s.export.destination_country.clone(),
                s.delivery.delivery_date.clone(),
                s.delivery.customer_name.clone(),
                lot.created_at.to_rfc3339(),
                lot.updated_at.to_rfc3339(),
            ]
        }),
    )
}

/// One row per payroll summary.
pub fn payroll_csv(summaries: &[PayrollSummary]) -> Result<String, TraceError> {
    render(
        &PAYROLL_COLUMNS,
        summaries.iter().map(|p| {
            vec![
                p.employee_id.to_string(),
                p.full_name.clone(),
                p.days_worked.to_string(),
                p.regular_minutes.to_string(),
                p.overtime_minutes.to_string(),
                p.regular_pay_cents.to_string(),
                p.overtime_pay_cents.to_string(),
                p.gross_pay_cents.to_string(),
            ]
        }),
    )
}

/// One row per inspection.
pub fn inspections_csv(inspections: &[QualityInspection]) -> Result<String, TraceError> {
    render(
        &INSPECTION_COLUMNS,
        inspections.iter().map(|i| {
            vec![
                i.lot_number.clone(),
                i.inspected_on.to_string(),
                i.inspector.clone(),
                i.sample_size.to_string(),
                i.total_defects().to_string(),
                i.defect_permille.to_string(),
                opt(i.dry_matter_permille.map(u64::from)),
                i.verdict.to_string(),
                i.notes.clone(),
            ]
        }),
    )
}

/// Label of the stage a lot is waiting on, for human-readable listings.
#[must_use]
pub fn pending_stage_label(lot: &Lot) -> String {
    match lot.first_incomplete() {
        Some(stage) => format!("{}/{} {}", stage.number(), Stage::ALL.len(), stage.name()),
        None => "done".to_string(),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{advance_step, create_draft};
    use crate::records::{HarvestRecord, StageRecord};
    use crate::types::{RecordId, Timestamp, UserId, Visibility};

    fn lot() -> Lot {
        let mut lot = create_draft(
            "L-2026-001",
            UserId::new("ana").expect("valid"),
            Visibility::Global,
            Timestamp(0),
        )
        .expect("draft");
        advance_step(
            &mut lot,
            StageRecord::Harvest(HarvestRecord {
                harvest_date: "2026-03-01".to_string(),
                farmer_id: "F-7, north".to_string(),
                ..HarvestRecord::default()
            }),
            Timestamp(60_000),
        )
        .expect("advance");
        lot
    }

    #[test]
    fn lots_csv_has_fixed_header() {
        let csv = lots_csv(&[]).expect("csv");
        assert_eq!(csv.trim_end(), LOT_COLUMNS.join(","));
    }

    #[test]
    fn lots_csv_quotes_and_formats() {
        let csv = lots_csv(&[lot()]).expect("csv");
        let row = csv.lines().nth(1).expect("row");
        assert!(row.starts_with("L-2026-001,in_progress,transport,1,14,ana,global,2026-03-01,"));
        assert!(row.contains("\"F-7, north\""));
        assert!(row.ends_with("1970-01-01T00:00:00Z,1970-01-01T00:01:00Z"));
    }

    #[test]
    fn payroll_csv_rows() {
        let summary = PayrollSummary {
            employee_id: RecordId::from_u128(1),
            full_name: "Rosa Quispe".to_string(),
            days_worked: 2,
            regular_minutes: 960,
            overtime_minutes: 30,
            regular_pay_cents: 16_000,
            overtime_pay_cents: 750,
            gross_pay_cents: 16_750,
        };
        let csv = payroll_csv(&[summary]).expect("csv");
        assert_eq!(csv.lines().count(), 2);
        assert!(csv.lines().nth(1).expect("row").ends_with(",16750"));
    }

    #[test]
    fn pending_label() {
        assert_eq!(pending_stage_label(&lot()), "2/7 transport");
    }
}
