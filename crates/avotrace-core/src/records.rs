//! # Stage Records
//!
//! One explicit record type per handling stage, plus [`StageRecord`], the
//! tagged union used when a single record travels on its own (HTTP body,
//! CLI input file). A lot keeps one of each in [`LotStages`].
//!
//! "Present" for validation purposes:
//! - text: non-empty after trimming
//! - numbers: set
//! - lists: non-empty
//!
//! Dates are free-form text. `YYYY-MM-DD` is expected but not enforced.

use crate::primitives::{MAX_CALIBERS, MAX_FIELD_LENGTH};
use crate::stage::Stage;
use crate::types::TraceError;
use serde::{Deserialize, Serialize};

// =============================================================================
// FIELD VIEW
// =============================================================================

/// A borrowed view of one field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue<'a> {
    Text(&'a str),
    Count(Option<u64>),
    Temperature(Option<i32>),
    List(&'a [String]),
}

impl FieldValue<'_> {
    /// Whether the value counts as filled in.
    #[must_use]
    pub fn is_present(&self) -> bool {
        match self {
            FieldValue::Text(s) => !s.trim().is_empty(),
            FieldValue::Count(n) => n.is_some(),
            FieldValue::Temperature(t) => t.is_some(),
            FieldValue::List(items) => items.iter().any(|i| !i.trim().is_empty()),
        }
    }
}

/// A named field of a stage record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field<'a> {
    pub name: &'static str,
    pub required: bool,
    pub value: FieldValue<'a>,
}

const fn req<'a>(name: &'static str, value: FieldValue<'a>) -> Field<'a> {
    Field {
        name,
        required: true,
        value,
    }
}

const fn opt<'a>(name: &'static str, value: FieldValue<'a>) -> Field<'a> {
    Field {
        name,
        required: false,
        value,
    }
}

// =============================================================================
// PER-STAGE RECORDS
// =============================================================================

/// Stage 1: picking in the field.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestRecord {
    pub harvest_date: String,
    pub farmer_id: String,
    pub farm_name: String,
    pub field_block: String,
    pub variety: String,
    pub harvested_weight_kg: Option<u64>,
    pub picker_crew: String,
    pub notes: String,
}

impl HarvestRecord {
    /// Field view. The lot number, also required for this stage, lives on the lot.
    #[must_use]
    pub fn fields(&self) -> Vec<Field<'_>> {
        vec![
            req("harvest_date", FieldValue::Text(&self.harvest_date)),
            req("farmer_id", FieldValue::Text(&self.farmer_id)),
            opt("farm_name", FieldValue::Text(&self.farm_name)),
            opt("field_block", FieldValue::Text(&self.field_block)),
            opt("variety", FieldValue::Text(&self.variety)),
            opt(
                "harvested_weight_kg",
                FieldValue::Count(self.harvested_weight_kg),
            ),
            opt("picker_crew", FieldValue::Text(&self.picker_crew)),
            opt("notes", FieldValue::Text(&self.notes)),
        ]
    }
}

/// Stage 2: truck from the farm to the packhouse.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportRecord {
    pub transport_company: String,
    pub vehicle_id: String,
    pub driver_name: String,
    pub departure_date: String,
    pub temperature_decicelsius: Option<i32>,
    pub arrival_date: String,
    pub notes: String,
}

impl TransportRecord {
    #[must_use]
    pub fn fields(&self) -> Vec<Field<'_>> {
        vec![
            req("transport_company", FieldValue::Text(&self.transport_company)),
            req("vehicle_id", FieldValue::Text(&self.vehicle_id)),
            opt("driver_name", FieldValue::Text(&self.driver_name)),
            req("departure_date", FieldValue::Text(&self.departure_date)),
            req(
                "temperature_decicelsius",
                FieldValue::Temperature(self.temperature_decicelsius),
            ),
            opt("arrival_date", FieldValue::Text(&self.arrival_date)),
            opt("notes", FieldValue::Text(&self.notes)),
        ]
    }
}

/// Stage 3: grading line at the packhouse.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SortingRecord {
    pub sorting_date: String,
    pub sorting_line: String,
    pub accepted_weight_kg: Option<u64>,
    pub rejected_weight_kg: Option<u64>,
    pub operator: String,
    pub notes: String,
}

impl SortingRecord {
    #[must_use]
    pub fn fields(&self) -> Vec<Field<'_>> {
        vec![
            req("sorting_date", FieldValue::Text(&self.sorting_date)),
            req("sorting_line", FieldValue::Text(&self.sorting_line)),
            req(
                "accepted_weight_kg",
                FieldValue::Count(self.accepted_weight_kg),
            ),
            opt(
                "rejected_weight_kg",
                FieldValue::Count(self.rejected_weight_kg),
            ),
            opt("operator", FieldValue::Text(&self.operator)),
            opt("notes", FieldValue::Text(&self.notes)),
        ]
    }
}

/// Stage 4: boxing by caliber.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PackagingRecord {
    pub packaging_date: String,
    pub box_id: String,
    pub box_count: Option<u64>,
    pub net_weight_kg: Option<u64>,
    pub gross_weight_kg: Option<u64>,
    pub calibers: Vec<String>,
    pub packer: String,
    pub notes: String,
}

impl PackagingRecord {
    #[must_use]
    pub fn fields(&self) -> Vec<Field<'_>> {
        vec![
            req("packaging_date", FieldValue::Text(&self.packaging_date)),
            req("box_id", FieldValue::Text(&self.box_id)),
            req("box_count", FieldValue::Count(self.box_count)),
            req("net_weight_kg", FieldValue::Count(self.net_weight_kg)),
            opt("gross_weight_kg", FieldValue::Count(self.gross_weight_kg)),
            req("calibers", FieldValue::List(&self.calibers)),
            opt("packer", FieldValue::Text(&self.packer)),
            opt("notes", FieldValue::Text(&self.notes)),
        ]
    }
}

/// Stage 5: cold chamber.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageRecord {
    pub storage_date: String,
    pub chamber_id: String,
    pub temperature_decicelsius: Option<i32>,
    pub humidity_percent: Option<u64>,
    pub pallet_position: String,
    pub notes: String,
}

impl StorageRecord {
    #[must_use]
    pub fn fields(&self) -> Vec<Field<'_>> {
        vec![
            req("storage_date", FieldValue::Text(&self.storage_date)),
            req("chamber_id", FieldValue::Text(&self.chamber_id)),
            req(
                "temperature_decicelsius",
                FieldValue::Temperature(self.temperature_decicelsius),
            ),
            opt("humidity_percent", FieldValue::Count(self.humidity_percent)),
            opt("pallet_position", FieldValue::Text(&self.pallet_position)),
            opt("notes", FieldValue::Text(&self.notes)),
        ]
    }
}

/// Stage 6: container loading and shipping.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportRecord {
    pub export_date: String,
    pub container_number: String,
    pub destination_country: String,
    pub shipping_line: String,
    pub booking_number: String,
    pub seal_number: String,
    pub notes: String,
}

impl ExportRecord {
    #[must_use]
    pub fn fields(&self) -> Vec<Field<'_>> {
        vec![
            req("export_date", FieldValue::Text(&self.export_date)),
            req("container_number", FieldValue::Text(&self.container_number)),
            req(
                "destination_country",
                FieldValue::Text(&self.destination_country),
            ),
            opt("shipping_line", FieldValue::Text(&self.shipping_line)),
            opt("booking_number", FieldValue::Text(&self.booking_number)),
            opt("seal_number", FieldValue::Text(&self.seal_number)),
            opt("notes", FieldValue::Text(&self.notes)),
        ]
    }
}

/// Stage 7: hand-over to the customer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryRecord {
    pub delivery_date: String,
    pub customer_name: String,
    pub received_by: String,
    pub delivery_address: String,
    pub received_condition: String,
    pub notes: String,
}

impl DeliveryRecord {
    #[must_use]
    pub fn fields(&self) -> Vec<Field<'_>> {
        vec![
            req("delivery_date", FieldValue::Text(&self.delivery_date)),
            req("customer_name", FieldValue::Text(&self.customer_name)),
            req("received_by", FieldValue::Text(&self.received_by)),
            opt("delivery_address", FieldValue::Text(&self.delivery_address)),
            opt(
                "received_condition",
                FieldValue::Text(&self.received_condition),
            ),
            opt("notes", FieldValue::Text(&self.notes)),
        ]
    }
}

// =============================================================================
// TAGGED UNION
// =============================================================================

/// A single stage record, tagged by stage.
///
/// JSON form: `{"stage": "sorting", "sorting_date": "...", ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageRecord {
    Harvest(HarvestRecord),
    Transport(TransportRecord),
    Sorting(SortingRecord),
    Packaging(PackagingRecord),
    Storage(StorageRecord),
    Export(ExportRecord),
    Delivery(DeliveryRecord),
}

impl StageRecord {
    /// The stage this record belongs to.
    #[must_use]
    pub const fn stage(&self) -> Stage {
        match self {
            StageRecord::Harvest(_) => Stage::Harvest,
            StageRecord::Transport(_) => Stage::Transport,
            StageRecord::Sorting(_) => Stage::Sorting,
            StageRecord::Packaging(_) => Stage::Packaging,
            StageRecord::Storage(_) => Stage::Storage,
            StageRecord::Export(_) => Stage::Export,
            StageRecord::Delivery(_) => Stage::Delivery,
        }
    }

    /// An empty record for `stage`.
    #[must_use]
    pub fn empty(stage: Stage) -> Self {
        match stage {
            Stage::Harvest => StageRecord::Harvest(HarvestRecord::default()),
            Stage::Transport => StageRecord::Transport(TransportRecord::default()),
            Stage::Sorting => StageRecord::Sorting(SortingRecord::default()),
            Stage::Packaging => StageRecord::Packaging(PackagingRecord::default()),
            Stage::Storage => StageRecord::Storage(StorageRecord::default()),
            Stage::Export => StageRecord::Export(ExportRecord::default()),
            Stage::Delivery => StageRecord::Delivery(DeliveryRecord::default()),
        }
    }

    /// Field view of the wrapped record.
    #[must_use]
    pub fn fields(&self) -> Vec<Field<'_>> {
        match self {
            StageRecord::Harvest(r) => r.fields(),
            StageRecord::Transport(r) => r.fields(),
            StageRecord::Sorting(r) => r.fields(),
            StageRecord::Packaging(r) => r.fields(),
            StageRecord::Storage(r) => r.fields(),
            StageRecord::Export(r) => r.fields(),
            StageRecord::Delivery(r) => r.fields(),
        }
    }

    /// Reject oversized input before it is merged or stored.
    ///
    /// This is a size check, not a content check: empty and partially
    /// filled records pass.
    pub fn check_limits(&self) -> Result<(), TraceError> {
        for field in self.fields() {
            match field.value {
                FieldValue::Text(s) if s.len() > MAX_FIELD_LENGTH => {
                    return Err(TraceError::InvalidInput(format!(
                        "{}.{} length {} exceeds maximum {}",
                        self.stage(),
                        field.name,
                        s.len(),
                        MAX_FIELD_LENGTH
                    )));
                }
                FieldValue::List(items) => {
                    if items.len() > MAX_CALIBERS {
                        return Err(TraceError::InvalidInput(format!(
                            "{}.{} has {} entries, maximum is {}",
                            self.stage(),
                            field.name,
                            items.len(),
                            MAX_CALIBERS
                        )));
                    }
                    if let Some(item) = items.iter().find(|i| i.len() > MAX_FIELD_LENGTH) {
                        return Err(TraceError::InvalidInput(format!(
                            "{}.{} entry length {} exceeds maximum {}",
                            self.stage(),
                            field.name,
                            item.len(),
                            MAX_FIELD_LENGTH
                        )));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

// =============================================================================
// PER-LOT STAGE DATA
// =============================================================================

/// Exactly one record per stage. New lots start with all records empty.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LotStages {
    pub harvest: HarvestRecord,
    pub transport: TransportRecord,
    pub sorting: SortingRecord,
    pub packaging: PackagingRecord,
    pub storage: StorageRecord,
    pub export: ExportRecord,
    pub delivery: DeliveryRecord,
}

impl LotStages {
    /// A copy of the record for `stage`.
    #[must_use]
    pub fn record(&self, stage: Stage) -> StageRecord {
        match stage {
            Stage::Harvest => StageRecord::Harvest(self.harvest.clone()),
            Stage::Transport => StageRecord::Transport(self.transport.clone()),
            Stage::Sorting => StageRecord::Sorting(self.sorting.clone()),
            Stage::Packaging => StageRecord::Packaging(self.packaging.clone()),
            Stage::Storage => StageRecord::Storage(self.storage.clone()),
            Stage::Export => StageRecord::Export(self.export.clone()),
            Stage::Delivery => StageRecord::Delivery(self.delivery.clone()),
        }
    }

    /// Field view of the record for `stage`, without copying it.
    #[must_use]
    pub fn fields(&self, stage: Stage) -> Vec<Field<'_>> {
        match stage {
            Stage::Harvest => self.harvest.fields(),
            Stage::Transport => self.transport.fields(),
            Stage::Sorting => self.sorting.fields(),
            Stage::Packaging => self.packaging.fields(),
            Stage::Storage => self.storage.fields(),
            Stage::Export => self.export.fields(),
            Stage::Delivery => self.delivery.fields(),
        }
    }

    /// Replace the record of the matching stage. Other stages are untouched.
    pub fn set(&mut self, record: StageRecord) {
        match record {
            StageRecord::Harvest(r) => self.harvest = r,
            StageRecord::Transport(r) => self.transport = r,
            StageRecord::Sorting(r) => self.sorting = r,
            StageRecord::Packaging(r) => self.packaging = r,
            StageRecord::Storage(r) => self.storage = r,
            StageRecord::Export(r) => self.export = r,
            StageRecord::Delivery(r) => self.delivery = r,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
