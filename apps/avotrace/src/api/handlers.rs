//! # API Endpoint Handlers
//!
//! This module implements the actual HTTP endpoint handlers.
//!
//! Reads take the ledger's read lock, writes its write lock. Every handler
//! returns `Result<_, ApiError>`; errors become `{success: false, error}`
//! with the status from [`ApiError::status_code`].

use super::{
    AppState,
    types::{
        AdvanceResponse, ArchiveListResponse, CommitRequest, CommitResponse, ConflictDetail,
        CreateLotRequest, DuplicateRequest, EmployeeListParams, ErrorResponse, ExpectedVersion,
        HashResponse, HealthResponse, LotFilterParams, LotListParams, LotListResponse, LotView,
        PayrollParams, PayrollResponse, RenameRequest, ReplicatedDocument, ReplicationOp,
        ReplicationScan, ShiftListParams, SnapshotResponse, StageRequest, StatusResponse,
        StepRequest, UpdateEmployeeRequest, UploadParams, ValidationResponse,
    },
};
use avotrace_core::{
    ArchivedLot, Collection, DocumentRecord, DocumentStore, Employee, EmployeeInput,
    InspectionInput, QualityInspection, RecordId, ShiftInput, TraceError, WorkShift, WriteOp,
    export::{compute_blake3_hash, export_snapshot},
    inspections_csv, lots_csv, payroll_csv,
    primitives::MAX_DOCUMENT_SIZE,
    snapshot_checksum,
};
use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use std::collections::BTreeMap;

// =============================================================================
// ERROR MAPPING
// =============================================================================

/// Error returned by every handler.
#[derive(Debug)]
pub enum ApiError {
    /// A core error, mapped by kind.
    Trace(TraceError),
    /// The caller is known but not allowed to do this.
    Forbidden(&'static str),
}

impl From<TraceError> for ApiError {
    fn from(e: TraceError) -> Self {
        Self::Trace(e)
    }
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Trace(e) => match e {
                TraceError::NotFound { .. } => StatusCode::NOT_FOUND,
                TraceError::VersionConflict { .. } => StatusCode::CONFLICT,
                TraceError::StepIncomplete { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                TraceError::InvalidInput(_) | TraceError::InvalidTransition(_) => {
                    StatusCode::BAD_REQUEST
                }
                TraceError::SerializationError(_)
                | TraceError::DeserializationError(_)
                | TraceError::IoError(_)
                | TraceError::Remote(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match self {
            ApiError::Forbidden(reason) => ErrorResponse::new(reason),
            ApiError::Trace(e) => {
                let mut body = ErrorResponse::new(e.to_string());
                match e {
                    TraceError::StepIncomplete { missing, .. } => {
                        body.missing = Some(missing.into_iter().map(str::to_string).collect());
                    }
                    TraceError::VersionConflict {
                        collection,
                        id,
                        expected,
                        found,
                    } => {
                        body.conflict = Some(ConflictDetail {
                            collection,
                            id,
                            expected,
                            found,
                        });
                    }
                    TraceError::SerializationError(_)
                    | TraceError::DeserializationError(_)
                    | TraceError::IoError(_)
                    | TraceError::Remote(_) => {
                        tracing::error!(error = %body.error, "request failed");
                    }
                    _ => {}
                }
                body
            }
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// =============================================================================
// HEALTH / STATUS
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

/// Document counts and the caller's lot summary.
pub async fn status_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<StatusResponse>> {
    let viewer = state.viewer(&headers)?;
    let ledger = state.ledger.read().await;
    let collections = ledger
        .collection_counts()?
        .into_iter()
        .map(|(c, n)| (c.as_str().to_string(), n))
        .collect::<BTreeMap<_, _>>();
    let lots = ledger.lot_summary(&viewer)?;
    Ok(Json(StatusResponse { collections, lots }))
}

// =============================================================================
// LOT HANDLERS
// =============================================================================

pub async fn list_lots_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<LotListParams>,
) -> ApiResult<Json<LotListResponse>> {
    let viewer = state.viewer(&headers)?;
    let query = params.to_query()?;
    let ledger = state.ledger.read().await;
    let lots: Vec<LotView> = ledger
        .list_lots(&query, &viewer)?
        .into_iter()
        .map(LotView::from)
        .collect();
    Ok(Json(LotListResponse {
        count: lots.len(),
        lots,
    }))
}

/// Create a draft owned by the caller.
pub async fn create_lot_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateLotRequest>,
) -> ApiResult<(StatusCode, Json<LotView>)> {
    let viewer = state.viewer(&headers)?;
    let mut ledger = state.ledger.write().await;
    let lot = ledger.create_lot(&request.lot_number, request.visibility, &viewer)?;
    Ok((StatusCode::CREATED, Json(lot.into())))
}

pub async fn get_lot_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<RecordId>,
) -> ApiResult<Json<LotView>> {
    let viewer = state.viewer(&headers)?;
    let ledger = state.ledger.read().await;
    Ok(Json(ledger.get_lot(id, &viewer)?.into()))
}

pub async fn delete_lot_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<RecordId>,
    Query(guard): Query<ExpectedVersion>,
) -> ApiResult<StatusCode> {
    let viewer = state.viewer(&headers)?;
    let mut ledger = state.ledger.write().await;
    ledger.delete_lot(id, guard.expected_version, &viewer)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Draft-save a stage record without completing it.
pub async fn save_stage_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<RecordId>,
    Json(request): Json<StageRequest>,
) -> ApiResult<Json<LotView>> {
    let viewer = state.viewer(&headers)?;
    let mut ledger = state.ledger.write().await;
    let lot = ledger.save_stage(id, request.expected_version, request.record, &viewer)?;
    Ok(Json(lot.into()))
}

/// Validate and complete a stage.
pub async fn advance_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<RecordId>,
    Json(request): Json<StageRequest>,
) -> ApiResult<Json<AdvanceResponse>> {
    let viewer = state.viewer(&headers)?;
    let mut ledger = state.ledger.write().await;
    let result = ledger.advance_step(id, request.expected_version, request.record, &viewer)?;
    Ok(Json(AdvanceResponse {
        stage: result.outcome.stage,
        newly_completed: result.outcome.newly_completed,
        lot_completed: result.outcome.lot_completed,
        archived: result.archived.is_some(),
        deleted: result.deleted,
        lot: result.lot.into(),
    }))
}

/// Move the wizard to another stage.
pub async fn step_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<RecordId>,
    Json(request): Json<StepRequest>,
) -> ApiResult<Json<LotView>> {
    let viewer = state.viewer(&headers)?;
    let mut ledger = state.ledger.write().await;
    let lot = ledger.go_to_step(id, request.expected_version, request.stage, &viewer)?;
    Ok(Json(lot.into()))
}

pub async fn rename_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<RecordId>,
    Json(request): Json<RenameRequest>,
) -> ApiResult<Json<LotView>> {
    let viewer = state.viewer(&headers)?;
    let mut ledger = state.ledger.write().await;
    let lot = ledger.rename_lot(id, request.expected_version, &request.lot_number, &viewer)?;
    Ok(Json(lot.into()))
}

/// Copy a working or archived lot as a new draft.
pub async fn duplicate_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<RecordId>,
    request: Option<Json<DuplicateRequest>>,
) -> ApiResult<(StatusCode, Json<LotView>)> {
    let viewer = state.viewer(&headers)?;
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let mut ledger = state.ledger.write().await;
    let copy = ledger.duplicate_lot(id, request.lot_number.as_deref(), &viewer)?;
    Ok((StatusCode::CREATED, Json(copy.into())))
}

pub async fn archive_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<RecordId>,
    guard: Option<Json<ExpectedVersion>>,
) -> ApiResult<Json<ArchivedLot>> {
    let viewer = state.viewer(&headers)?;
    let expected = guard.and_then(|Json(g)| g.expected_version);
    let mut ledger = state.ledger.write().await;
    Ok(Json(ledger.archive_lot(id, expected, &viewer)?))
}

/// Per-step validity and missing fields.
pub async fn validation_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<RecordId>,
) -> ApiResult<Json<ValidationResponse>> {
    let viewer = state.viewer(&headers)?;
    let ledger = state.ledger.read().await;
    let lot = ledger.get_lot(id, &viewer)?;
    let steps = ledger.lot_validation(id, &viewer)?;
    Ok(Json(ValidationResponse {
        lot_id: lot.id,
        completion_percent: lot.completion_percent(),
        lot_number: lot.lot_number,
        steps: steps.into_iter().map(Into::into).collect(),
    }))
}

// =============================================================================
// ARCHIVE HANDLERS
// =============================================================================

pub async fn list_archive_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<ArchiveListResponse>> {
    let viewer = state.viewer(&headers)?;
    let ledger = state.ledger.read().await;
    let lots = ledger.list_archive(&viewer)?;
    Ok(Json(ArchiveListResponse {
        count: lots.len(),
        lots,
    }))
}

pub async fn get_archived_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<RecordId>,
) -> ApiResult<Json<ArchivedLot>> {
    let viewer = state.viewer(&headers)?;
    let ledger = state.ledger.read().await;
    Ok(Json(ledger.get_archived(id, &viewer)?))
}

// =============================================================================
// EXPORT HANDLERS
// =============================================================================

fn csv_response(file_name: &'static str, body: String) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        body,
    )
        .into_response()
}

/// Working lots visible to the caller, as CSV.
pub async fn lots_csv_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let viewer = state.viewer(&headers)?;
    let ledger = state.ledger.read().await;
    let lots = ledger.all_lots(&viewer)?;
    Ok(csv_response("lots.csv", lots_csv(&lots)?))
}

pub async fn payroll_csv_handler(
    State(state): State<AppState>,
    Query(params): Query<PayrollParams>,
) -> ApiResult<Response> {
    let ledger = state.ledger.read().await;
    let summaries = ledger.payroll(params.from, params.to)?;
    Ok(csv_response("payroll.csv", payroll_csv(&summaries)?))
}

pub async fn inspections_csv_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(filter): Query<LotFilterParams>,
) -> ApiResult<Response> {
    let viewer = state.viewer(&headers)?;
    let ledger = state.ledger.read().await;
    let inspections = ledger.list_inspections(filter.lot_id, &viewer)?;
    Ok(csv_response("inspections.csv", inspections_csv(&inspections)?))
}

/// Full snapshot of the store. It includes restricted lots of every
/// owner, so only administrators may take one.
pub async fn snapshot_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<SnapshotResponse>> {
    let viewer = state.viewer(&headers)?;
    if !viewer.admin {
        return Err(ApiError::Forbidden("snapshot export requires an administrator"));
    }
    let ledger = state.ledger.read().await;
    let data = export_snapshot(ledger.store())?;
    let checksum = snapshot_checksum(ledger.store())?;
    Ok(Json(SnapshotResponse {
        size_bytes: data.len(),
        data: STANDARD.encode(&data),
        checksum,
    }))
}

/// BLAKE3 hash of the snapshot bytes.
pub async fn hash_handler(State(state): State<AppState>) -> ApiResult<Json<HashResponse>> {
    let ledger = state.ledger.read().await;
    let data = export_snapshot(ledger.store())?;
    let checksum = snapshot_checksum(ledger.store())?;
    Ok(Json(HashResponse {
        hash: compute_blake3_hash(&data),
        algorithm: "blake3".to_string(),
        checksum,
    }))
}

// =============================================================================
// PERSONNEL HANDLERS
// =============================================================================

pub async fn list_employees_handler(
    State(state): State<AppState>,
    Query(params): Query<EmployeeListParams>,
) -> ApiResult<Json<Vec<Employee>>> {
    let ledger = state.ledger.read().await;
    Ok(Json(ledger.list_employees(params.active_only)?))
}

pub async fn create_employee_handler(
    State(state): State<AppState>,
    Json(input): Json<EmployeeInput>,
) -> ApiResult<(StatusCode, Json<Employee>)> {
    let mut ledger = state.ledger.write().await;
    let employee = ledger.create_employee(input)?;
    Ok((StatusCode::CREATED, Json(employee)))
}

pub async fn update_employee_handler(
    State(state): State<AppState>,
    Path(id): Path<RecordId>,
    Json(request): Json<UpdateEmployeeRequest>,
) -> ApiResult<Json<Employee>> {
    let mut ledger = state.ledger.write().await;
    Ok(Json(ledger.update_employee(
        id,
        request.expected_version,
        request.update,
    )?))
}

pub async fn deactivate_employee_handler(
    State(state): State<AppState>,
    Path(id): Path<RecordId>,
    guard: Option<Json<ExpectedVersion>>,
) -> ApiResult<Json<Employee>> {
    let expected = guard.and_then(|Json(g)| g.expected_version);
    let mut ledger = state.ledger.write().await;
    Ok(Json(ledger.deactivate_employee(id, expected)?))
}

pub async fn list_shifts_handler(
    State(state): State<AppState>,
    Query(params): Query<ShiftListParams>,
) -> ApiResult<Json<Vec<WorkShift>>> {
    let ledger = state.ledger.read().await;
    Ok(Json(ledger.list_shifts(
        params.employee_id,
        params.from,
        params.to,
    )?))
}

pub async fn create_shift_handler(
    State(state): State<AppState>,
    Json(input): Json<ShiftInput>,
) -> ApiResult<(StatusCode, Json<WorkShift>)> {
    let mut ledger = state.ledger.write().await;
    let shift = ledger.record_shift(input)?;
    Ok((StatusCode::CREATED, Json(shift)))
}

pub async fn delete_shift_handler(
    State(state): State<AppState>,
    Path(id): Path<RecordId>,
    Query(guard): Query<ExpectedVersion>,
) -> ApiResult<StatusCode> {
    let mut ledger = state.ledger.write().await;
    ledger.delete_shift(id, guard.expected_version)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn payroll_handler(
    State(state): State<AppState>,
    Query(params): Query<PayrollParams>,
) -> ApiResult<Json<PayrollResponse>> {
    let ledger = state.ledger.read().await;
    let summaries = ledger.payroll(params.from, params.to)?;
    Ok(Json(PayrollResponse {
        from: params.from,
        to: params.to,
        total_gross_cents: summaries.iter().map(|s| s.gross_pay_cents).sum(),
        summaries,
    }))
}

// =============================================================================
// QUALITY HANDLERS
// =============================================================================

pub async fn list_inspections_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(filter): Query<LotFilterParams>,
) -> ApiResult<Json<Vec<QualityInspection>>> {
    let viewer = state.viewer(&headers)?;
    let ledger = state.ledger.read().await;
    Ok(Json(ledger.list_inspections(filter.lot_id, &viewer)?))
}

pub async fn create_inspection_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<InspectionInput>,
) -> ApiResult<(StatusCode, Json<QualityInspection>)> {
    let viewer = state.viewer(&headers)?;
    let mut ledger = state.ledger.write().await;
    let inspection = ledger.record_inspection(input, &viewer)?;
    Ok((StatusCode::CREATED, Json(inspection)))
}

pub async fn get_inspection_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<RecordId>,
) -> ApiResult<Json<QualityInspection>> {
    let viewer = state.viewer(&headers)?;
    let ledger = state.ledger.read().await;
    Ok(Json(ledger.get_inspection(id, &viewer)?))
}

// =============================================================================
// DOCUMENT HANDLERS
// =============================================================================

pub async fn list_documents_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(filter): Query<LotFilterParams>,
) -> ApiResult<Json<Vec<DocumentRecord>>> {
    let viewer = state.viewer(&headers)?;
    let ledger = state.ledger.read().await;
    Ok(Json(ledger.list_documents(filter.lot_id, &viewer)?))
}

/// Upload a file. The body is the raw content; its `Content-Type` is kept.
pub async fn upload_document_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<DocumentRecord>)> {
    let viewer = state.viewer(&headers)?;
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let mut ledger = state.ledger.write().await;
    let record =
        ledger.attach_document(params.lot_id, &params.file_name, content_type, &body, &viewer)?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn get_document_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<RecordId>,
) -> ApiResult<Json<DocumentRecord>> {
    let viewer = state.viewer(&headers)?;
    let ledger = state.ledger.read().await;
    Ok(Json(ledger.get_document(id, &viewer)?))
}

/// The stored bytes, with the original content type.
pub async fn document_content_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<RecordId>,
) -> ApiResult<Response> {
    let viewer = state.viewer(&headers)?;
    let ledger = state.ledger.read().await;
    let (record, bytes) = ledger.document_content(id, &viewer)?;
    Ok((
        [
            (header::CONTENT_TYPE, record.content_type),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", record.file_name),
            ),
        ],
        bytes,
    )
        .into_response())
}

pub async fn delete_document_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<RecordId>,
    Query(guard): Query<ExpectedVersion>,
) -> ApiResult<StatusCode> {
    let viewer = state.viewer(&headers)?;
    let mut ledger = state.ledger.write().await;
    ledger.delete_document(id, guard.expected_version, &viewer)?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// REPLICATION HANDLERS
// =============================================================================
//
// Raw document access for the sync tier. No visibility filtering: these
// endpoints are meant for trusted clients behind the API key.

fn replicated(collection: Collection) -> Result<Collection, TraceError> {
    if collection.is_replicated() {
        Ok(collection)
    } else {
        Err(TraceError::InvalidInput(format!(
            "collection {collection} is not replicated"
        )))
    }
}

pub async fn replication_scan_handler(
    State(state): State<AppState>,
    Path(collection): Path<Collection>,
) -> ApiResult<Json<ReplicationScan>> {
    let collection = replicated(collection)?;
    let ledger = state.ledger.read().await;
    let documents = ledger
        .store()
        .scan(collection)?
        .iter()
        .map(|(id, doc)| ReplicatedDocument::from_stored(*id, doc))
        .collect();
    Ok(Json(ReplicationScan {
        collection,
        documents,
    }))
}

pub async fn replication_get_handler(
    State(state): State<AppState>,
    Path((collection, id)): Path<(Collection, RecordId)>,
) -> ApiResult<Json<ReplicatedDocument>> {
    let collection = replicated(collection)?;
    let ledger = state.ledger.read().await;
    match ledger.store().get(collection, id)? {
        Some(doc) => Ok(Json(ReplicatedDocument::from_stored(id, &doc))),
        None => Err(TraceError::not_found(collection, id).into()),
    }
}

/// Apply a batch with the usual version checks.
pub async fn replication_commit_handler(
    State(state): State<AppState>,
    Json(request): Json<CommitRequest>,
) -> ApiResult<Json<CommitResponse>> {
    let ops = request
        .ops
        .into_iter()
        .map(ReplicationOp::into_write_op)
        .collect::<Result<Vec<WriteOp>, _>>()?;
    let mut ledger = state.ledger.write().await;
    let versions = ledger.commit_replicated(&ops)?;
    tracing::debug!(ops = ops.len(), "replication batch applied");
    Ok(Json(CommitResponse { versions }))
}

/// Only document contents travel through the blob endpoints.
fn document_blob_key(key: String) -> Result<String, TraceError> {
    if key.starts_with("documents/") {
        Ok(key)
    } else {
        Err(TraceError::InvalidInput(format!(
            "blob key must start with documents/: {key:?}"
        )))
    }
}

/// Raw document content by blob key. Answers HEAD as well.
pub async fn replication_blob_get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<Response> {
    let key = document_blob_key(key)?;
    let ledger = state.ledger.read().await;
    match ledger.blob_store().get(&key)? {
        Some(bytes) => Ok((
            [(header::CONTENT_TYPE, "application/octet-stream")],
            bytes,
        )
            .into_response()),
        None => Ok(StatusCode::NOT_FOUND.into_response()),
    }
}

/// Store document content pushed by a sync client.
pub async fn replication_blob_put_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let key = document_blob_key(key)?;
    if body.len() > MAX_DOCUMENT_SIZE {
        return Err(TraceError::InvalidInput(format!(
            "content of {} bytes exceeds maximum {}",
            body.len(),
            MAX_DOCUMENT_SIZE
        ))
        .into());
    }
    let ledger = state.ledger.read().await;
    ledger.blob_store().put(&key, &body)?;
    tracing::debug!(%key, bytes = body.len(), "replicated document content stored");
    Ok(StatusCode::NO_CONTENT)
}
