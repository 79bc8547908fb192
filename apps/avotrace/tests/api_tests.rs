//! Integration tests for the avotrace HTTP API.
//!
//! Uses axum-test to test the API handlers without starting a real server.

// Allow unwrap and panic in tests - these are standard for test code
// Allow holding MutexGuard across await in auth tests - tests are serialized
// intentionally to avoid env var conflicts
#![allow(clippy::unwrap_used, clippy::panic, clippy::await_holding_lock)]

use avotrace::api::{
    AdvanceResponse, ArchiveListResponse, CommitResponse, ErrorResponse, HashResponse,
    HealthResponse, LotListResponse, LotView, PayrollResponse, ReplicationScan,
    SnapshotResponse, StatusResponse, ValidationResponse, create_router, AppState,
};
use avotrace_core::{
    ArchivedLot, DocumentRecord, Employee, Ledger, LotStatus, QualityInspection, RecordId,
    Stage, StorageBackend, Verdict,
};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use serde_json::{Value, json};
use std::sync::Mutex;

/// Mutex to serialize tests since the auth tests modify env vars.
static AUTH_TEST_MUTEX: Mutex<()> = Mutex::new(());

const USER: HeaderName = HeaderName::from_static("x-avotrace-user");

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Guard wrapper that holds the mutex and ensures cleanup on drop.
struct TestGuard {
    _guard: std::sync::MutexGuard<'static, ()>,
}

impl Drop for TestGuard {
    fn drop(&mut self) {
        // SAFETY: Tests run sequentially under AUTH_TEST_MUTEX, so no concurrent env access.
        unsafe { std::env::remove_var("AVOTRACE_API_KEY") };
    }
}

/// Create a test server over a fresh in-memory ledger. `boss` is an
/// administrator. Returns a guard that must be kept alive during the test.
fn create_test_server() -> (TestServer, TestGuard) {
    let guard = AUTH_TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    // SAFETY: Tests run sequentially under AUTH_TEST_MUTEX, so no concurrent env access.
    unsafe { std::env::remove_var("AVOTRACE_API_KEY") };
    let state = AppState::new(Ledger::new(StorageBackend::default()))
        .with_admins(["boss".to_string()]);
    (
        TestServer::new(create_router(state)).unwrap(),
        TestGuard { _guard: guard },
    )
}

fn as_user(name: &str) -> HeaderValue {
    HeaderValue::from_str(name).unwrap()
}

async fn create_lot(server: &TestServer, user: &str, number: &str, visibility: &str) -> LotView {
    let response = server
        .post("/lots")
        .add_header(USER, as_user(user))
        .json(&json!({ "lot_number": number, "visibility": visibility }))
        .await;
    response.assert_status(StatusCode::CREATED);
    response.json()
}

fn stage_records() -> Vec<Value> {
    vec![
        json!({"stage": "harvest", "harvest_date": "2026-03-01", "farmer_id": "F-7"}),
        json!({"stage": "transport", "transport_company": "Andes Cargo", "vehicle_id": "TRK-12",
               "departure_date": "2026-03-01", "temperature_decicelsius": 65}),
        json!({"stage": "sorting", "sorting_date": "2026-03-02", "sorting_line": "L2",
               "accepted_weight_kg": 950}),
        json!({"stage": "packaging", "packaging_date": "2026-03-02", "box_id": "BX-1",
               "box_count": 240, "net_weight_kg": 960, "calibers": ["16", "18"]}),
        json!({"stage": "storage", "storage_date": "2026-03-03", "chamber_id": "C4",
               "temperature_decicelsius": 55}),
        json!({"stage": "export", "export_date": "2026-03-05", "container_number": "MSKU1234567",
               "destination_country": "NL"}),
        json!({"stage": "delivery", "delivery_date": "2026-04-01", "customer_name": "Fresh BV",
               "received_by": "J. de Vries"}),
    ]
}

async fn advance(server: &TestServer, user: &str, id: RecordId, record: &Value) -> AdvanceResponse {
    let response = server
        .post(&format!("/lots/{id}/advance"))
        .add_header(USER, as_user(user))
        .json(&json!({ "record": record }))
        .await;
    response.assert_status_ok();
    response.json()
}

// =============================================================================
// HEALTH / STATUS
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let (server, _guard) = create_test_server();

    let response = server.get("/health").await;

    response.assert_status_ok();
    let health: HealthResponse = response.json();
    assert_eq!(health.status, "ok");
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_status_counts_lots() {
    let (server, _guard) = create_test_server();
    create_lot(&server, "ana", "L-1", "global").await;

    let response = server.get("/status").add_header(USER, as_user("ana")).await;

    response.assert_status_ok();
    let status: StatusResponse = response.json();
    assert_eq!(status.collections["lots"], 1);
    assert_eq!(status.lots.total, 1);
    assert_eq!(status.lots.draft, 1);
}

// =============================================================================
// LOT LIFECYCLE
// =============================================================================

#[tokio::test]
async fn test_create_lot_starts_as_draft() {
    let (server, _guard) = create_test_server();

    let lot = create_lot(&server, "ana", "L-2026-001", "global").await;

    assert_eq!(lot.lot.lot_number, "L-2026-001");
    assert_eq!(lot.lot.status, LotStatus::Draft);
    assert_eq!(lot.completion_percent, 0);
    assert_eq!(lot.next_stage, Some(Stage::Harvest));
    assert_eq!(lot.lot.owner.as_str(), "ana");
}

#[tokio::test]
async fn test_create_lot_with_empty_number_rejected() {
    let (server, _guard) = create_test_server();

    let response = server
        .post("/lots")
        .json(&json!({ "lot_number": "   " }))
        .await;

    response.assert_status_bad_request();
    let error: ErrorResponse = response.json();
    assert!(!error.success);
}

#[tokio::test]
async fn test_three_stages_are_43_percent() {
    let (server, _guard) = create_test_server();
    let lot = create_lot(&server, "ana", "L-43", "global").await;
    let id = lot.lot.id;

    let records = stage_records();
    for record in &records[..3] {
        let result = advance(&server, "ana", id, record).await;
        assert!(result.newly_completed);
        assert!(!result.lot_completed);
    }

    let response = server.get(&format!("/lots/{id}")).await;
    let lot: LotView = response.json();
    assert_eq!(lot.completion_percent, 43);
    assert_eq!(lot.lot.status, LotStatus::InProgress);
    assert_eq!(lot.next_stage, Some(Stage::Packaging));
}

#[tokio::test]
async fn test_completing_delivery_archives_the_lot() {
    let (server, _guard) = create_test_server();
    let lot = create_lot(&server, "ana", "L-FULL", "global").await;
    let id = lot.lot.id;

    let records = stage_records();
    let mut last = None;
    for record in &records {
        last = Some(advance(&server, "ana", id, record).await);
    }
    let last = last.unwrap();
    assert!(last.lot_completed);
    assert!(last.archived);
    assert!(!last.deleted);
    assert_eq!(last.lot.completion_percent, 100);

    let response = server.get("/archive").await;
    response.assert_status_ok();
    let archive: ArchiveListResponse = response.json();
    assert_eq!(archive.count, 1);
    assert_eq!(archive.lots[0].lot.lot_number, "L-FULL");

    let response = server.get(&format!("/archive/{id}")).await;
    let archived: ArchivedLot = response.json();
    assert_eq!(archived.lot.status, LotStatus::Archived);

    // The kept working copy and its archive entry are one lot.
    let status: StatusResponse = server.get("/status").await.json();
    assert_eq!(status.lots.total, 1);
    assert_eq!(status.lots.completed, 1);
    assert_eq!(status.lots.archived, 1);
}

#[tokio::test]
async fn test_incomplete_stage_reports_missing_fields() {
    let (server, _guard) = create_test_server();
    let lot = create_lot(&server, "ana", "L-2", "global").await;

    let response = server
        .post(&format!("/lots/{}/advance", lot.lot.id))
        .json(&json!({ "record": {"stage": "harvest", "harvest_date": "2026-03-01"} }))
        .await;

    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    let error: ErrorResponse = response.json();
    assert_eq!(error.missing, Some(vec!["farmer_id".to_string()]));
}

#[tokio::test]
async fn test_skipping_ahead_is_rejected() {
    let (server, _guard) = create_test_server();
    let lot = create_lot(&server, "ana", "L-3", "global").await;

    let response = server
        .post(&format!("/lots/{}/step", lot.lot.id))
        .json(&json!({ "stage": "export" }))
        .await;

    response.assert_status_bad_request();
}

#[tokio::test]
async fn test_draft_save_keeps_progress() {
    let (server, _guard) = create_test_server();
    let lot = create_lot(&server, "ana", "L-4", "global").await;
    let id = lot.lot.id;

    let response = server
        .put(&format!("/lots/{id}/stages"))
        .json(&json!({ "record": {"stage": "harvest", "farm_name": "La Loma"} }))
        .await;

    response.assert_status_ok();
    let saved: LotView = response.json();
    assert_eq!(saved.completion_percent, 0);
    assert_eq!(saved.lot.stages.harvest.farm_name, "La Loma");

    let response = server.get(&format!("/lots/{id}/validation")).await;
    let validation: ValidationResponse = response.json();
    assert_eq!(validation.steps.len(), 7);
    assert!(!validation.steps[0].completed);
    assert!(validation.steps[0].missing.contains(&"farmer_id".to_string()));
}

#[tokio::test]
async fn test_stale_version_is_a_conflict() {
    let (server, _guard) = create_test_server();
    let lot = create_lot(&server, "ana", "L-5", "global").await;
    let id = lot.lot.id;
    let stale = lot.lot.version;

    let response = server
        .post(&format!("/lots/{id}/rename"))
        .json(&json!({ "lot_number": "L-5A", "expected_version": stale }))
        .await;
    response.assert_status_ok();

    let response = server
        .post(&format!("/lots/{id}/rename"))
        .json(&json!({ "lot_number": "L-5B", "expected_version": stale }))
        .await;

    response.assert_status(StatusCode::CONFLICT);
    let error: ErrorResponse = response.json();
    let conflict = error.conflict.unwrap();
    assert_eq!(conflict.id, id);
    assert_eq!(conflict.expected, Some(stale));
}

#[tokio::test]
async fn test_duplicate_and_delete() {
    let (server, _guard) = create_test_server();
    let lot = create_lot(&server, "ana", "L-6", "global").await;
    let id = lot.lot.id;

    let response = server.post(&format!("/lots/{id}/duplicate")).await;
    response.assert_status(StatusCode::CREATED);
    let copy: LotView = response.json();
    assert_ne!(copy.lot.id, id);
    assert_eq!(copy.lot.lot_number, "L-6-COPY");

    let response = server.delete(&format!("/lots/{id}")).await;
    response.assert_status(StatusCode::NO_CONTENT);

    let response = server.get(&format!("/lots/{id}")).await;
    response.assert_status_not_found();
}

#[tokio::test]
async fn test_list_filters_by_prefix() {
    let (server, _guard) = create_test_server();
    create_lot(&server, "ana", "NORTE-1", "global").await;
    create_lot(&server, "ana", "NORTE-2", "global").await;
    create_lot(&server, "ana", "SUR-1", "global").await;

    let response = server.get("/lots?prefix=NORTE&sort=lot_number&desc=true").await;

    response.assert_status_ok();
    let list: LotListResponse = response.json();
    assert_eq!(list.count, 2);
    assert_eq!(list.lots[0].lot.lot_number, "NORTE-2");
}

#[tokio::test]
async fn test_list_rejects_unknown_status() {
    let (server, _guard) = create_test_server();
    let response = server.get("/lots?status=rotten").await;
    response.assert_status_bad_request();
}

// =============================================================================
// VISIBILITY
// =============================================================================

#[tokio::test]
async fn test_restricted_lot_hidden_from_other_users() {
    let (server, _guard) = create_test_server();
    let lot = create_lot(&server, "ana", "L-PRIV", "restricted").await;
    let id = lot.lot.id;

    let response = server
        .get(&format!("/lots/{id}"))
        .add_header(USER, as_user("luis"))
        .await;
    response.assert_status_not_found();

    let response = server.get("/lots").add_header(USER, as_user("luis")).await;
    let list: LotListResponse = response.json();
    assert_eq!(list.count, 0);

    let response = server
        .get(&format!("/lots/{id}"))
        .add_header(USER, as_user("ana"))
        .await;
    response.assert_status_ok();

    let response = server
        .get(&format!("/lots/{id}"))
        .add_header(USER, as_user("boss"))
        .await;
    response.assert_status_ok();
}

// =============================================================================
// EXPORTS
// =============================================================================

#[tokio::test]
async fn test_lots_csv_export() {
    let (server, _guard) = create_test_server();
    create_lot(&server, "ana", "L-CSV", "global").await;

    let response = server.get("/export/lots.csv").await;

    response.assert_status_ok();
    assert!(
        response
            .header("content-type")
            .to_str()
            .unwrap()
            .starts_with("text/csv")
    );
    let text = response.text();
    let mut lines = text.lines();
    assert!(lines.next().unwrap().starts_with("lot_number,status"));
    assert!(lines.next().unwrap().starts_with("L-CSV,draft"));
}

#[tokio::test]
async fn test_snapshot_requires_admin() {
    let (server, _guard) = create_test_server();
    create_lot(&server, "ana", "L-SNAP", "restricted").await;

    let response = server
        .post("/export/snapshot")
        .add_header(USER, as_user("ana"))
        .await;
    response.assert_status(StatusCode::FORBIDDEN);

    let response = server
        .post("/export/snapshot")
        .add_header(USER, as_user("boss"))
        .await;
    response.assert_status_ok();
    let snapshot: SnapshotResponse = response.json();
    assert!(snapshot.size_bytes > 0);
    assert!(!snapshot.data.is_empty());

    let response = server.get("/hash").await;
    let hash: HashResponse = response.json();
    assert_eq!(hash.algorithm, "blake3");
    assert_eq!(hash.hash.len(), 64);
    assert_eq!(hash.checksum, snapshot.checksum);
}

// =============================================================================
// PERSONNEL
// =============================================================================

#[tokio::test]
async fn test_employee_rate_above_cap_rejected() {
    let (server, _guard) = create_test_server();

    let response = server
        .post("/employees")
        .json(&json!({
            "full_name": "Rosa Quispe",
            "document_number": "40112233",
            "hourly_rate_cents": u64::MAX / 2
        }))
        .await;

    response.assert_status_bad_request();
    let employees: Vec<Employee> = server.get("/employees").await.json();
    assert!(employees.is_empty());
}

#[tokio::test]
async fn test_payroll_with_overtime() {
    let (server, _guard) = create_test_server();

    let response = server
        .post("/employees")
        .json(&json!({
            "full_name": "Rosa Quispe",
            "document_number": "40112233",
            "role": "packer",
            "hourly_rate_cents": 1000
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let employee: Employee = response.json();

    // 10 hours with a 60 minute break: 540 minutes, 60 of them overtime.
    let response = server
        .post("/shifts")
        .json(&json!({
            "employee_id": employee.id,
            "date": "2026-03-02",
            "start": "07:00:00",
            "end": "17:00:00",
            "break_minutes": 60
        }))
        .await;
    response.assert_status(StatusCode::CREATED);

    let response = server
        .get("/payroll?from=2026-03-01&to=2026-03-31")
        .await;
    response.assert_status_ok();
    let payroll: PayrollResponse = response.json();
    assert_eq!(payroll.summaries.len(), 1);
    let summary = &payroll.summaries[0];
    assert_eq!(summary.regular_minutes, 480);
    assert_eq!(summary.overtime_minutes, 60);
    assert_eq!(summary.gross_pay_cents, 8000 + 1500);
    assert_eq!(payroll.total_gross_cents, summary.gross_pay_cents);
}

#[tokio::test]
async fn test_deactivated_employee_hidden_from_active_list() {
    let (server, _guard) = create_test_server();
    let response = server
        .post("/employees")
        .json(&json!({
            "full_name": "Mario Paz",
            "document_number": "40998877",
            "role": "driver",
            "hourly_rate_cents": 1200
        }))
        .await;
    let employee: Employee = response.json();

    let response = server
        .post(&format!("/employees/{}/deactivate", employee.id))
        .await;
    response.assert_status_ok();

    let response = server.get("/employees?active_only=true").await;
    let active: Vec<Employee> = response.json();
    assert!(active.is_empty());

    let response = server.get("/employees").await;
    let all: Vec<Employee> = response.json();
    assert_eq!(all.len(), 1);
    assert!(!all[0].active);
}

// =============================================================================
// QUALITY / DOCUMENTS
// =============================================================================

#[tokio::test]
async fn test_inspection_takes_lot_number_from_lot() {
    let (server, _guard) = create_test_server();
    let lot = create_lot(&server, "ana", "L-QC", "global").await;

    let response = server
        .post("/inspections")
        .json(&json!({
            "lot_id": lot.lot.id,
            "inspected_on": "2026-03-02",
            "inspector": "QA-1",
            "sample_size": 100
        }))
        .await;

    response.assert_status(StatusCode::CREATED);
    let inspection: QualityInspection = response.json();
    assert_eq!(inspection.lot_number, "L-QC");
    assert_eq!(inspection.defect_permille, 0);
    assert_eq!(inspection.verdict, Verdict::Approved);
}

#[tokio::test]
async fn test_document_upload_and_download() {
    let (server, _guard) = create_test_server();
    let lot = create_lot(&server, "ana", "L-DOC", "global").await;

    let response = server
        .post(&format!(
            "/documents?file_name=phyto.pdf&lot_id={}",
            lot.lot.id
        ))
        .content_type("application/pdf")
        .bytes(bytes::Bytes::from_static(b"%PDF-1.7 certificate"))
        .await;
    response.assert_status(StatusCode::CREATED);
    let record: DocumentRecord = response.json();
    assert_eq!(record.file_name, "phyto.pdf");
    assert_eq!(record.size_bytes, 20);

    let response = server
        .get(&format!("/documents/{}/content", record.id))
        .await;
    response.assert_status_ok();
    assert_eq!(response.header("content-type"), "application/pdf");
    assert_eq!(response.as_bytes().as_ref(), b"%PDF-1.7 certificate");

    let response = server
        .get(&format!("/documents?lot_id={}", lot.lot.id))
        .await;
    let documents: Vec<DocumentRecord> = response.json();
    assert_eq!(documents.len(), 1);
}

#[tokio::test]
async fn test_document_path_in_name_rejected() {
    let (server, _guard) = create_test_server();

    let response = server
        .post("/documents?file_name=../etc/passwd")
        .bytes(bytes::Bytes::from_static(b"x"))
        .await;

    response.assert_status_bad_request();
}

// =============================================================================
// REPLICATION
// =============================================================================

#[tokio::test]
async fn test_replication_scan_and_versioned_commit() {
    let (server, _guard) = create_test_server();
    let lot = create_lot(&server, "ana", "L-REP", "restricted").await;
    let id = lot.lot.id;

    // The sync tier sees every document, restricted or not.
    let response = server.get("/replication/lots").await;
    response.assert_status_ok();
    let scan: ReplicationScan = response.json();
    assert_eq!(scan.documents.len(), 1);
    let doc = &scan.documents[0];
    assert_eq!(doc.id, id);

    let put = |base: u64| {
        json!({ "ops": [{
            "op": "put",
            "collection": "lots",
            "id": id,
            "base": base,
            "body": doc.body,
        }]})
    };

    let response = server.post("/replication/commit").json(&put(doc.version)).await;
    response.assert_status_ok();
    let committed: CommitResponse = response.json();
    assert_eq!(committed.versions, vec![doc.version + 1]);

    let response = server.post("/replication/commit").json(&put(doc.version)).await;
    response.assert_status(StatusCode::CONFLICT);
    let error: ErrorResponse = response.json();
    let conflict = error.conflict.unwrap();
    assert_eq!(conflict.found, Some(doc.version + 1));
}

#[tokio::test]
async fn test_replicated_document_readable_after_content_upload() {
    let (origin, _guard) = create_test_server();
    let response = origin
        .post("/documents?file_name=bill%20of%20lading.pdf")
        .content_type("application/pdf")
        .bytes(bytes::Bytes::from_static(b"%PDF-1.4 BL-778"))
        .await;
    response.assert_status(StatusCode::CREATED);
    let record: DocumentRecord = response.json();

    let scan: ReplicationScan = origin.get("/replication/documents").await.json();
    let doc = &scan.documents[0];

    let hub = TestServer::new(create_router(AppState::new(Ledger::new(
        StorageBackend::default(),
    ))))
    .unwrap();
    hub.post("/replication/commit")
        .json(&json!({ "ops": [{
            "op": "put",
            "collection": "documents",
            "id": doc.id,
            "base": null,
            "body": doc.body,
        }]}))
        .await
        .assert_status_ok();

    let blob_path = format!("/replication/blobs/documents/{}/bill%20of%20lading.pdf", record.id);
    let response = origin.get(&blob_path).await;
    response.assert_status_ok();
    let content = response.as_bytes().clone();

    hub.get(&blob_path).await.assert_status(StatusCode::NOT_FOUND);
    hub.put(&blob_path)
        .bytes(content)
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let response = hub.get(&format!("/documents/{}/content", record.id)).await;
    response.assert_status_ok();
    assert_eq!(response.header("content-type"), "application/pdf");
    assert_eq!(response.as_bytes().as_ref(), b"%PDF-1.4 BL-778");
}

#[tokio::test]
async fn test_replicated_document_delete_removes_content() {
    let (server, _guard) = create_test_server();
    let response = server
        .post("/documents?file_name=phyto.pdf")
        .bytes(bytes::Bytes::from_static(b"%PDF"))
        .await;
    let record: DocumentRecord = response.json();
    let blob_path = format!("/replication/blobs/{}", record.blob_key);
    server.get(&blob_path).await.assert_status_ok();

    server
        .post("/replication/commit")
        .json(&json!({ "ops": [{
            "op": "delete",
            "collection": "documents",
            "id": record.id,
            "expected": record.version,
        }]}))
        .await
        .assert_status_ok();

    server.get(&blob_path).await.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_replication_blobs_limited_to_documents() {
    let (server, _guard) = create_test_server();

    let response = server
        .put("/replication/blobs/config/avotrace.toml")
        .bytes(bytes::Bytes::from_static(b"x"))
        .await;

    response.assert_status_bad_request();
}

#[tokio::test]
async fn test_replication_refuses_bookkeeping_collections() {
    let (server, _guard) = create_test_server();

    let response = server.get("/replication/outbox").await;

    response.assert_status_bad_request();
}

// =============================================================================
// AUTHENTICATION
// =============================================================================

/// Create a test server with authentication enabled.
fn create_auth_test_server(api_key: &str) -> (TestServer, TestGuard) {
    let guard = AUTH_TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    // SAFETY: Tests run sequentially under AUTH_TEST_MUTEX, so no concurrent env access.
    unsafe { std::env::set_var("AVOTRACE_API_KEY", api_key) };
    let state = AppState::new(Ledger::new(StorageBackend::default()));
    (
        TestServer::new(create_router(state)).unwrap(),
        TestGuard { _guard: guard },
    )
}

#[tokio::test]
async fn test_auth_valid_bearer_token() {
    let (server, _guard) = create_auth_test_server("packhouse-key");

    let response = server
        .get("/lots")
        .add_header(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer packhouse-key"),
        )
        .await;

    response.assert_status_ok();
}

#[tokio::test]
async fn test_auth_invalid_token_rejected() {
    let (server, _guard) = create_auth_test_server("packhouse-key");

    let response = server
        .get("/lots")
        .add_header(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer wrong-key"),
        )
        .await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_missing_header_rejected() {
    let (server, _guard) = create_auth_test_server("packhouse-key");

    let response = server.get("/status").await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_health_endpoint_bypasses_auth() {
    let (server, _guard) = create_auth_test_server("packhouse-key");

    let response = server.get("/health").await;

    response.assert_status_ok();
}
