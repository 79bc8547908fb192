//! # avotrace HTTP API Module
//!
//! This module implements the HTTP REST API server using axum.
//!
//! ## Endpoints
//!
//! - `GET /health`, `GET /status`
//! - `GET|POST /lots`, `GET|DELETE /lots/{id}`
//! - `PUT /lots/{id}/stages`, `POST /lots/{id}/advance|step|rename|duplicate|archive`
//! - `GET /lots/{id}/validation`
//! - `GET /archive`, `GET /archive/{id}`
//! - `GET /export/lots.csv|payroll.csv|inspections.csv`, `POST /export/snapshot`, `GET /hash`
//! - `GET|POST /employees`, `PUT /employees/{id}`, `POST /employees/{id}/deactivate`
//! - `GET|POST /shifts`, `DELETE /shifts/{id}`, `GET /payroll`
//! - `GET|POST /inspections`, `GET /inspections/{id}`
//! - `GET|POST /documents`, `GET|DELETE /documents/{id}`, `GET /documents/{id}/content`
//! - `GET /replication/{collection}`, `GET /replication/{collection}/{id}`,
//!   `POST /replication/commit`, `GET|PUT /replication/blobs/{*key}`
//!
//! ## Security Configuration (Environment Variables)
//!
//! - `AVOTRACE_CORS_ORIGINS`: Comma-separated list of allowed origins, or "*" for all (default: localhost only)
//! - `AVOTRACE_RATE_LIMIT`: Requests per second (default: 100, 0 to disable)
//! - `AVOTRACE_API_KEY`: If set, requires Bearer token authentication

mod auth;
mod handlers;
mod middleware;
mod types;

pub use auth::{USER_HEADER, get_api_key_from_env};
pub use handlers::ApiError;
pub use middleware::{create_rate_limiter, get_rate_limit_from_env};
pub use types::{
    AdvanceResponse, ArchiveListResponse, CommitRequest, CommitResponse, ConflictDetail,
    CreateLotRequest, DuplicateRequest, EmployeeListParams, ErrorResponse, ExpectedVersion,
    HashResponse, HealthResponse, LotFilterParams, LotListParams, LotListResponse, LotView,
    PayrollParams, PayrollResponse, RenameRequest, ReplicatedDocument, ReplicationOp,
    ReplicationScan, ShiftListParams, SnapshotResponse, StageRequest, StatusResponse,
    StepRequest, StepStatus, UpdateEmployeeRequest, UploadParams, ValidationResponse,
};

use avotrace_core::{Ledger, StorageBackend, TraceError, Viewer};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderMap, HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post, put},
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Request body limit. Uploads may be up to 20 MiB plus headroom.
pub const MAX_BODY_SIZE: usize = 25 * 1024 * 1024;

/// Environment variable holding the CORS origins.
const CORS_ORIGINS_ENV: &str = "AVOTRACE_CORS_ORIGINS";

// =============================================================================
// SERVER STATE
// =============================================================================

/// The ledger type the server runs on.
pub type ServerLedger = Ledger<StorageBackend>;

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    /// The ledger, behind a reader/writer lock.
    pub ledger: Arc<RwLock<ServerLedger>>,
    admins: Arc<BTreeSet<String>>,
}

impl AppState {
    /// Create new app state with no administrators.
    #[must_use]
    pub fn new(ledger: ServerLedger) -> Self {
        Self {
            ledger: Arc::new(RwLock::new(ledger)),
            admins: Arc::new(BTreeSet::new()),
        }
    }

    /// Users who see restricted lots of every owner.
    #[must_use]
    pub fn with_admins(mut self, admins: impl IntoIterator<Item = String>) -> Self {
        self.admins = Arc::new(admins.into_iter().collect());
        self
    }

    /// The caller named by the request headers.
    pub fn viewer(&self, headers: &HeaderMap) -> Result<Viewer, TraceError> {
        let user = auth::user_from_headers(headers)?;
        Ok(if self.admins.contains(user.as_str()) {
            Viewer::admin(user)
        } else {
            Viewer::user(user)
        })
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

const ALLOWED_METHODS: [Method; 5] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::OPTIONS,
];

fn with_allowed(cors: CorsLayer) -> CorsLayer {
    cors.allow_methods(ALLOWED_METHODS)
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, USER_HEADER])
}

/// Build CORS layer from `AVOTRACE_CORS_ORIGINS`.
///
/// - "*": allows all origins (development only)
/// - unset: localhost only
/// - otherwise: comma-separated list of allowed origins
fn build_cors_layer() -> CorsLayer {
    let origins_env = std::env::var(CORS_ORIGINS_ENV).ok();

    match origins_env.as_deref() {
        Some("*") => {
            tracing::warn!(
                "CORS: Allowing ALL origins (AVOTRACE_CORS_ORIGINS=*). This is insecure for production!"
            );
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed_origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| {
                    let trimmed = s.trim();
                    match trimmed.parse::<HeaderValue>() {
                        Ok(hv) => {
                            tracing::info!("CORS: Allowing origin: {}", trimmed);
                            Some(hv)
                        }
                        Err(e) => {
                            tracing::warn!("CORS: Invalid origin '{}': {}", trimmed, e);
                            None
                        }
                    }
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::warn!(
                    "CORS: No valid origins in AVOTRACE_CORS_ORIGINS, defaulting to localhost only"
                );
                build_localhost_cors()
            } else {
                with_allowed(CorsLayer::new().allow_origin(allowed_origins))
            }
        }
        None => {
            tracing::info!("CORS: No AVOTRACE_CORS_ORIGINS set, defaulting to localhost only");
            build_localhost_cors()
        }
    }
}

/// Build a restrictive CORS layer that only allows localhost origins.
fn build_localhost_cors() -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8080",
    ]
    .into_iter()
    .filter_map(|o| o.parse::<HeaderValue>().ok())
    .collect();

    with_allowed(CorsLayer::new().allow_origin(origins))
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/status", get(handlers::status_handler))
        // Lots
        .route(
            "/lots",
            get(handlers::list_lots_handler).post(handlers::create_lot_handler),
        )
        .route(
            "/lots/{id}",
            get(handlers::get_lot_handler).delete(handlers::delete_lot_handler),
        )
        .route("/lots/{id}/stages", put(handlers::save_stage_handler))
        .route("/lots/{id}/advance", post(handlers::advance_handler))
        .route("/lots/{id}/step", post(handlers::step_handler))
        .route("/lots/{id}/rename", post(handlers::rename_handler))
        .route("/lots/{id}/duplicate", post(handlers::duplicate_handler))
        .route("/lots/{id}/archive", post(handlers::archive_handler))
        .route("/lots/{id}/validation", get(handlers::validation_handler))
        .route("/archive", get(handlers::list_archive_handler))
        .route("/archive/{id}", get(handlers::get_archived_handler))
        // Exports
        .route("/export/lots.csv", get(handlers::lots_csv_handler))
        .route("/export/payroll.csv", get(handlers::payroll_csv_handler))
        .route(
            "/export/inspections.csv",
            get(handlers::inspections_csv_handler),
        )
        .route("/export/snapshot", post(handlers::snapshot_handler))
        .route("/hash", get(handlers::hash_handler))
        // Personnel
        .route(
            "/employees",
            get(handlers::list_employees_handler).post(handlers::create_employee_handler),
        )
        .route("/employees/{id}", put(handlers::update_employee_handler))
        .route(
            "/employees/{id}/deactivate",
            post(handlers::deactivate_employee_handler),
        )
        .route(
            "/shifts",
            get(handlers::list_shifts_handler).post(handlers::create_shift_handler),
        )
        .route(
            "/shifts/{id}",
            axum::routing::delete(handlers::delete_shift_handler),
        )
        .route("/payroll", get(handlers::payroll_handler))
        // Quality
        .route(
            "/inspections",
            get(handlers::list_inspections_handler).post(handlers::create_inspection_handler),
        )
        .route("/inspections/{id}", get(handlers::get_inspection_handler))
        // Documents
        .route(
            "/documents",
            get(handlers::list_documents_handler).post(handlers::upload_document_handler),
        )
        .route(
            "/documents/{id}",
            get(handlers::get_document_handler).delete(handlers::delete_document_handler),
        )
        .route(
            "/documents/{id}/content",
            get(handlers::document_content_handler),
        )
        // Sync tier
        .route(
            "/replication/commit",
            post(handlers::replication_commit_handler),
        )
        .route(
            "/replication/blobs/{*key}",
            get(handlers::replication_blob_get_handler)
                .put(handlers::replication_blob_put_handler),
        )
        .route(
            "/replication/{collection}",
            get(handlers::replication_scan_handler),
        )
        .route(
            "/replication/{collection}/{id}",
            get(handlers::replication_get_handler),
        )
}

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. Tracing - logs all requests
/// 2. CORS - handles preflight requests
/// 3. Body limit
/// 4. Rate Limiting - protects against DoS (if enabled)
/// 5. Authentication - validates API key (if configured)
pub fn create_router(state: AppState) -> Router {
    let rate_limit = get_rate_limit_from_env();
    let rate_limiter = if rate_limit > 0 {
        tracing::info!("Rate limiting enabled: {} requests/second", rate_limit);
        Some(create_rate_limiter(rate_limit))
    } else {
        tracing::info!("Rate limiting disabled");
        None
    };

    let has_auth = get_api_key_from_env().is_some();
    if has_auth {
        tracing::info!("API key authentication enabled");
    } else {
        tracing::warn!(
            "API key authentication DISABLED - all endpoints are publicly accessible! \
             Set AVOTRACE_API_KEY environment variable to enable authentication."
        );
    }

    let mut router = routes();

    if has_auth {
        router = router.layer(axum_middleware::from_fn(auth::api_key_auth_middleware));
    }

    if let Some(limiter) = rate_limiter {
        router = router.layer(axum_middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit_middleware,
        ));
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors_layer())
                .layer(DefaultBodyLimit::max(MAX_BODY_SIZE)),
        )
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Cannot listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

/// Serve `state` on `addr` until Ctrl+C.
///
/// The caller keeps a clone of `state` to persist the ledger afterwards.
pub async fn run_server(addr: &str, state: AppState) -> Result<(), TraceError> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| TraceError::IoError(format!("Bind failed: {}", e)))?;

    tracing::info!("avotrace HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| TraceError::IoError(format!("Server error: {}", e)))
}
