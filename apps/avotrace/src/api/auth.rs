//! # Authentication Module
//!
//! API key authentication and caller identity for the avotrace HTTP API.
//!
//! ## Configuration
//!
//! - `AVOTRACE_API_KEY`: If set, all requests (except /health) require this key
//!
//! ## Usage
//!
//! ```text
//! Authorization: Bearer <your-api-key>
//! X-Avotrace-User: maria
//! ```
//!
//! The key authenticates the client application; the user header names the
//! person acting through it and decides what restricted lots they see.

use avotrace_core::{TraceError, UserId};
use axum::{
    body::Body,
    http::{HeaderMap, HeaderName, Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "AVOTRACE_API_KEY";

/// Header naming the acting user.
pub const USER_HEADER: HeaderName = HeaderName::from_static("x-avotrace-user");

/// User assumed when the header is absent.
pub const ANONYMOUS_USER: &str = "anonymous";

// =============================================================================
// API KEY AUTHENTICATION
// =============================================================================

/// Get API key from environment variable.
///
/// Returns `Some(key)` if `AVOTRACE_API_KEY` is set and non-empty,
/// `None` otherwise (disabling authentication).
pub fn get_api_key_from_env() -> Option<String> {
    std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty())
}

/// Compare two keys in constant time.
///
/// Both are padded to the same length so the comparison always runs over
/// the same number of bytes.
fn keys_match(provided: &str, expected: &str) -> bool {
    let provided_bytes = provided.as_bytes();
    let expected_bytes = expected.as_bytes();

    let max_len = provided_bytes.len().max(expected_bytes.len());
    let mut padded_provided = vec![0u8; max_len];
    let mut padded_expected = vec![0u8; max_len];
    padded_provided[..provided_bytes.len()].copy_from_slice(provided_bytes);
    padded_expected[..expected_bytes.len()].copy_from_slice(expected_bytes);

    let bytes_match: bool = padded_provided.ct_eq(&padded_expected).into();
    bytes_match && provided_bytes.len() == expected_bytes.len()
}

/// API key authentication middleware.
///
/// If `AVOTRACE_API_KEY` is set:
/// - `/health` endpoint is always allowed (for load balancer health checks)
/// - All other endpoints require `Authorization: Bearer <key>` header
///
/// If `AVOTRACE_API_KEY` is not set, all requests are allowed.
pub async fn api_key_auth_middleware(
    request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, &'static str)> {
    let Some(expected) = get_api_key_from_env() else {
        return Ok(next.run(request).await);
    };

    if request.uri().path() == "/health" {
        return Ok(next.run(request).await);
    }

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match auth_header {
        Some(header_value) => {
            // Both "Bearer <key>" and a raw "<key>" are accepted.
            let provided = header_value.strip_prefix("Bearer ").unwrap_or(header_value);
            if keys_match(provided, &expected) {
                Ok(next.run(request).await)
            } else {
                tracing::warn!(
                    event = "auth_failure",
                    reason = "invalid_api_key",
                    "Authentication failed: invalid API key"
                );
                Err((StatusCode::UNAUTHORIZED, "Unauthorized"))
            }
        }
        None => {
            tracing::warn!(
                event = "auth_failure",
                reason = "missing_authorization_header",
                "Missing Authorization header"
            );
            Err((StatusCode::UNAUTHORIZED, "Unauthorized"))
        }
    }
}

// =============================================================================
// CALLER IDENTITY
// =============================================================================

/// The user named by `X-Avotrace-User`, or `anonymous`.
pub fn user_from_headers(headers: &HeaderMap) -> Result<UserId, TraceError> {
    match headers.get(&USER_HEADER) {
        None => UserId::new(ANONYMOUS_USER),
        Some(value) => {
            let name = value.to_str().map_err(|_| {
                TraceError::InvalidInput("X-Avotrace-User must be visible ASCII".to_string())
            })?;
            UserId::new(name)
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
