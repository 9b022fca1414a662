//! HTTP routes for magic links and passport lifecycle
//!
//! - POST /api/v1/magic-links                       - Request a magic link
//! - POST /api/v1/passports/{id}/transition         - Act with a magic link
//! - GET  /api/v1/actions?token=...                 - What may this link do?
//! - GET  /api/v1/passports/{id}/events             - Audit trail
//! - POST /api/v1/admin/passports/bulk-transition   - Bulk move (admin key)

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{error, info};

use crate::audit::LifecycleEvent;
use crate::auth::{extract_token_from_header, extract_token_from_query};
use crate::lifecycle::PassportStatus;
use crate::server::AppState;
use crate::services::{LinkRequest, LinkRequestOutcome, MAX_BULK_ASSETS};
use crate::types::{GateError, AUTH_FAILURE_MESSAGE};

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Largest accepted request body
const MAX_BODY_BYTES: usize = 10240;

/// Per-id allowance for bulk bodies: a quoted UUID, comma and whitespace
const BULK_BYTES_PER_ASSET: usize = 64;

/// Largest accepted bulk body, sized so a full batch of ids fits
const MAX_BULK_BODY_BYTES: usize = MAX_BODY_BYTES + MAX_BULK_ASSETS * BULK_BYTES_PER_ASSET;

/// Header carrying the admin key
pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub to_status: String,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
pub struct BulkTransitionRequest {
    pub asset_ids: Vec<String>,
    pub to_status: String,
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_transitions: Option<Vec<PassportStatus>>,
    /// Set when the transition was stored despite the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_status: Option<PassportStatus>,
}

#[derive(Debug, Serialize)]
struct LinkRejectedResponse {
    error: String,
    requires_code: bool,
}

#[derive(Debug, Serialize)]
struct EventsResponse {
    asset_id: String,
    events: Vec<LifecycleEvent>,
}

// =============================================================================
// Helpers
// =============================================================================

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<BoxBody> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
        .header(
            "Access-Control-Allow-Headers",
            "Content-Type, Authorization, X-Admin-Key",
        )
        .body(full_body(json))
        .unwrap()
}

/// JSON error body for a [`GateError`]. Server faults are logged with their
/// detail; the client only sees the safe message.
pub(crate) fn error_response(err: &GateError) -> Response<BoxBody> {
    if err.is_server_error() {
        error!(error = %err, "Request failed");
    }

    json_response(
        err.status_code(),
        &ErrorResponse {
            error: err.client_message(),
            code: Some(err.code()),
            allowed_transitions: err.allowed_transitions().map(<[PassportStatus]>::to_vec),
            new_status: err.applied_status(),
        },
    )
}

fn cors_preflight() -> Response<BoxBody> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
        .header(
            "Access-Control-Allow-Headers",
            "Content-Type, Authorization, X-Admin-Key",
        )
        .header("Access-Control-Max-Age", "86400")
        .body(empty_body())
        .unwrap()
}

fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

fn empty_body() -> BoxBody {
    Full::new(Bytes::new())
        .map_err(|never| match never {})
        .boxed()
}

async fn parse_json_body<T: for<'de> Deserialize<'de>>(
    req: Request<hyper::body::Incoming>,
    limit: usize,
) -> Result<T, GateError> {
    let body = req
        .collect()
        .await
        .map_err(|e| GateError::Validation(format!("Failed to read body: {}", e)))?;

    decode_json_body(&body.to_bytes(), limit)
}

fn decode_json_body<T: for<'de> Deserialize<'de>>(bytes: &[u8], limit: usize) -> Result<T, GateError> {
    if bytes.len() > limit {
        return Err(GateError::Validation("Request body too large".into()));
    }

    serde_json::from_slice(bytes).map_err(|e| GateError::Validation(format!("Invalid JSON: {}", e)))
}

fn get_auth_header(req: &Request<hyper::body::Incoming>) -> Option<&str> {
    req.headers()
        .get(hyper::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}

/// Passport id from `/api/v1/passports/{id}/{action}`
fn passport_route(path: &str) -> Option<(&str, &str)> {
    let rest = path.strip_prefix("/api/v1/passports/")?;
    let (id, action) = rest.split_once('/')?;
    if id.is_empty() || action.contains('/') {
        return None;
    }
    Some((id, action))
}

/// Admin endpoints are open unless an admin key is configured
fn is_admin(req: &Request<hyper::body::Incoming>, state: &AppState) -> bool {
    let Some(expected) = state.args.admin_api_key.as_deref() else {
        return true;
    };
    req.headers()
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|given| admin_key_matches(given, expected))
}

/// Compare SHA-256 digests so neither length nor content leaks through timing
fn admin_key_matches(given: &str, expected: &str) -> bool {
    let given = Sha256::digest(given.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());

    let mut diff = 0u8;
    for (x, y) in given.iter().zip(expected.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

// =============================================================================
// Route Handlers
// =============================================================================

/// POST /api/v1/magic-links
async fn handle_request_link(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let body: LinkRequest = match parse_json_body(req, MAX_BODY_BYTES).await {
        Ok(b) => b,
        Err(e) => return error_response(&e),
    };

    match state.service.request_link(body).await {
        Ok(LinkRequestOutcome::Issued(link)) => json_response(StatusCode::CREATED, &link),
        Ok(LinkRequestOutcome::Rejected {
            reason,
            requires_code,
        }) => json_response(
            StatusCode::FORBIDDEN,
            &LinkRejectedResponse {
                error: reason,
                requires_code,
            },
        ),
        Err(e) => error_response(&e),
    }
}

/// POST /api/v1/passports/{id}/transition
async fn handle_transition(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    asset_id: String,
) -> Response<BoxBody> {
    let Some(token) = extract_token_from_header(get_auth_header(&req)).map(str::to_string) else {
        return error_response(&GateError::Auth("missing bearer token".into()));
    };

    let body: TransitionRequest = match parse_json_body(req, MAX_BODY_BYTES).await {
        Ok(b) => b,
        Err(e) => return error_response(&e),
    };
    let to: PassportStatus = match body.to_status.parse() {
        Ok(s) => s,
        Err(e) => return error_response(&e),
    };

    match state
        .service
        .act_with_link(&token, &asset_id, to, body.metadata)
        .await
    {
        Ok(result) => json_response(StatusCode::OK, &result),
        Err(e) => error_response(&e),
    }
}

/// GET /api/v1/actions?token=...
async fn handle_actions(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let token = extract_token_from_query(req.uri().query())
        .or_else(|| extract_token_from_header(get_auth_header(&req)).map(str::to_string));
    let Some(token) = token else {
        return json_response(
            StatusCode::UNAUTHORIZED,
            &ErrorResponse {
                error: AUTH_FAILURE_MESSAGE.into(),
                code: Some("AUTH_ERROR"),
                allowed_transitions: None,
                new_status: None,
            },
        );
    };

    match state.service.action_info(&token).await {
        Ok(info) => json_response(StatusCode::OK, &info),
        Err(e) => error_response(&e),
    }
}

/// GET /api/v1/passports/{id}/events
async fn handle_events(state: Arc<AppState>, asset_id: String) -> Response<BoxBody> {
    match state.service.passport_events(&asset_id).await {
        Ok(events) => json_response(StatusCode::OK, &EventsResponse { asset_id, events }),
        Err(e) => error_response(&e),
    }
}

/// POST /api/v1/admin/passports/bulk-transition
async fn handle_bulk_transition(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    if !is_admin(&req, &state) {
        return json_response(
            StatusCode::UNAUTHORIZED,
            &ErrorResponse {
                error: "admin key required".into(),
                code: Some("AUTH_ERROR"),
                allowed_transitions: None,
                new_status: None,
            },
        );
    }

    let body: BulkTransitionRequest = match parse_json_body(req, MAX_BULK_BODY_BYTES).await {
        Ok(b) => b,
        Err(e) => return error_response(&e),
    };
    let to: PassportStatus = match body.to_status.parse() {
        Ok(s) => s,
        Err(e) => return error_response(&e),
    };

    info!(count = body.asset_ids.len(), to = %to, "Bulk transition requested");

    match state
        .service
        .bulk_transition(&body.asset_ids, to, body.actor.as_deref(), body.metadata)
        .await
    {
        Ok(report) => json_response(StatusCode::OK, &report),
        Err(e) => error_response(&e),
    }
}

/// Handle `/api/v1/*` requests.
///
/// Returns Some(response) if the request was handled, None if not an API route.
pub async fn handle_api_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Option<Response<BoxBody>> {
    let path = req.uri().path().to_string();
    let method = req.method().clone();

    if !path.starts_with("/api/v1/") {
        return None;
    }

    if method == Method::OPTIONS {
        return Some(cors_preflight());
    }

    let response = match (&method, path.as_str()) {
        (&Method::POST, "/api/v1/magic-links") => handle_request_link(req, state).await,
        (&Method::GET, "/api/v1/actions") => handle_actions(req, state).await,
        (&Method::POST, "/api/v1/admin/passports/bulk-transition") => {
            handle_bulk_transition(req, state).await
        }
        (_, "/api/v1/magic-links")
        | (_, "/api/v1/actions")
        | (_, "/api/v1/admin/passports/bulk-transition") => method_not_allowed(),
        _ => match passport_route(&path) {
            Some((id, "transition")) if method == Method::POST => {
                handle_transition(req, state, id.to_string()).await
            }
            Some((id, "events")) if method == Method::GET => {
                handle_events(state, id.to_string()).await
            }
            Some((_, "transition")) | Some((_, "events")) => method_not_allowed(),
            _ => json_response(
                StatusCode::NOT_FOUND,
                &ErrorResponse {
                    error: "API endpoint not found".into(),
                    code: Some("NOT_FOUND"),
                    allowed_transitions: None,
                    new_status: None,
                },
            ),
        },
    };

    Some(response)
}

fn method_not_allowed() -> Response<BoxBody> {
    json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        &ErrorResponse {
            error: "Method not allowed".into(),
            code: None,
            allowed_transitions: None,
            new_status: None,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passport_route() {
        assert_eq!(
            passport_route("/api/v1/passports/p-1/transition"),
            Some(("p-1", "transition"))
        );
        assert_eq!(
            passport_route("/api/v1/passports/p-1/events"),
            Some(("p-1", "events"))
        );
        assert_eq!(passport_route("/api/v1/passports//events"), None);
        assert_eq!(passport_route("/api/v1/passports/p-1"), None);
        assert_eq!(passport_route("/api/v1/passports/p-1/events/extra"), None);
        assert_eq!(passport_route("/api/v1/actions"), None);
    }

    #[tokio::test]
    async fn test_error_response_shape() {
        let err = GateError::InvalidTransition {
            from: PassportStatus::Active,
            to: PassportStatus::Recycled,
            allowed: vec![PassportStatus::Shipped, PassportStatus::Recalled],
        };
        let response = error_response(&err);
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "INVALID_TRANSITION");
        assert_eq!(
            body["allowed_transitions"],
            serde_json::json!(["SHIPPED", "RECALLED"])
        );
    }

    #[test]
    fn test_full_bulk_batch_fits_body_limit() {
        let ids: Vec<String> = (0..MAX_BULK_ASSETS)
            .map(|_| uuid::Uuid::new_v4().to_string())
            .collect();
        let body = serde_json::to_vec_pretty(&serde_json::json!({
            "asset_ids": ids,
            "to_status": "RECALLED",
            "actor": "recall-desk@maker.com",
            "metadata": { "campaign": "2026-Q3 cell defect" },
        }))
        .unwrap();
        assert!(body.len() > MAX_BODY_BYTES);

        let parsed: BulkTransitionRequest = decode_json_body(&body, MAX_BULK_BODY_BYTES).unwrap();
        assert_eq!(parsed.asset_ids.len(), MAX_BULK_ASSETS);
        assert!(matches!(
            decode_json_body::<BulkTransitionRequest>(&body, MAX_BODY_BYTES),
            Err(GateError::Validation(_))
        ));
    }

    #[test]
    fn test_admin_key_matches() {
        assert!(admin_key_matches("s3cret-admin", "s3cret-admin"));
        assert!(!admin_key_matches("s3cret-admin", "s3cret-admiN"));
        assert!(!admin_key_matches("s3cret", "s3cret-admin"));
        assert!(!admin_key_matches("", "s3cret-admin"));
    }

    #[tokio::test]
    async fn test_permission_denied_lists_role_transitions() {
        let err = GateError::PermissionDenied {
            role: crate::auth::ActorRole::Logistics,
            from: PassportStatus::Active,
            to: PassportStatus::Recalled,
            allowed: vec![PassportStatus::Shipped],
        };
        let response = error_response(&err);
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "PERMISSION_DENIED");
        assert_eq!(body["allowed_transitions"], serde_json::json!(["SHIPPED"]));
    }

    #[tokio::test]
    async fn test_audit_pending_reports_new_status() {
        let err = GateError::AuditPending {
            passport_id: "p-1".into(),
            new_status: PassportStatus::Shipped,
            event_id: "evt-1".into(),
        };
        let response = error_response(&err);
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "AUDIT_PENDING");
        assert_eq!(body["new_status"], "SHIPPED");
    }

    #[tokio::test]
    async fn test_auth_error_hides_reason() {
        let response = error_response(&GateError::Auth("token expired".into()));
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], AUTH_FAILURE_MESSAGE);
    }

    #[tokio::test]
    async fn test_persistence_error_is_generic() {
        let response = error_response(&GateError::Persistence("connection refused".into()));
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(!text.contains("connection refused"));
    }
}
