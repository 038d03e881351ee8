//! Operator-facing read access to the audit ledger.

use axum::{
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::error;
use utoipa::IntoParams;

use crate::audit::AuditAction;
use crate::auth::{authorize, AuthGateway};

use super::{error_response, require_auth, ADMIN_ONLY};

#[derive(Deserialize, IntoParams, Debug)]
pub struct WindowQuery {
    /// Ledger action name, e.g. `LOGIN`.
    pub action: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[utoipa::path(
    get,
    path= "/api/v1/audit/principal/{principal}",
    params(
        ("principal" = String, Path, description = "Principal the events belong to")
    ),
    responses (
        (status = 200, description = "Events for the principal, most recent first", body = Vec<crate::audit::AuditEvent>),
        (status = 401, description = "Missing or invalid bearer token", body = [super::ErrorBody]),
        (status = 403, description = "Caller lacks the required role", body = [super::ErrorBody])
    ),
    security(("bearer" = [])),
    tag= "audit"
)]
// axum handler for audit by principal
pub async fn by_principal(
    gateway: Extension<Arc<AuthGateway>>,
    headers: HeaderMap,
    Path(principal): Path<String>,
) -> Response {
    let caller = match require_auth(&gateway, &headers).await {
        Ok(caller) => caller,
        Err(response) => return response,
    };
    if !authorize(&caller, ADMIN_ONLY) {
        return error_response(StatusCode::FORBIDDEN, "Forbidden");
    }

    match gateway.audit().events_for_principal(&principal).await {
        Ok(events) => (StatusCode::OK, Json(events)).into_response(),
        Err(err) => {
            error!("audit query failed: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Audit query failed")
        }
    }
}

#[utoipa::path(
    get,
    path= "/api/v1/audit",
    params(WindowQuery),
    responses (
        (status = 200, description = "Events for the action inside the window", body = Vec<crate::audit::AuditEvent>),
        (status = 400, description = "Unknown action name", body = [super::ErrorBody]),
        (status = 401, description = "Missing or invalid bearer token", body = [super::ErrorBody]),
        (status = 403, description = "Caller lacks the required role", body = [super::ErrorBody])
    ),
    security(("bearer" = [])),
    tag= "audit"
)]
// axum handler for audit by window
pub async fn by_window(
    gateway: Extension<Arc<AuthGateway>>,
    headers: HeaderMap,
    Query(query): Query<WindowQuery>,
) -> Response {
    let caller = match require_auth(&gateway, &headers).await {
        Ok(caller) => caller,
        Err(response) => return response,
    };
    if !authorize(&caller, ADMIN_ONLY) {
        return error_response(StatusCode::FORBIDDEN, "Forbidden");
    }

    let Ok(action) = query.action.parse::<AuditAction>() else {
        return error_response(StatusCode::BAD_REQUEST, "Unknown audit action");
    };

    match gateway
        .audit()
        .events_by_window(action, query.start, query.end)
        .await
    {
        Ok(events) => (StatusCode::OK, Json(events)).into_response(),
        Err(err) => {
            error!("audit query failed: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Audit query failed")
        }
    }
}
