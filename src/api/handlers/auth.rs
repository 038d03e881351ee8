//! Authentication routes: token exchange, refresh, logout, introspection
//! and the caller's own identity.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, sync::Arc};
use utoipa::ToSchema;

use crate::auth::{AuthGateway, TokenBundle};

use super::{extract_client_ip, failure_response, require_auth};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LogoutRequest {
    pub refresh_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct IntrospectRequest {
    pub token: String,
}

/// The caller's identity as the gateway sees it.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct WhoAmI {
    pub subject: String,
    pub preferred_name: String,
    pub authorities: BTreeSet<String>,
}

#[utoipa::path(
    post,
    path= "/api/v1/auth/login",
    request_body = LoginRequest,
    responses (
        (status = 200, description = "Token bundle issued", body = [TokenBundle]),
        (status = 401, description = "Invalid credentials", body = [super::ErrorBody]),
        (status = 503, description = "Identity provider unavailable", body = [super::ErrorBody])
    ),
    tag= "auth"
)]
// axum handler for login
pub async fn login(
    gateway: Extension<Arc<AuthGateway>>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> Response {
    let source_ip = extract_client_ip(&headers);
    match gateway
        .login(&payload.username, &payload.password, source_ip)
        .await
    {
        Ok(bundle) => (StatusCode::OK, Json(bundle)).into_response(),
        Err(failure) => failure_response(&failure),
    }
}

#[utoipa::path(
    post,
    path= "/api/v1/auth/refresh",
    request_body = RefreshRequest,
    responses (
        (status = 200, description = "Token bundle rotated", body = [TokenBundle]),
        (status = 401, description = "Invalid or expired refresh token", body = [super::ErrorBody]),
        (status = 503, description = "Identity provider unavailable", body = [super::ErrorBody])
    ),
    tag= "auth"
)]
// axum handler for refresh
pub async fn refresh(
    gateway: Extension<Arc<AuthGateway>>,
    Json(payload): Json<RefreshRequest>,
) -> Response {
    match gateway.refresh(&payload.refresh_token).await {
        Ok(bundle) => (StatusCode::OK, Json(bundle)).into_response(),
        Err(failure) => failure_response(&failure),
    }
}

#[utoipa::path(
    post,
    path= "/api/v1/auth/logout",
    request_body = LogoutRequest,
    responses (
        (status = 204, description = "Refresh token revoked"),
        (status = 401, description = "Invalid or expired refresh token", body = [super::ErrorBody]),
        (status = 503, description = "Identity provider unavailable", body = [super::ErrorBody])
    ),
    security(("bearer" = [])),
    tag= "auth"
)]
// axum handler for logout
pub async fn logout(
    gateway: Extension<Arc<AuthGateway>>,
    headers: HeaderMap,
    Json(payload): Json<LogoutRequest>,
) -> Response {
    let principal = match require_auth(&gateway, &headers).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };

    match gateway
        .logout(&payload.refresh_token, &principal.preferred_name)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(failure) => failure_response(&failure),
    }
}

#[utoipa::path(
    post,
    path= "/api/v1/auth/introspect",
    request_body = IntrospectRequest,
    responses (
        (status = 200, description = "Provider claims, verbatim, including the active flag"),
        (status = 502, description = "Identity provider returned an invalid response", body = [super::ErrorBody]),
        (status = 503, description = "Identity provider unavailable", body = [super::ErrorBody])
    ),
    tag= "auth"
)]
// axum handler for introspect
pub async fn introspect(
    gateway: Extension<Arc<AuthGateway>>,
    Json(payload): Json<IntrospectRequest>,
) -> Response {
    match gateway.introspect(&payload.token).await {
        Ok(claims) => (StatusCode::OK, Json(claims)).into_response(),
        Err(failure) => failure_response(&failure),
    }
}

#[utoipa::path(
    get,
    path= "/api/v1/auth/me",
    responses (
        (status = 200, description = "The caller's normalized identity", body = [WhoAmI]),
        (status = 401, description = "Missing or invalid bearer token", body = [super::ErrorBody])
    ),
    security(("bearer" = [])),
    tag= "auth"
)]
// axum handler for me
pub async fn me(gateway: Extension<Arc<AuthGateway>>, headers: HeaderMap) -> Response {
    match require_auth(&gateway, &headers).await {
        Ok(principal) => (
            StatusCode::OK,
            Json(WhoAmI {
                subject: principal.subject,
                preferred_name: principal.preferred_name,
                authorities: principal.authorities,
            }),
        )
            .into_response(),
        Err(response) => response,
    }
}
