//! User administration routes, passed through to the identity provider.
//! Every mutation lands in the audit ledger with the acting principal.

use axum::{
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

use crate::audit::{AuditAction, AuditEvent, AuditResult};
use crate::auth::{authorize, authorize_self_or, AuthGateway, Principal};
use crate::keycloak::admin::{AdminError, NewUser, UserAccount, UserUpdate};
use crate::keycloak::KeycloakClient;

use super::{
    error_response, extract_client_ip, extract_user_agent, require_auth, ADMIN_ONLY,
    USER_MANAGEMENT,
};

pub fn admin_error_response(err: &AdminError) -> Response {
    match err {
        AdminError::Conflict(what) => error_response(StatusCode::CONFLICT, what),
        AdminError::NotFound(what) => error_response(StatusCode::NOT_FOUND, what),
        AdminError::Unavailable(_) => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "Identity provider unavailable",
        ),
        AdminError::Unexpected(_) => error_response(
            StatusCode::BAD_GATEWAY,
            "Identity provider returned an invalid response",
        ),
    }
}

/// Ledger entry for an administrative action, attributed to the caller.
/// Every admin mutation records an event for both outcomes; failed
/// attempts are as interesting to an auditor as successful ones.
pub(super) fn record_admin_event(
    gateway: &AuthGateway,
    caller: &Principal,
    headers: &HeaderMap,
    action: AuditAction,
    result: AuditResult,
    resource: &str,
) {
    gateway.record_detached(
        AuditEvent::new(action, caller.preferred_name.clone(), result)
            .with_source_ip(extract_client_ip(headers))
            .with_user_agent(extract_user_agent(headers))
            .with_resource(resource),
    );
}

#[derive(Deserialize, IntoParams, Debug)]
pub struct ListQuery {
    /// Offset of the first record, provider-side paging.
    #[serde(default)]
    pub first: u32,
    #[serde(default = "default_page_size")]
    pub max: u32,
    /// Free-text search; when present, paging parameters are ignored.
    pub search: Option<String>,
}

fn default_page_size() -> u32 {
    20
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct StatusUpdate {
    pub enabled: bool,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct PasswordReset {
    pub password: String,
    #[serde(default)]
    pub temporary: bool,
}

#[utoipa::path(
    post,
    path= "/api/v1/users",
    request_body = NewUser,
    responses (
        (status = 201, description = "User created", body = [UserAccount]),
        (status = 401, description = "Missing or invalid bearer token", body = [super::ErrorBody]),
        (status = 403, description = "Caller lacks the required role", body = [super::ErrorBody]),
        (status = 409, description = "Username or email already exists", body = [super::ErrorBody])
    ),
    security(("bearer" = [])),
    tag= "users"
)]
// axum handler for user creation
pub async fn create(
    gateway: Extension<Arc<AuthGateway>>,
    keycloak: Extension<Arc<KeycloakClient>>,
    headers: HeaderMap,
    Json(payload): Json<NewUser>,
) -> Response {
    let caller = match require_auth(&gateway, &headers).await {
        Ok(caller) => caller,
        Err(response) => return response,
    };
    if !authorize(&caller, USER_MANAGEMENT) {
        return error_response(StatusCode::FORBIDDEN, "Forbidden");
    }

    match keycloak.create_user(&payload).await {
        Ok(account) => {
            record_admin_event(
                &gateway,
                &caller,
                &headers,
                AuditAction::CreateUser,
                AuditResult::Success,
                &account.username,
            );
            (StatusCode::CREATED, Json(account)).into_response()
        }
        Err(err) => {
            record_admin_event(
                &gateway,
                &caller,
                &headers,
                AuditAction::CreateUser,
                AuditResult::Failure,
                &payload.username,
            );
            admin_error_response(&err)
        }
    }
}

#[utoipa::path(
    get,
    path= "/api/v1/users",
    params(ListQuery),
    responses (
        (status = 200, description = "Users in the realm", body = Vec<UserAccount>),
        (status = 401, description = "Missing or invalid bearer token", body = [super::ErrorBody]),
        (status = 403, description = "Caller lacks the required role", body = [super::ErrorBody])
    ),
    security(("bearer" = [])),
    tag= "users"
)]
// axum handler for user listing
pub async fn list(
    gateway: Extension<Arc<AuthGateway>>,
    keycloak: Extension<Arc<KeycloakClient>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Response {
    let caller = match require_auth(&gateway, &headers).await {
        Ok(caller) => caller,
        Err(response) => return response,
    };
    if !authorize(&caller, USER_MANAGEMENT) {
        return error_response(StatusCode::FORBIDDEN, "Forbidden");
    }

    let result = match &query.search {
        Some(term) => keycloak.search_users(term).await,
        None => keycloak.list_users(query.first, query.max).await,
    };
    match result {
        Ok(accounts) => (StatusCode::OK, Json(accounts)).into_response(),
        Err(err) => admin_error_response(&err),
    }
}

#[utoipa::path(
    get,
    path= "/api/v1/users/{id}",
    params(
        ("id" = String, Path, description = "Provider user id")
    ),
    responses (
        (status = 200, description = "User record", body = [UserAccount]),
        (status = 401, description = "Missing or invalid bearer token", body = [super::ErrorBody]),
        (status = 403, description = "Caller is neither the user nor a manager", body = [super::ErrorBody]),
        (status = 404, description = "Unknown user id", body = [super::ErrorBody])
    ),
    security(("bearer" = [])),
    tag= "users"
)]
// axum handler for user lookup; users may always read their own record
pub async fn get(
    gateway: Extension<Arc<AuthGateway>>,
    keycloak: Extension<Arc<KeycloakClient>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let caller = match require_auth(&gateway, &headers).await {
        Ok(caller) => caller,
        Err(response) => return response,
    };
    if !authorize_self_or(&caller, &id, USER_MANAGEMENT) {
        return error_response(StatusCode::FORBIDDEN, "Forbidden");
    }

    match keycloak.get_user(&id).await {
        Ok(account) => (StatusCode::OK, Json(account)).into_response(),
        Err(err) => admin_error_response(&err),
    }
}

#[utoipa::path(
    put,
    path= "/api/v1/users/{id}",
    params(
        ("id" = String, Path, description = "Provider user id")
    ),
    request_body = UserUpdate,
    responses (
        (status = 200, description = "User updated", body = [UserAccount]),
        (status = 401, description = "Missing or invalid bearer token", body = [super::ErrorBody]),
        (status = 403, description = "Caller lacks the required role", body = [super::ErrorBody]),
        (status = 404, description = "Unknown user id", body = [super::ErrorBody])
    ),
    security(("bearer" = [])),
    tag= "users"
)]
// axum handler for user update
pub async fn update(
    gateway: Extension<Arc<AuthGateway>>,
    keycloak: Extension<Arc<KeycloakClient>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<UserUpdate>,
) -> Response {
    let caller = match require_auth(&gateway, &headers).await {
        Ok(caller) => caller,
        Err(response) => return response,
    };
    if !authorize(&caller, USER_MANAGEMENT) {
        return error_response(StatusCode::FORBIDDEN, "Forbidden");
    }

    match keycloak.update_user(&id, &payload).await {
        Ok(account) => {
            record_admin_event(
                &gateway,
                &caller,
                &headers,
                AuditAction::UpdateUser,
                AuditResult::Success,
                &account.username,
            );
            (StatusCode::OK, Json(account)).into_response()
        }
        Err(err) => {
            record_admin_event(
                &gateway,
                &caller,
                &headers,
                AuditAction::UpdateUser,
                AuditResult::Failure,
                &id,
            );
            admin_error_response(&err)
        }
    }
}

#[utoipa::path(
    delete,
    path= "/api/v1/users/{id}",
    params(
        ("id" = String, Path, description = "Provider user id")
    ),
    responses (
        (status = 204, description = "User deleted"),
        (status = 401, description = "Missing or invalid bearer token", body = [super::ErrorBody]),
        (status = 403, description = "Caller lacks the required role", body = [super::ErrorBody]),
        (status = 404, description = "Unknown user id", body = [super::ErrorBody])
    ),
    security(("bearer" = [])),
    tag= "users"
)]
// axum handler for user deletion
pub async fn delete(
    gateway: Extension<Arc<AuthGateway>>,
    keycloak: Extension<Arc<KeycloakClient>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let caller = match require_auth(&gateway, &headers).await {
        Ok(caller) => caller,
        Err(response) => return response,
    };
    if !authorize(&caller, ADMIN_ONLY) {
        return error_response(StatusCode::FORBIDDEN, "Forbidden");
    }

    match keycloak.delete_user(&id).await {
        Ok(()) => {
            record_admin_event(
                &gateway,
                &caller,
                &headers,
                AuditAction::DeleteUser,
                AuditResult::Success,
                &id,
            );
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => {
            record_admin_event(
                &gateway,
                &caller,
                &headers,
                AuditAction::DeleteUser,
                AuditResult::Failure,
                &id,
            );
            admin_error_response(&err)
        }
    }
}

#[utoipa::path(
    put,
    path= "/api/v1/users/{id}/status",
    params(
        ("id" = String, Path, description = "Provider user id")
    ),
    request_body = StatusUpdate,
    responses (
        (status = 204, description = "Account status changed"),
        (status = 401, description = "Missing or invalid bearer token", body = [super::ErrorBody]),
        (status = 403, description = "Caller lacks the required role", body = [super::ErrorBody]),
        (status = 404, description = "Unknown user id", body = [super::ErrorBody])
    ),
    security(("bearer" = [])),
    tag= "users"
)]
// axum handler for enabling or disabling an account
pub async fn set_status(
    gateway: Extension<Arc<AuthGateway>>,
    keycloak: Extension<Arc<KeycloakClient>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<StatusUpdate>,
) -> Response {
    let caller = match require_auth(&gateway, &headers).await {
        Ok(caller) => caller,
        Err(response) => return response,
    };
    if !authorize(&caller, ADMIN_ONLY) {
        return error_response(StatusCode::FORBIDDEN, "Forbidden");
    }

    let action = if payload.enabled {
        AuditAction::EnableUser
    } else {
        AuditAction::DisableUser
    };
    match keycloak.set_user_enabled(&id, payload.enabled).await {
        Ok(()) => {
            record_admin_event(&gateway, &caller, &headers, action, AuditResult::Success, &id);
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => {
            record_admin_event(&gateway, &caller, &headers, action, AuditResult::Failure, &id);
            admin_error_response(&err)
        }
    }
}

#[utoipa::path(
    put,
    path= "/api/v1/users/{id}/password",
    params(
        ("id" = String, Path, description = "Provider user id")
    ),
    request_body = PasswordReset,
    responses (
        (status = 204, description = "Password reset"),
        (status = 401, description = "Missing or invalid bearer token", body = [super::ErrorBody]),
        (status = 403, description = "Caller lacks the required role", body = [super::ErrorBody]),
        (status = 404, description = "Unknown user id", body = [super::ErrorBody])
    ),
    security(("bearer" = [])),
    tag= "users"
)]
// axum handler for administrative password reset
pub async fn reset_password(
    gateway: Extension<Arc<AuthGateway>>,
    keycloak: Extension<Arc<KeycloakClient>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<PasswordReset>,
) -> Response {
    let caller = match require_auth(&gateway, &headers).await {
        Ok(caller) => caller,
        Err(response) => return response,
    };
    if !authorize(&caller, ADMIN_ONLY) {
        return error_response(StatusCode::FORBIDDEN, "Forbidden");
    }

    match keycloak
        .reset_password(&id, &payload.password, payload.temporary)
        .await
    {
        Ok(()) => {
            record_admin_event(
                &gateway,
                &caller,
                &headers,
                AuditAction::ResetPassword,
                AuditResult::Success,
                &id,
            );
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => {
            record_admin_event(
                &gateway,
                &caller,
                &headers,
                AuditAction::ResetPassword,
                AuditResult::Failure,
                &id,
            );
            admin_error_response(&err)
        }
    }
}
