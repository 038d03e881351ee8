//! Realm role administration routes.

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::audit::{AuditAction, AuditResult};
use crate::auth::{authorize, AuthGateway};
use crate::keycloak::admin::RealmRole;
use crate::keycloak::KeycloakClient;

use super::users::{admin_error_response, record_admin_event};
use super::{error_response, require_auth, ADMIN_ONLY};

#[derive(ToSchema, Deserialize, Debug)]
pub struct NewRole {
    pub name: String,
    pub description: Option<String>,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct RoleAssignment {
    pub roles: Vec<String>,
}

#[utoipa::path(
    post,
    path= "/api/v1/roles",
    request_body = NewRole,
    responses (
        (status = 201, description = "Role created", body = [RealmRole]),
        (status = 401, description = "Missing or invalid bearer token", body = [super::ErrorBody]),
        (status = 403, description = "Caller lacks the required role", body = [super::ErrorBody]),
        (status = 409, description = "Role already exists", body = [super::ErrorBody])
    ),
    security(("bearer" = [])),
    tag= "roles"
)]
// axum handler for role creation
pub async fn create(
    gateway: Extension<Arc<AuthGateway>>,
    keycloak: Extension<Arc<KeycloakClient>>,
    headers: HeaderMap,
    Json(payload): Json<NewRole>,
) -> Response {
    let caller = match require_auth(&gateway, &headers).await {
        Ok(caller) => caller,
        Err(response) => return response,
    };
    if !authorize(&caller, ADMIN_ONLY) {
        return error_response(StatusCode::FORBIDDEN, "Forbidden");
    }

    match keycloak
        .create_role(&payload.name, payload.description.as_deref())
        .await
    {
        Ok(role) => {
            record_admin_event(
                &gateway,
                &caller,
                &headers,
                AuditAction::CreateRole,
                AuditResult::Success,
                &role.name,
            );
            (StatusCode::CREATED, Json(role)).into_response()
        }
        Err(err) => {
            record_admin_event(
                &gateway,
                &caller,
                &headers,
                AuditAction::CreateRole,
                AuditResult::Failure,
                &payload.name,
            );
            admin_error_response(&err)
        }
    }
}

#[utoipa::path(
    get,
    path= "/api/v1/roles",
    responses (
        (status = 200, description = "Realm roles", body = Vec<RealmRole>),
        (status = 401, description = "Missing or invalid bearer token", body = [super::ErrorBody]),
        (status = 403, description = "Caller lacks the required role", body = [super::ErrorBody])
    ),
    security(("bearer" = [])),
    tag= "roles"
)]
// axum handler for role listing
pub async fn list(
    gateway: Extension<Arc<AuthGateway>>,
    keycloak: Extension<Arc<KeycloakClient>>,
    headers: HeaderMap,
) -> Response {
    let caller = match require_auth(&gateway, &headers).await {
        Ok(caller) => caller,
        Err(response) => return response,
    };
    if !authorize(&caller, ADMIN_ONLY) {
        return error_response(StatusCode::FORBIDDEN, "Forbidden");
    }

    match keycloak.list_roles().await {
        Ok(roles) => (StatusCode::OK, Json(roles)).into_response(),
        Err(err) => admin_error_response(&err),
    }
}

#[utoipa::path(
    get,
    path= "/api/v1/roles/{name}",
    params(
        ("name" = String, Path, description = "Role name")
    ),
    responses (
        (status = 200, description = "Role record", body = [RealmRole]),
        (status = 401, description = "Missing or invalid bearer token", body = [super::ErrorBody]),
        (status = 403, description = "Caller lacks the required role", body = [super::ErrorBody]),
        (status = 404, description = "Unknown role name", body = [super::ErrorBody])
    ),
    security(("bearer" = [])),
    tag= "roles"
)]
// axum handler for role lookup
pub async fn get(
    gateway: Extension<Arc<AuthGateway>>,
    keycloak: Extension<Arc<KeycloakClient>>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Response {
    let caller = match require_auth(&gateway, &headers).await {
        Ok(caller) => caller,
        Err(response) => return response,
    };
    if !authorize(&caller, ADMIN_ONLY) {
        return error_response(StatusCode::FORBIDDEN, "Forbidden");
    }

    match keycloak.get_role(&name).await {
        Ok(role) => (StatusCode::OK, Json(role)).into_response(),
        Err(err) => admin_error_response(&err),
    }
}

#[utoipa::path(
    delete,
    path= "/api/v1/roles/{name}",
    params(
        ("name" = String, Path, description = "Role name")
    ),
    responses (
        (status = 204, description = "Role deleted"),
        (status = 401, description = "Missing or invalid bearer token", body = [super::ErrorBody]),
        (status = 403, description = "Caller lacks the required role", body = [super::ErrorBody]),
        (status = 404, description = "Unknown role name", body = [super::ErrorBody])
    ),
    security(("bearer" = [])),
    tag= "roles"
)]
// axum handler for role deletion
pub async fn delete(
    gateway: Extension<Arc<AuthGateway>>,
    keycloak: Extension<Arc<KeycloakClient>>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Response {
    let caller = match require_auth(&gateway, &headers).await {
        Ok(caller) => caller,
        Err(response) => return response,
    };
    if !authorize(&caller, ADMIN_ONLY) {
        return error_response(StatusCode::FORBIDDEN, "Forbidden");
    }

    match keycloak.delete_role(&name).await {
        Ok(()) => {
            record_admin_event(
                &gateway,
                &caller,
                &headers,
                AuditAction::DeleteRole,
                AuditResult::Success,
                &name,
            );
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => {
            record_admin_event(
                &gateway,
                &caller,
                &headers,
                AuditAction::DeleteRole,
                AuditResult::Failure,
                &name,
            );
            admin_error_response(&err)
        }
    }
}

#[utoipa::path(
    post,
    path= "/api/v1/users/{id}/roles",
    params(
        ("id" = String, Path, description = "Provider user id")
    ),
    request_body = RoleAssignment,
    responses (
        (status = 204, description = "Roles assigned; unknown role names are skipped"),
        (status = 401, description = "Missing or invalid bearer token", body = [super::ErrorBody]),
        (status = 403, description = "Caller lacks the required role", body = [super::ErrorBody]),
        (status = 404, description = "Unknown user id", body = [super::ErrorBody])
    ),
    security(("bearer" = [])),
    tag= "roles"
)]
// axum handler for realm role assignment
pub async fn assign(
    gateway: Extension<Arc<AuthGateway>>,
    keycloak: Extension<Arc<KeycloakClient>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<RoleAssignment>,
) -> Response {
    let caller = match require_auth(&gateway, &headers).await {
        Ok(caller) => caller,
        Err(response) => return response,
    };
    if !authorize(&caller, ADMIN_ONLY) {
        return error_response(StatusCode::FORBIDDEN, "Forbidden");
    }

    match keycloak.assign_realm_roles(&id, &payload.roles).await {
        Ok(()) => {
            record_admin_event(
                &gateway,
                &caller,
                &headers,
                AuditAction::UpdateUser,
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
                AuditAction::UpdateUser,
                AuditResult::Failure,
                &id,
            );
            admin_error_response(&err)
        }
    }
}
