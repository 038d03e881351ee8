//! OpenAPI document for the gateway routes.

use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::api::handlers;
use crate::audit::{AuditAction, AuditEvent, AuditResult};
use crate::auth::TokenBundle;
use crate::keycloak::admin::{NewUser, RealmRole, UserAccount, UserUpdate};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health,
        handlers::auth::login,
        handlers::auth::refresh,
        handlers::auth::logout,
        handlers::auth::introspect,
        handlers::auth::me,
        handlers::audit::by_principal,
        handlers::audit::by_window,
        handlers::users::create,
        handlers::users::list,
        handlers::users::get,
        handlers::users::update,
        handlers::users::delete,
        handlers::users::set_status,
        handlers::users::reset_password,
        handlers::roles::create,
        handlers::roles::list,
        handlers::roles::get,
        handlers::roles::delete,
        handlers::roles::assign,
    ),
    components(schemas(
        handlers::ErrorBody,
        handlers::health::Health,
        handlers::auth::LoginRequest,
        handlers::auth::RefreshRequest,
        handlers::auth::LogoutRequest,
        handlers::auth::IntrospectRequest,
        handlers::auth::WhoAmI,
        handlers::users::StatusUpdate,
        handlers::users::PasswordReset,
        handlers::roles::NewRole,
        handlers::roles::RoleAssignment,
        TokenBundle,
        AuditAction,
        AuditResult,
        AuditEvent,
        NewUser,
        UserAccount,
        UserUpdate,
        RealmRole,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Service health"),
        (name = "auth", description = "Token lifecycle"),
        (name = "audit", description = "Audit ledger queries"),
        (name = "users", description = "User administration"),
        (name = "roles", description = "Role administration"),
    )
)]
pub struct ApiDoc;
