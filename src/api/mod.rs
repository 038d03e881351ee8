use crate::{
    audit::{AuditStore, PgAuditStore},
    auth::{AuthGateway, IdentityProvider, LockoutPolicy},
    cli::globals::GlobalArgs,
    keycloak::{KeycloakClient, KeycloakConfig},
};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    routing::{get, post, put},
    Extension, Router,
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod handlers;
mod openapi;

use handlers::{audit, auth, health, roles, users};

/// Build the API router with all documented routes registered.
#[must_use]
pub fn router() -> Router {
    Router::new()
        .route("/health", get(health::health).options(health::health))
        .route("/api/v1/auth/login", post(auth::login))
        .route("/api/v1/auth/refresh", post(auth::refresh))
        .route("/api/v1/auth/logout", post(auth::logout))
        .route("/api/v1/auth/introspect", post(auth::introspect))
        .route("/api/v1/auth/me", get(auth::me))
        .route("/api/v1/audit", get(audit::by_window))
        .route("/api/v1/audit/principal/:principal", get(audit::by_principal))
        .route("/api/v1/users", post(users::create).get(users::list))
        .route(
            "/api/v1/users/:id",
            get(users::get).put(users::update).delete(users::delete),
        )
        .route("/api/v1/users/:id/status", put(users::set_status))
        .route("/api/v1/users/:id/password", put(users::reset_password))
        .route("/api/v1/users/:id/roles", post(roles::assign))
        .route("/api/v1/roles", post(roles::create).get(roles::list))
        .route("/api/v1/roles/:name", get(roles::get).delete(roles::delete))
        .merge(
            SwaggerUi::new("/swagger-ui")
                .url("/api-docs/openapi.json", openapi::ApiDoc::openapi()),
        )
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, dsn: String, globals: &GlobalArgs) -> Result<()> {
    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let audit_store = Arc::new(PgAuditStore::new(pool.clone()));
    audit_store
        .ensure_schema()
        .await
        .context("Failed to prepare audit ledger schema")?;

    let keycloak_config = KeycloakConfig::new(
        globals.keycloak_url.clone(),
        globals.keycloak_realm.clone(),
        globals.keycloak_client_id.clone(),
        globals.keycloak_client_secret.clone(),
    )
    .with_timeout_seconds(globals.provider_timeout_seconds);
    let keycloak = Arc::new(KeycloakClient::new(keycloak_config)?);

    let gateway = Arc::new(AuthGateway::new(
        Arc::clone(&keycloak) as Arc<dyn IdentityProvider>,
        audit_store as Arc<dyn AuditStore>,
        LockoutPolicy::new(globals.lockout_threshold, globals.lockout_window_minutes),
    ));

    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_origin(Any);

    let app = router().layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(cors)
            .layer(Extension(gateway))
            .layer(Extension(keycloak))
            .layer(Extension(pool)),
    );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
