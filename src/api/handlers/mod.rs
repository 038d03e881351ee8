pub mod audit;
pub mod auth;
pub mod health;
pub mod roles;
pub mod users;

// common functions for the handlers
use axum::{
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use utoipa::ToSchema;

use crate::auth::{AuthFailure, AuthGateway, Principal};

/// Authority sets for the protected route groups.
pub const USER_MANAGEMENT: &[&str] = &["ROLE_ADMIN", "ROLE_USER_MANAGER"];
pub const ADMIN_ONLY: &[&str] = &["ROLE_ADMIN"];

/// Uniform error body for every non-2xx response.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorBody {
    pub error: String,
}

pub fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

/// Map a gateway failure to its HTTP shape. A locked account answers
/// exactly like bad credentials so callers cannot probe for lockouts or
/// for which usernames exist.
pub fn failure_response(failure: &AuthFailure) -> Response {
    match failure {
        AuthFailure::InvalidCredentials | AuthFailure::AccountLocked => {
            error_response(StatusCode::UNAUTHORIZED, "Invalid credentials")
        }
        AuthFailure::InvalidOrExpiredRefreshToken => {
            error_response(StatusCode::UNAUTHORIZED, "Invalid or expired refresh token")
        }
        AuthFailure::ProviderUnavailable(_) => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "Identity provider unavailable",
        ),
        AuthFailure::ProviderMalformedResponse(_) => error_response(
            StatusCode::BAD_GATEWAY,
            "Identity provider returned an invalid response",
        ),
    }
}

/// Client address as reported by the first `X-Forwarded-For` hop. The
/// gateway sits behind a trusted proxy; the header is taken at face value
/// and recorded for the audit trail only.
#[must_use]
pub fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
}

#[must_use]
pub fn extract_user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty())
}

/// Authenticate the request from its bearer token via provider
/// introspection. Inactive, malformed, or absent tokens are all the same
/// 401 to the caller.
pub async fn require_auth(
    gateway: &Arc<AuthGateway>,
    headers: &HeaderMap,
) -> Result<Principal, Response> {
    let Some(token) = bearer_token(headers) else {
        return Err(error_response(
            StatusCode::UNAUTHORIZED,
            "Missing bearer token",
        ));
    };

    let claims = gateway
        .introspect(token)
        .await
        .map_err(|failure| failure_response(&failure))?;

    let active = claims
        .get("active")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false);
    if !active {
        debug!("rejecting inactive token");
        return Err(error_response(StatusCode::UNAUTHORIZED, "Invalid token"));
    }

    Principal::from_claims(&claims)
        .ok_or_else(|| error_response(StatusCode::UNAUTHORIZED, "Invalid token"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn first_forwarded_hop_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(
            extract_client_ip(&headers).as_deref(),
            Some("203.0.113.7")
        );
    }

    #[test]
    fn missing_or_empty_forwarded_header_yields_none() {
        assert!(extract_client_ip(&HeaderMap::new()).is_none());

        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(""));
        assert!(extract_client_ip(&headers).is_none());
    }

    #[test]
    fn bearer_token_requires_the_scheme_prefix() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(bearer_token(&headers).is_none());

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert!(bearer_token(&headers).is_none());
    }

    #[test]
    fn lockout_and_bad_credentials_share_a_response() {
        let locked = failure_response(&AuthFailure::AccountLocked);
        let invalid = failure_response(&AuthFailure::InvalidCredentials);
        assert_eq!(locked.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(invalid.status(), StatusCode::UNAUTHORIZED);
    }
}
