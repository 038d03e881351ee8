//! OpenID Connect token lifecycle calls: password and refresh grants,
//! logout, and introspection.
//!
//! This module is the failure translation boundary: every reqwest error is
//! mapped to an [`AuthFailure`] here and raw transport errors never escape.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use tracing::{debug, instrument};

use crate::auth::{AuthFailure, ClaimSet, IdentityProvider, TokenBundle};

use super::KeycloakClient;

/// Fixed scope for the password grant.
const LOGIN_SCOPE: &str = "openid profile email";

fn transport_failure(err: &reqwest::Error) -> AuthFailure {
    if err.is_timeout() {
        AuthFailure::ProviderUnavailable("request timed out".to_string())
    } else {
        AuthFailure::ProviderUnavailable(err.to_string())
    }
}

/// A token bundle exists only for a 2xx response carrying a non-empty
/// access token; 4xx maps to the grant-specific rejection.
async fn token_bundle_from(
    response: reqwest::Response,
    rejection: AuthFailure,
) -> Result<TokenBundle, AuthFailure> {
    let status = response.status();
    if status.is_success() {
        let bundle: TokenBundle = response
            .json()
            .await
            .map_err(|err| AuthFailure::ProviderMalformedResponse(err.to_string()))?;
        if bundle.access_token.is_empty() {
            return Err(AuthFailure::ProviderMalformedResponse(
                "empty access token".to_string(),
            ));
        }
        Ok(bundle)
    } else if status.is_client_error() {
        debug!("token endpoint rejected the grant: {status}");
        Err(rejection)
    } else {
        Err(AuthFailure::ProviderUnavailable(format!(
            "token endpoint returned {status}"
        )))
    }
}

#[async_trait]
impl IdentityProvider for KeycloakClient {
    #[instrument(skip(self, password))]
    async fn password_grant(
        &self,
        username: &str,
        password: &str,
    ) -> Result<TokenBundle, AuthFailure> {
        let params = [
            ("grant_type", "password"),
            ("client_id", self.config.client_id()),
            ("client_secret", self.config.client_secret().expose_secret()),
            ("username", username),
            ("password", password),
            ("scope", LOGIN_SCOPE),
        ];

        let response = self
            .http
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|err| transport_failure(&err))?;

        token_bundle_from(response, AuthFailure::InvalidCredentials).await
    }

    #[instrument(skip(self, refresh_token))]
    async fn refresh_grant(&self, refresh_token: &str) -> Result<TokenBundle, AuthFailure> {
        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", self.config.client_id()),
            ("client_secret", self.config.client_secret().expose_secret()),
            ("refresh_token", refresh_token),
        ];

        let response = self
            .http
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|err| transport_failure(&err))?;

        token_bundle_from(response, AuthFailure::InvalidOrExpiredRefreshToken).await
    }

    #[instrument(skip(self, refresh_token))]
    async fn revoke(&self, refresh_token: &str) -> Result<(), AuthFailure> {
        let params = [
            ("client_id", self.config.client_id()),
            ("client_secret", self.config.client_secret().expose_secret()),
            ("refresh_token", refresh_token),
        ];

        let response = self
            .http
            .post(&self.logout_url)
            .form(&params)
            .send()
            .await
            .map_err(|err| transport_failure(&err))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else if status.is_client_error() {
            Err(AuthFailure::InvalidOrExpiredRefreshToken)
        } else {
            Err(AuthFailure::ProviderUnavailable(format!(
                "logout endpoint returned {status}"
            )))
        }
    }

    #[instrument(skip(self, token))]
    async fn introspect(&self, token: &str) -> Result<ClaimSet, AuthFailure> {
        let params = [
            ("client_id", self.config.client_id()),
            ("client_secret", self.config.client_secret().expose_secret()),
            ("token", token),
        ];

        let response = self
            .http
            .post(&self.introspect_url)
            .form(&params)
            .send()
            .await
            .map_err(|err| transport_failure(&err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthFailure::ProviderUnavailable(format!(
                "introspection endpoint returned {status}"
            )));
        }

        let claims: serde_json::Value = response
            .json()
            .await
            .map_err(|err| AuthFailure::ProviderMalformedResponse(err.to_string()))?;
        claims.as_object().cloned().ok_or_else(|| {
            AuthFailure::ProviderMalformedResponse("introspection body is not an object".to_string())
        })
    }
}
