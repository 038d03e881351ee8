//! Client for a Keycloak-compatible identity provider.
//!
//! The gateway is a *client* of the provider and trusts it as the root of
//! authentication truth: no credential storage, no token signing happens
//! here. `tokens` covers the OpenID Connect token lifecycle endpoints,
//! `admin` the user/role administration REST API.

pub mod admin;
pub mod tokens;

use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use secrecy::SecretString;
use std::time::Duration;
use url::Url;

use crate::APP_USER_AGENT;

const DEFAULT_TIMEOUT_SECONDS: u64 = 10;

/// Immutable provider coordinates, bound once at process start.
#[derive(Clone, Debug)]
pub struct KeycloakConfig {
    base_url: String,
    realm: String,
    client_id: String,
    client_secret: SecretString,
    timeout_seconds: u64,
}

impl KeycloakConfig {
    #[must_use]
    pub fn new(
        base_url: String,
        realm: String,
        client_id: String,
        client_secret: SecretString,
    ) -> Self {
        Self {
            base_url,
            realm,
            client_id,
            client_secret,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }

    #[must_use]
    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn client_secret(&self) -> &SecretString {
        &self.client_secret
    }

    #[must_use]
    pub fn realm(&self) -> &str {
        &self.realm
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Validated base URL without a trailing slash.
    /// # Errors
    /// Returns an error for an unparsable URL or an unsupported scheme.
    pub fn normalized_base_url(&self) -> Result<String> {
        let url = Url::parse(&self.base_url)
            .with_context(|| format!("invalid Keycloak URL: {}", self.base_url))?;
        match url.scheme() {
            "http" | "https" => {}
            other => return Err(anyhow!("unsupported Keycloak URL scheme: {other}")),
        }
        url.host()
            .ok_or_else(|| anyhow!("Keycloak URL has no host: {}", self.base_url))?;
        Ok(self.base_url.trim_end_matches('/').to_string())
    }
}

/// Shared HTTP handle to the provider. Constructed once and passed around
/// by reference; per-request state never leaks between concurrent calls.
#[derive(Clone, Debug)]
pub struct KeycloakClient {
    http: Client,
    config: KeycloakConfig,
    token_url: String,
    logout_url: String,
    introspect_url: String,
    admin_base: String,
}

impl KeycloakClient {
    /// # Errors
    /// Returns an error when the base URL is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: KeycloakConfig) -> Result<Self> {
        let base = config.normalized_base_url()?;
        let realm = config.realm();
        let openid = format!("{base}/realms/{realm}/protocol/openid-connect");

        let http = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(config.timeout())
            .build()
            .context("failed to build Keycloak HTTP client")?;

        Ok(Self {
            http,
            token_url: format!("{openid}/token"),
            logout_url: format!("{openid}/logout"),
            introspect_url: format!("{openid}/token/introspect"),
            admin_base: format!("{base}/admin/realms/{realm}"),
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &KeycloakConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: &str) -> KeycloakConfig {
        KeycloakConfig::new(
            base_url.to_string(),
            "acme".to_string(),
            "iam-gateway".to_string(),
            SecretString::from("hunter2".to_string()),
        )
    }

    #[test]
    fn endpoints_follow_the_realm_layout() {
        let client = KeycloakClient::new(config("https://kc.example.com/")).unwrap();
        assert_eq!(
            client.token_url,
            "https://kc.example.com/realms/acme/protocol/openid-connect/token"
        );
        assert_eq!(
            client.logout_url,
            "https://kc.example.com/realms/acme/protocol/openid-connect/logout"
        );
        assert_eq!(
            client.introspect_url,
            "https://kc.example.com/realms/acme/protocol/openid-connect/token/introspect"
        );
        assert_eq!(client.admin_base, "https://kc.example.com/admin/realms/acme");
    }

    #[test]
    fn invalid_base_urls_are_rejected_up_front() {
        assert!(KeycloakClient::new(config("not a url")).is_err());
        assert!(KeycloakClient::new(config("ftp://kc.example.com")).is_err());
    }

    #[test]
    fn timeout_defaults_and_overrides() {
        let config = config("https://kc.example.com");
        assert_eq!(config.timeout(), Duration::from_secs(10));
        let config = config.with_timeout_seconds(3);
        assert_eq!(config.timeout(), Duration::from_secs(3));
    }

    #[test]
    fn debug_output_redacts_the_client_secret() {
        let rendered = format!("{:?}", config("https://kc.example.com"));
        assert!(!rendered.contains("hunter2"));
    }
}
