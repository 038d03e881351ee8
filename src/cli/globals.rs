use secrecy::SecretString;

/// Configuration shared across the process after argument parsing.
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub keycloak_url: String,
    pub keycloak_realm: String,
    pub keycloak_client_id: String,
    pub keycloak_client_secret: SecretString,
    pub lockout_threshold: u64,
    pub lockout_window_minutes: i64,
    pub provider_timeout_seconds: u64,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(keycloak_url: String, keycloak_realm: String, keycloak_client_id: String) -> Self {
        Self {
            keycloak_url,
            keycloak_realm,
            keycloak_client_id,
            keycloak_client_secret: SecretString::default(),
            lockout_threshold: crate::auth::lockout::DEFAULT_LOCKOUT_THRESHOLD,
            lockout_window_minutes: crate::auth::lockout::DEFAULT_LOCKOUT_WINDOW_MINUTES,
            provider_timeout_seconds: 10,
        }
    }

    pub fn set_client_secret(&mut self, secret: SecretString) {
        self.keycloak_client_secret = secret;
    }
}
