//! Token gateway: credential/token exchange orchestrated with the lockout
//! gate and the audit ledger.
//!
//! Concurrency note: there is deliberately no lock between the lockout
//! check and the eventual audit write. Two concurrent attempts for the same
//! near-locked username may both read `count < threshold` and both reach
//! the provider before either failure lands in the ledger. That is an
//! accepted weakness of the sliding-window counter; serializing logins to
//! close it would cost more than it buys. A per-username atomic
//! increment-and-compare would be the production hardening.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, instrument, warn};
use utoipa::ToSchema;

use crate::audit::{AuditAction, AuditEvent, AuditResult, AuditStore};

use super::claims::ClaimSet;
use super::error::AuthFailure;
use super::lockout::LockoutPolicy;

/// Result of a successful token exchange. Token strings are opaque and
/// passed through verbatim from the provider.
#[derive(ToSchema, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TokenBundle {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub token_type: String,
    /// Access token lifetime in seconds.
    #[serde(default)]
    pub expires_in: u64,
    /// Refresh token lifetime in seconds.
    #[serde(default)]
    pub refresh_expires_in: u64,
}

/// Boundary to the external identity provider. Implementations translate
/// transport and protocol errors into [`AuthFailure`]; raw client errors
/// never cross this trait.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Password grant with scope `openid profile email`.
    async fn password_grant(
        &self,
        username: &str,
        password: &str,
    ) -> Result<TokenBundle, AuthFailure>;

    /// Refresh-token grant.
    async fn refresh_grant(&self, refresh_token: &str) -> Result<TokenBundle, AuthFailure>;

    /// Invalidate a refresh token at the provider.
    async fn revoke(&self, refresh_token: &str) -> Result<(), AuthFailure>;

    /// Token introspection; returns the provider's claims verbatim,
    /// including the `active` flag.
    async fn introspect(&self, token: &str) -> Result<ClaimSet, AuthFailure>;
}

/// Shared, immutable gateway handle, constructed once at process start.
pub struct AuthGateway {
    provider: Arc<dyn IdentityProvider>,
    audit: Arc<dyn AuditStore>,
    lockout: LockoutPolicy,
}

impl AuthGateway {
    #[must_use]
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        audit: Arc<dyn AuditStore>,
        lockout: LockoutPolicy,
    ) -> Self {
        Self {
            provider,
            audit,
            lockout,
        }
    }

    /// Read access to the ledger for operator-facing queries.
    #[must_use]
    pub fn audit(&self) -> &dyn AuditStore {
        self.audit.as_ref()
    }

    /// Exchange credentials for a token bundle.
    ///
    /// Lockout is evaluated first; a locked account fails without any
    /// provider call and without a new ledger entry (a lockout rejection is
    /// not a credential failure and must not be conflated with one).
    /// Provider 4xx rejections are audited as LOGIN/FAILURE and count
    /// toward lockout; transport failures do neither.
    #[instrument(skip(self, password), fields(username = %username))]
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        source_ip: Option<String>,
    ) -> Result<TokenBundle, AuthFailure> {
        let window_start = self.lockout.window_start(Utc::now());
        let failed_attempts = match self
            .audit
            .count_matching(
                username,
                AuditAction::Login,
                AuditResult::Failure,
                window_start,
            )
            .await
        {
            Ok(count) => count,
            Err(err) => {
                // The ledger is advisory: an unreadable ledger must not take
                // authentication down with it. Fail open.
                error!("lockout count query failed: {err}");
                warn!(username, "lockout gate disabled for this attempt");
                0
            }
        };

        let decision = self.lockout.evaluate(failed_attempts);
        if decision.locked {
            warn!(
                failed_attempts = decision.failed_attempts,
                "login vetoed by lockout policy"
            );
            return Err(AuthFailure::AccountLocked);
        }

        match self.provider.password_grant(username, password).await {
            Ok(bundle) => {
                self.record_detached(
                    AuditEvent::new(AuditAction::Login, username, AuditResult::Success)
                        .with_source_ip(source_ip)
                        .with_details("login successful"),
                );
                Ok(bundle)
            }
            Err(AuthFailure::InvalidCredentials) => {
                self.record_detached(
                    AuditEvent::new(AuditAction::Login, username, AuditResult::Failure)
                        .with_source_ip(source_ip)
                        .with_details("invalid credentials"),
                );
                warn!("failed login attempt");
                Err(AuthFailure::InvalidCredentials)
            }
            // Transport and protocol failures are not credential failures;
            // they are neither audited nor counted toward lockout.
            Err(other) => Err(other),
        }
    }

    /// Refresh-token grant pass-through. No lockout applies; lockout is a
    /// login-only gate.
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenBundle, AuthFailure> {
        self.provider.refresh_grant(refresh_token).await
    }

    /// Invalidate a refresh token at the provider, then audit the logout.
    /// A provider failure here is loud: the caller must not believe a
    /// session is closed when it is not.
    #[instrument(skip(self, refresh_token), fields(username = %username))]
    pub async fn logout(&self, refresh_token: &str, username: &str) -> Result<(), AuthFailure> {
        self.provider.revoke(refresh_token).await?;
        self.record_detached(
            AuditEvent::new(AuditAction::Logout, username, AuditResult::Success)
                .with_details("user logged out"),
        );
        Ok(())
    }

    /// Provider introspection pass-through. Read-only; not audited.
    #[instrument(skip(self, token))]
    pub async fn introspect(&self, token: &str) -> Result<ClaimSet, AuthFailure> {
        self.provider.introspect(token).await
    }

    /// Append an audit event without blocking the caller. The response to
    /// the client never waits on ledger durability; write failures are
    /// surfaced to operators through the log.
    pub fn record_detached(&self, event: AuditEvent) {
        let store = Arc::clone(&self.audit);
        tokio::spawn(async move {
            if let Err(err) = store.record(event).await {
                error!("audit write failed: {err}");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditStore;
    use chrono::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{sleep, timeout};

    /// Scripted provider: answers every password grant the same way and
    /// counts how often it was called.
    struct ScriptedProvider {
        outcome: Result<TokenBundle, AuthFailure>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn rejecting() -> Self {
            Self {
                outcome: Err(AuthFailure::InvalidCredentials),
                calls: AtomicUsize::new(0),
            }
        }

        fn accepting() -> Self {
            Self {
                outcome: Ok(bundle()),
                calls: AtomicUsize::new(0),
            }
        }

        fn unreachable_provider() -> Self {
            Self {
                outcome: Err(AuthFailure::ProviderUnavailable("timed out".into())),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn bundle() -> TokenBundle {
        TokenBundle {
            access_token: "at".into(),
            refresh_token: "rt".into(),
            token_type: "Bearer".into(),
            expires_in: 300,
            refresh_expires_in: 1800,
        }
    }

    #[async_trait]
    impl IdentityProvider for ScriptedProvider {
        async fn password_grant(
            &self,
            _username: &str,
            _password: &str,
        ) -> Result<TokenBundle, AuthFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone()
        }

        async fn refresh_grant(&self, _refresh_token: &str) -> Result<TokenBundle, AuthFailure> {
            self.outcome.clone().map_err(|_| AuthFailure::InvalidOrExpiredRefreshToken)
        }

        async fn revoke(&self, _refresh_token: &str) -> Result<(), AuthFailure> {
            self.outcome.clone().map(|_| ())
        }

        async fn introspect(&self, _token: &str) -> Result<ClaimSet, AuthFailure> {
            let claims = serde_json::json!({ "active": true, "sub": "4f2c" });
            Ok(claims.as_object().cloned().unwrap_or_default())
        }
    }

    fn gateway(provider: Arc<ScriptedProvider>, audit: Arc<MemoryAuditStore>) -> AuthGateway {
        AuthGateway::new(provider, audit, LockoutPolicy::default())
    }

    async fn wait_for_events(store: &MemoryAuditStore, expected: usize) {
        timeout(std::time::Duration::from_secs(2), async {
            while store.len().await < expected {
                sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("audit events never landed");
    }

    #[tokio::test]
    async fn sixth_attempt_is_locked_without_a_provider_call() {
        let provider = Arc::new(ScriptedProvider::rejecting());
        let audit = Arc::new(MemoryAuditStore::new());
        let gateway = gateway(Arc::clone(&provider), Arc::clone(&audit));

        for _ in 0..5 {
            let result = gateway.login("alice", "wrong", None).await;
            assert_eq!(result, Err(AuthFailure::InvalidCredentials));
        }
        wait_for_events(&audit, 5).await;
        assert_eq!(provider.calls(), 5);

        let result = gateway.login("alice", "wrong", None).await;
        assert_eq!(result, Err(AuthFailure::AccountLocked));
        // No provider call and no additional ledger entry for the veto.
        assert_eq!(provider.calls(), 5);
        sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(audit.len().await, 5);
    }

    #[tokio::test]
    async fn failures_age_out_of_the_window() {
        let provider = Arc::new(ScriptedProvider::accepting());
        let audit = Arc::new(MemoryAuditStore::new());
        let stale = Utc::now() - Duration::minutes(16);
        for _ in 0..5 {
            audit
                .record(
                    AuditEvent::new(AuditAction::Login, "alice", AuditResult::Failure)
                        .with_timestamp(stale),
                )
                .await
                .unwrap();
        }
        let gateway = gateway(Arc::clone(&provider), Arc::clone(&audit));

        let result = gateway.login("alice", "correct", None).await;
        assert_eq!(result, Ok(bundle()));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn success_is_audited_with_source_ip() {
        let provider = Arc::new(ScriptedProvider::accepting());
        let audit = Arc::new(MemoryAuditStore::new());
        let gateway = gateway(provider, Arc::clone(&audit));

        gateway
            .login("alice", "correct", Some("203.0.113.7".into()))
            .await
            .unwrap();
        wait_for_events(&audit, 1).await;

        let events = audit.events_for_principal("alice").await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, AuditAction::Login);
        assert_eq!(events[0].result, AuditResult::Success);
        assert_eq!(events[0].source_ip.as_deref(), Some("203.0.113.7"));
    }

    #[tokio::test]
    async fn provider_outage_is_not_audited_and_does_not_count() {
        let provider = Arc::new(ScriptedProvider::unreachable_provider());
        let audit = Arc::new(MemoryAuditStore::new());
        let gateway = gateway(Arc::clone(&provider), Arc::clone(&audit));

        for _ in 0..10 {
            let result = gateway.login("alice", "pw", None).await;
            assert!(matches!(result, Err(AuthFailure::ProviderUnavailable(_))));
        }
        sleep(std::time::Duration::from_millis(20)).await;
        assert!(audit.is_empty().await);
        // Outages never trip the lockout gate.
        assert_eq!(provider.calls(), 10);
    }

    #[tokio::test]
    async fn concurrent_failures_each_produce_exactly_one_event() {
        let provider = Arc::new(ScriptedProvider::rejecting());
        let audit = Arc::new(MemoryAuditStore::new());
        // Threshold above the attempt count: this test is about ledger
        // write integrity, not the lockout gate.
        let gateway = Arc::new(AuthGateway::new(
            Arc::clone(&provider) as Arc<dyn IdentityProvider>,
            Arc::clone(&audit) as Arc<dyn AuditStore>,
            LockoutPolicy::new(100, 15),
        ));

        let mut handles = Vec::new();
        for _ in 0..50 {
            let gateway = Arc::clone(&gateway);
            handles.push(tokio::spawn(async move {
                gateway.login("nobody", "pw", None).await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), Err(AuthFailure::InvalidCredentials));
        }
        wait_for_events(&audit, 50).await;

        let failures = audit
            .count_matching(
                "nobody",
                AuditAction::Login,
                AuditResult::Failure,
                Utc::now() - Duration::minutes(15),
            )
            .await
            .unwrap();
        // No lost writes, no duplicate writes per attempt.
        assert_eq!(failures, 50);
        assert_eq!(audit.len().await, 50);
        assert_eq!(provider.calls(), 50);
    }

    /// Ledger whose count queries always fail; appends still succeed.
    struct UnreadableLedger {
        inner: MemoryAuditStore,
    }

    #[async_trait]
    impl AuditStore for UnreadableLedger {
        async fn record(&self, event: AuditEvent) -> Result<(), crate::audit::WriteError> {
            self.inner.record(event).await
        }

        async fn events_for_principal(
            &self,
            principal: &str,
        ) -> anyhow::Result<Vec<AuditEvent>> {
            self.inner.events_for_principal(principal).await
        }

        async fn events_by_window(
            &self,
            action: AuditAction,
            start: chrono::DateTime<Utc>,
            end: chrono::DateTime<Utc>,
        ) -> anyhow::Result<Vec<AuditEvent>> {
            self.inner.events_by_window(action, start, end).await
        }

        async fn count_matching(
            &self,
            _principal: &str,
            _action: AuditAction,
            _result: crate::audit::AuditResult,
            _since: chrono::DateTime<Utc>,
        ) -> anyhow::Result<u64> {
            anyhow::bail!("ledger offline")
        }
    }

    #[tokio::test]
    async fn unreadable_ledger_fails_open() {
        // An outage on the count query disables the gate instead of
        // blocking every login.
        let provider = Arc::new(ScriptedProvider::accepting());
        let gateway = AuthGateway::new(
            Arc::clone(&provider) as Arc<dyn IdentityProvider>,
            Arc::new(UnreadableLedger {
                inner: MemoryAuditStore::new(),
            }),
            LockoutPolicy::default(),
        );

        for _ in 0..10 {
            assert_eq!(gateway.login("alice", "correct", None).await, Ok(bundle()));
        }
        assert_eq!(provider.calls(), 10);
    }

    #[tokio::test]
    async fn logout_failure_is_loud_and_unaudited() {
        let provider = Arc::new(ScriptedProvider::rejecting());
        let audit = Arc::new(MemoryAuditStore::new());
        let gateway = gateway(provider, Arc::clone(&audit));

        let result = gateway.logout("rt", "alice").await;
        assert!(result.is_err());
        sleep(std::time::Duration::from_millis(20)).await;
        assert!(audit.is_empty().await);
    }

    #[tokio::test]
    async fn logout_success_writes_a_logout_event() {
        let provider = Arc::new(ScriptedProvider::accepting());
        let audit = Arc::new(MemoryAuditStore::new());
        let gateway = gateway(provider, Arc::clone(&audit));

        gateway.logout("rt", "alice").await.unwrap();
        wait_for_events(&audit, 1).await;
        let events = audit.events_for_principal("alice").await.unwrap();
        assert_eq!(events[0].action, AuditAction::Logout);
        assert_eq!(events[0].result, AuditResult::Success);
    }

    #[tokio::test]
    async fn introspection_is_idempotent_and_unaudited() {
        let provider = Arc::new(ScriptedProvider::accepting());
        let audit = Arc::new(MemoryAuditStore::new());
        let gateway = gateway(provider, Arc::clone(&audit));

        let first = gateway.introspect("token").await.unwrap();
        let second = gateway.introspect("token").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.get("active"), Some(&serde_json::Value::Bool(true)));
        sleep(std::time::Duration::from_millis(20)).await;
        assert!(audit.is_empty().await);
    }
}
