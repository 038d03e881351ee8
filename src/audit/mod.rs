//! Append-only security audit ledger.
//!
//! Every security-relevant action (logins, logouts, user and role
//! administration) is recorded as an [`AuditEvent`]. The ledger is
//! write-once, read-many: no update or delete is exposed, and lockout
//! decisions are derived on demand from time-windowed count queries
//! instead of stored flags.

pub mod memory;
pub mod postgres;

pub use memory::MemoryAuditStore;
pub use postgres::PgAuditStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;

/// Security-relevant actions recorded in the ledger.
#[derive(ToSchema, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Login,
    Logout,
    CreateUser,
    UpdateUser,
    DeleteUser,
    EnableUser,
    DisableUser,
    ResetPassword,
    CreateRole,
    DeleteRole,
}

impl AuditAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Login => "LOGIN",
            Self::Logout => "LOGOUT",
            Self::CreateUser => "CREATE_USER",
            Self::UpdateUser => "UPDATE_USER",
            Self::DeleteUser => "DELETE_USER",
            Self::EnableUser => "ENABLE_USER",
            Self::DisableUser => "DISABLE_USER",
            Self::ResetPassword => "RESET_PASSWORD",
            Self::CreateRole => "CREATE_ROLE",
            Self::DeleteRole => "DELETE_ROLE",
        }
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "LOGIN" => Ok(Self::Login),
            "LOGOUT" => Ok(Self::Logout),
            "CREATE_USER" => Ok(Self::CreateUser),
            "UPDATE_USER" => Ok(Self::UpdateUser),
            "DELETE_USER" => Ok(Self::DeleteUser),
            "ENABLE_USER" => Ok(Self::EnableUser),
            "DISABLE_USER" => Ok(Self::DisableUser),
            "RESET_PASSWORD" => Ok(Self::ResetPassword),
            "CREATE_ROLE" => Ok(Self::CreateRole),
            "DELETE_ROLE" => Ok(Self::DeleteRole),
            other => Err(format!("unknown audit action: {other}")),
        }
    }
}

/// Outcome of the audited action.
#[derive(ToSchema, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditResult {
    Success,
    Failure,
}

impl AuditResult {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
        }
    }
}

impl FromStr for AuditResult {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "SUCCESS" => Ok(Self::Success),
            "FAILURE" => Ok(Self::Failure),
            other => Err(format!("unknown audit result: {other}")),
        }
    }
}

/// One immutable ledger entry. The timestamp is assigned when the event is
/// built; callers that replay historic events may override it.
#[derive(ToSchema, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AuditEvent {
    pub action: AuditAction,
    pub principal: String,
    pub source_ip: Option<String>,
    pub user_agent: Option<String>,
    pub resource: Option<String>,
    pub result: AuditResult,
    pub details: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    #[must_use]
    pub fn new(action: AuditAction, principal: impl Into<String>, result: AuditResult) -> Self {
        Self {
            action,
            principal: principal.into(),
            source_ip: None,
            user_agent: None,
            resource: None,
            result,
            details: None,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_source_ip(mut self, source_ip: Option<String>) -> Self {
        self.source_ip = source_ip;
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: Option<String>) -> Self {
        self.user_agent = user_agent;
        self
    }

    #[must_use]
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Failure to append an event to the ledger. Never surfaced to the caller of
/// an authentication operation; logged for operators instead.
#[derive(Debug, thiserror::Error)]
#[error("failed to append audit event: {reason}")]
pub struct WriteError {
    reason: String,
}

impl WriteError {
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl From<sqlx::Error> for WriteError {
    fn from(err: sqlx::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// Append-only store of [`AuditEvent`]s.
///
/// Implementations must tolerate concurrent appends and concurrent count
/// queries; snapshot-consistent reads are sufficient.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append one event. The ledger offers no update or delete.
    async fn record(&self, event: AuditEvent) -> Result<(), WriteError>;

    /// All events for a principal, most recent first.
    async fn events_for_principal(&self, principal: &str) -> anyhow::Result<Vec<AuditEvent>>;

    /// Events for one action inside a closed time window.
    async fn events_by_window(
        &self,
        action: AuditAction,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<AuditEvent>>;

    /// Count of events matching principal, action and result with a
    /// timestamp strictly after `since`. Hot path for the lockout gate.
    async fn count_matching(
        &self,
        principal: &str,
        action: AuditAction,
        result: AuditResult,
        since: DateTime<Utc>,
    ) -> anyhow::Result<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_round_trips_through_str() {
        for action in [
            AuditAction::Login,
            AuditAction::Logout,
            AuditAction::CreateUser,
            AuditAction::UpdateUser,
            AuditAction::DeleteUser,
            AuditAction::EnableUser,
            AuditAction::DisableUser,
            AuditAction::ResetPassword,
            AuditAction::CreateRole,
            AuditAction::DeleteRole,
        ] {
            assert_eq!(action.as_str().parse::<AuditAction>(), Ok(action));
        }
        assert!("REBOOT".parse::<AuditAction>().is_err());
    }

    #[test]
    fn action_serializes_in_ledger_form() {
        let json = serde_json::to_string(&AuditAction::CreateUser).unwrap();
        assert_eq!(json, r#""CREATE_USER""#);
        assert_eq!(
            serde_json::to_string(&AuditResult::Failure).unwrap(),
            r#""FAILURE""#
        );
    }

    #[test]
    fn event_builder_assigns_timestamp_and_fields() {
        let event = AuditEvent::new(AuditAction::Login, "alice", AuditResult::Success)
            .with_source_ip(Some("203.0.113.7".to_string()))
            .with_details("login successful");

        assert_eq!(event.principal, "alice");
        assert_eq!(event.source_ip.as_deref(), Some("203.0.113.7"));
        assert_eq!(event.details.as_deref(), Some("login successful"));
        assert!(event.user_agent.is_none());
        assert!((Utc::now() - event.timestamp).num_seconds() < 5);
    }
}
