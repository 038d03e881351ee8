//! Postgres-backed ledger.
//!
//! Rows are append-only: the store issues `INSERT` and `SELECT` only, never
//! `UPDATE` or `DELETE`. The lockout count query is served by a composite
//! index on (principal, action, result, timestamp).

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::Instrument;

use super::{AuditAction, AuditEvent, AuditResult, AuditStore, WriteError};

#[derive(Clone, Debug)]
pub struct PgAuditStore {
    pool: PgPool,
}

impl PgAuditStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the ledger table and the lockout index if they do not exist.
    /// # Errors
    /// Returns an error if the schema statements fail.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS audit_log (
                id         BIGSERIAL PRIMARY KEY,
                action     TEXT NOT NULL,
                principal  TEXT NOT NULL,
                source_ip  TEXT,
                user_agent TEXT,
                resource   TEXT,
                result     TEXT NOT NULL,
                details    TEXT,
                timestamp  TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            ",
        )
        .execute(&self.pool)
        .await
        .context("failed to create audit_log table")?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS audit_log_lockout_idx
                ON audit_log (principal, action, result, timestamp)
            ",
        )
        .execute(&self.pool)
        .await
        .context("failed to create audit_log lockout index")?;

        Ok(())
    }
}

fn event_from_row(row: &sqlx::postgres::PgRow) -> Result<AuditEvent> {
    let action: String = row.get("action");
    let result: String = row.get("result");
    Ok(AuditEvent {
        action: action
            .parse::<AuditAction>()
            .map_err(anyhow::Error::msg)
            .context("audit_log row holds an unknown action")?,
        principal: row.get("principal"),
        source_ip: row.get("source_ip"),
        user_agent: row.get("user_agent"),
        resource: row.get("resource"),
        result: result
            .parse::<AuditResult>()
            .map_err(anyhow::Error::msg)
            .context("audit_log row holds an unknown result")?,
        details: row.get("details"),
        timestamp: row.get("timestamp"),
    })
}

#[async_trait]
impl AuditStore for PgAuditStore {
    async fn record(&self, event: AuditEvent) -> Result<(), WriteError> {
        let query = r"
            INSERT INTO audit_log
                (action, principal, source_ip, user_agent, resource, result, details, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(event.action.as_str())
            .bind(&event.principal)
            .bind(&event.source_ip)
            .bind(&event.user_agent)
            .bind(&event.resource)
            .bind(event.result.as_str())
            .bind(&event.details)
            .bind(event.timestamp)
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(())
    }

    async fn events_for_principal(&self, principal: &str) -> Result<Vec<AuditEvent>> {
        let query = r"
            SELECT action, principal, source_ip, user_agent, resource, result, details, timestamp
            FROM audit_log
            WHERE principal = $1
            ORDER BY timestamp DESC
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .bind(principal)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to query audit events by principal")?;

        rows.iter().map(event_from_row).collect()
    }

    async fn events_by_window(
        &self,
        action: AuditAction,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<AuditEvent>> {
        let query = r"
            SELECT action, principal, source_ip, user_agent, resource, result, details, timestamp
            FROM audit_log
            WHERE action = $1 AND timestamp BETWEEN $2 AND $3
            ORDER BY timestamp DESC
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .bind(action.as_str())
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to query audit events by window")?;

        rows.iter().map(event_from_row).collect()
    }

    async fn count_matching(
        &self,
        principal: &str,
        action: AuditAction,
        result: AuditResult,
        since: DateTime<Utc>,
    ) -> Result<u64> {
        let query = r"
            SELECT COUNT(*) AS total
            FROM audit_log
            WHERE principal = $1 AND action = $2 AND result = $3 AND timestamp > $4
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(principal)
            .bind(action.as_str())
            .bind(result.as_str())
            .bind(since)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to count matching audit events")?;

        let total: i64 = row.get("total");
        Ok(u64::try_from(total).unwrap_or(0))
    }
}
