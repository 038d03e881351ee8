//! In-memory ledger used by tests and local development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{AuditAction, AuditEvent, AuditResult, AuditStore, WriteError};

/// Keeps the full ledger in a `Vec` behind an async mutex. Appends and
/// counts are serialized per store, which gives the snapshot-consistent
/// reads the ledger contract asks for.
#[derive(Debug, Default)]
pub struct MemoryAuditStore {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of events, regardless of filters.
    pub async fn len(&self) -> usize {
        self.events.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.lock().await.is_empty()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn record(&self, event: AuditEvent) -> Result<(), WriteError> {
        self.events.lock().await.push(event);
        Ok(())
    }

    async fn events_for_principal(&self, principal: &str) -> anyhow::Result<Vec<AuditEvent>> {
        let events = self.events.lock().await;
        let mut matching: Vec<AuditEvent> = events
            .iter()
            .filter(|event| event.principal == principal)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(matching)
    }

    async fn events_by_window(
        &self,
        action: AuditAction,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<AuditEvent>> {
        let events = self.events.lock().await;
        Ok(events
            .iter()
            .filter(|event| {
                event.action == action && event.timestamp >= start && event.timestamp <= end
            })
            .cloned()
            .collect())
    }

    async fn count_matching(
        &self,
        principal: &str,
        action: AuditAction,
        result: AuditResult,
        since: DateTime<Utc>,
    ) -> anyhow::Result<u64> {
        let events = self.events.lock().await;
        Ok(events
            .iter()
            .filter(|event| {
                event.principal == principal
                    && event.action == action
                    && event.result == result
                    && event.timestamp > since
            })
            .count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn failed_login(principal: &str) -> AuditEvent {
        AuditEvent::new(AuditAction::Login, principal, AuditResult::Failure)
    }

    #[tokio::test]
    async fn count_matching_filters_on_all_fields() {
        let store = MemoryAuditStore::new();
        let since = Utc::now() - Duration::minutes(15);

        store.record(failed_login("alice")).await.unwrap();
        store.record(failed_login("bob")).await.unwrap();
        store
            .record(AuditEvent::new(
                AuditAction::Login,
                "alice",
                AuditResult::Success,
            ))
            .await
            .unwrap();
        store
            .record(failed_login("alice").with_timestamp(Utc::now() - Duration::minutes(16)))
            .await
            .unwrap();

        let count = store
            .count_matching("alice", AuditAction::Login, AuditResult::Failure, since)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn events_for_principal_most_recent_first() {
        let store = MemoryAuditStore::new();
        let older = failed_login("alice").with_timestamp(Utc::now() - Duration::minutes(5));
        let newer = failed_login("alice");
        store.record(older.clone()).await.unwrap();
        store.record(newer.clone()).await.unwrap();

        let events = store.events_for_principal("alice").await.unwrap();
        assert_eq!(events, vec![newer, older]);
    }

    #[tokio::test]
    async fn window_query_is_inclusive_on_both_ends() {
        let store = MemoryAuditStore::new();
        let at = Utc::now();
        store
            .record(failed_login("alice").with_timestamp(at))
            .await
            .unwrap();

        let events = store
            .events_by_window(AuditAction::Login, at, at)
            .await
            .unwrap();
        assert_eq!(events.len(), 1);

        let events = store
            .events_by_window(AuditAction::Logout, at, at)
            .await
            .unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn concurrent_appends_lose_nothing() {
        let store = std::sync::Arc::new(MemoryAuditStore::new());
        let mut handles = Vec::new();
        for n in 0..50 {
            let store = std::sync::Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.record(failed_login(&format!("user-{n}"))).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(store.len().await, 50);
    }
}
