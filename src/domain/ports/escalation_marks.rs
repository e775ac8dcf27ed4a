use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Short-lived idempotency records keyed by `(rule_id, conversation_id)`.
#[async_trait]
pub trait EscalationMarks: Send + Sync {
    /// Records the mark and returns `true` when no live mark existed.
    async fn insert_if_absent(&self, rule_id: &str, conversation_id: &str, now: DateTime<Utc>)
        -> bool;

    /// Drops marks older than the horizon, returns how many were removed.
    async fn prune(&self, now: DateTime<Utc>) -> usize;

    async fn len(&self) -> usize;
}
