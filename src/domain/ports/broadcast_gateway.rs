use crate::domain::entities::{EscalationAction, OnlineStatus, Priority};
use crate::domain::events::RealtimeEvent;
use async_trait::async_trait;

/// Fan-out of real-time events to connected agents. Delivery is best effort;
/// a slow or gone connection never fails the caller.
#[async_trait]
pub trait BroadcastGateway: Send + Sync {
    async fn emit_presence_changed(&self, org_id: &str, agent_id: &str, status: OnlineStatus);

    async fn emit_assigned(&self, org_id: &str, conversation_id: &str, agent_id: &str);

    async fn emit_queued(&self, org_id: &str, conversation_id: &str, position: i64);

    async fn emit_escalated(
        &self,
        org_id: &str,
        conversation_id: &str,
        rule_id: &str,
        action: EscalationAction,
    );

    async fn emit_priority_changed(&self, org_id: &str, conversation_id: &str, priority: Priority);

    /// Direct delivery to specific agents, returns how many connections received it.
    async fn send_to_agents(&self, agent_ids: &[String], event: RealtimeEvent) -> usize;
}
