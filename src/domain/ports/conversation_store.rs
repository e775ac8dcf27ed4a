use crate::domain::entities::{
    Conversation, ConversationStatus, EscalationTrigger, Priority, SlaDeadlines,
};
use crate::domain::errors::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Why a conditional assignment did not take effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LostRace {
    /// Someone else assigned the conversation first.
    AlreadyAssigned,
    /// The conversation left `pending` (accepted, resolved or closed).
    NotPending,
    /// The agent filled up between the load read and the write.
    AgentAtCapacity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOutcome {
    Assigned,
    LostRace(LostRace),
}

/// Position after the last row of an escalation candidate page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateCursor {
    pub reference: DateTime<Utc>,
    pub conversation_id: String,
}

/// Read/write view of live conversations. Writes take the time to stamp
/// from the caller's clock.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create_conversation(&self, conversation: &Conversation) -> DomainResult<()>;

    async fn get_conversation(&self, conversation_id: &str) -> DomainResult<Option<Conversation>>;

    /// Non-terminal conversations per assigned agent.
    async fn count_active_by_agent(&self, org_id: &str) -> DomainResult<HashMap<String, u32>>;

    /// Pending, unassigned conversations of an org ahead of the given position
    /// in queue order: created strictly earlier, or at the same instant with a
    /// smaller id.
    async fn count_pending_before(
        &self,
        org_id: &str,
        created_at: DateTime<Utc>,
        conversation_id: &str,
    ) -> DomainResult<i64>;

    /// Assign only if the conversation is still pending and unassigned. When
    /// `capacity` is set the agent must also hold fewer than that many
    /// non-terminal conversations; both checks happen in the same atomic write.
    async fn assign(
        &self,
        conversation_id: &str,
        agent_id: &str,
        capacity: Option<u32>,
        at: DateTime<Utc>,
    ) -> DomainResult<AssignOutcome>;

    /// Unconditional reassignment used by escalation. Terminal conversations are left alone.
    async fn force_assign(
        &self,
        conversation_id: &str,
        agent_id: &str,
        at: DateTime<Utc>,
    ) -> DomainResult<bool>;

    /// Record that routing found nobody. Keeps an existing queue entry time.
    async fn mark_queued(&self, conversation_id: &str, at: DateTime<Utc>) -> DomainResult<()>;

    /// Pending, unassigned conversations of an org in queue order.
    async fn list_queued(&self, org_id: &str, limit: i64) -> DomainResult<Vec<Conversation>>;

    async fn set_priority(
        &self,
        conversation_id: &str,
        priority: Priority,
        at: DateTime<Utc>,
    ) -> DomainResult<()>;

    async fn set_deadlines(
        &self,
        conversation_id: &str,
        deadlines: &SlaDeadlines,
        at: DateTime<Utc>,
    ) -> DomainResult<()>;

    async fn update_status(
        &self,
        conversation_id: &str,
        status: ConversationStatus,
        at: DateTime<Utc>,
    ) -> DomainResult<()>;

    async fn record_customer_message(
        &self,
        conversation_id: &str,
        at: DateTime<Utc>,
    ) -> DomainResult<()>;

    /// Sets `first_response_at` on the first reply and moves an assigned
    /// pending conversation to `active`.
    async fn record_agent_reply(&self, conversation_id: &str, at: DateTime<Utc>)
        -> DomainResult<()>;

    /// Open conversations of an org matching an escalation trigger whose
    /// reference timestamp is at or before `cutoff`, ordered by
    /// `(reference, id)`, strictly after `after` when given, at most `limit`.
    async fn find_escalation_candidates(
        &self,
        org_id: &str,
        trigger: EscalationTrigger,
        cutoff: DateTime<Utc>,
        after: Option<&CandidateCursor>,
        limit: i64,
    ) -> DomainResult<Vec<Conversation>>;
}
