use crate::domain::entities::{Conversation, Priority, SlaDeadlines, SlaPolicyTable};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{
    broadcast_gateway::BroadcastGateway, clock::Clock, conversation_store::ConversationStore,
};
use std::sync::Arc;

/// Response and resolution deadlines, plus the message timestamps the
/// escalation triggers read.
#[derive(Clone)]
pub struct SlaService {
    conversation_store: Arc<dyn ConversationStore>,
    gateway: Arc<dyn BroadcastGateway>,
    clock: Arc<dyn Clock>,
    policy: SlaPolicyTable,
}

impl SlaService {
    pub fn new(
        conversation_store: Arc<dyn ConversationStore>,
        gateway: Arc<dyn BroadcastGateway>,
        clock: Arc<dyn Clock>,
        policy: SlaPolicyTable,
    ) -> Self {
        Self {
            conversation_store,
            gateway,
            clock,
            policy,
        }
    }

    /// Deadlines for a conversation created or reprioritized right now.
    pub fn compute_deadlines(&self, priority: Priority) -> SlaDeadlines {
        self.policy.compute_deadlines(priority, self.clock.now())
    }

    async fn load(&self, conversation_id: &str) -> DomainResult<Conversation> {
        self.conversation_store
            .get_conversation(conversation_id)
            .await?
            .ok_or_else(|| {
                DomainError::NotFound(format!("Conversation {} not found", conversation_id))
            })
    }

    /// Set a new priority and recompute both deadlines from now.
    pub async fn change_priority(
        &self,
        conversation_id: &str,
        priority: Priority,
    ) -> DomainResult<Conversation> {
        let conversation = self.load(conversation_id).await?;
        if conversation.status.is_terminal() {
            return Err(DomainError::ValidationError(format!(
                "Conversation {} is {}",
                conversation_id, conversation.status
            )));
        }

        let now = self.clock.now();
        let deadlines = self.policy.compute_deadlines(priority, now);
        self.conversation_store
            .set_priority(conversation_id, priority, now)
            .await?;
        self.conversation_store
            .set_deadlines(conversation_id, &deadlines, now)
            .await?;

        tracing::info!(
            "Conversation {} priority {} -> {}, respond by {}",
            conversation_id,
            conversation.priority,
            priority,
            deadlines.respond_by
        );

        self.gateway
            .emit_priority_changed(&conversation.org_id, conversation_id, priority)
            .await;

        self.load(conversation_id).await
    }

    pub async fn record_customer_message(&self, conversation_id: &str) -> DomainResult<()> {
        let conversation = self.load(conversation_id).await?;
        if conversation.status.is_terminal() {
            return Err(DomainError::ValidationError(format!(
                "Conversation {} is {}",
                conversation_id, conversation.status
            )));
        }
        self.conversation_store
            .record_customer_message(conversation_id, self.clock.now())
            .await
    }

    pub async fn record_agent_reply(&self, conversation_id: &str) -> DomainResult<()> {
        let conversation = self.load(conversation_id).await?;
        if conversation.status.is_terminal() {
            return Err(DomainError::ValidationError(format!(
                "Conversation {} is {}",
                conversation_id, conversation.status
            )));
        }
        if conversation.first_response_at.is_none() {
            tracing::info!("First response recorded for conversation {}", conversation_id);
        }
        self.conversation_store
            .record_agent_reply(conversation_id, self.clock.now())
            .await
    }
}
