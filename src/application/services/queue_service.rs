use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::conversation_store::ConversationStore;
use std::sync::Arc;

/// Lazily computed queue positions. Nothing is stored; the position is the
/// number of queued peers ahead plus one.
#[derive(Clone)]
pub struct QueueService {
    conversation_store: Arc<dyn ConversationStore>,
}

impl QueueService {
    pub fn new(conversation_store: Arc<dyn ConversationStore>) -> Self {
        Self { conversation_store }
    }

    /// 1-based position, or `None` when the conversation is not waiting.
    pub async fn position(&self, conversation_id: &str) -> DomainResult<Option<i64>> {
        let conversation = self
            .conversation_store
            .get_conversation(conversation_id)
            .await?
            .ok_or_else(|| {
                DomainError::NotFound(format!("Conversation {} not found", conversation_id))
            })?;

        if !conversation.is_queued() {
            return Ok(None);
        }

        let ahead = self
            .conversation_store
            .count_pending_before(
                &conversation.org_id,
                conversation.created_at,
                &conversation.id,
            )
            .await?;

        Ok(Some(ahead + 1))
    }
}
