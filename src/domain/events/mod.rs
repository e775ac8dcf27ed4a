use crate::domain::entities::{EscalationAction, OnlineStatus, Priority};
use serde::Serialize;

/// Events pushed to connected agents over the broadcast gateway.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RealtimeEvent {
    PresenceChanged {
        org_id: String,
        agent_id: String,
        status: OnlineStatus,
        timestamp: String, // ISO 8601
    },
    ConversationAssigned {
        org_id: String,
        conversation_id: String,
        agent_id: String,
        timestamp: String, // ISO 8601
    },
    ConversationQueued {
        org_id: String,
        conversation_id: String,
        position: i64,
        timestamp: String, // ISO 8601
    },
    ConversationEscalated {
        org_id: String,
        conversation_id: String,
        rule_id: String,
        action: EscalationAction,
        timestamp: String, // ISO 8601
    },
    PriorityChanged {
        org_id: String,
        conversation_id: String,
        priority: Priority,
        timestamp: String, // ISO 8601
    },
    Notification {
        title: String,
        content: String,
        resource_ref: Option<String>,
        timestamp: String, // ISO 8601
    },
}

impl RealtimeEvent {
    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            RealtimeEvent::PresenceChanged { .. } => "presence_changed",
            RealtimeEvent::ConversationAssigned { .. } => "conversation_assigned",
            RealtimeEvent::ConversationQueued { .. } => "conversation_queued",
            RealtimeEvent::ConversationEscalated { .. } => "conversation_escalated",
            RealtimeEvent::PriorityChanged { .. } => "priority_changed",
            RealtimeEvent::Notification { .. } => "notification",
        }
    }
}
