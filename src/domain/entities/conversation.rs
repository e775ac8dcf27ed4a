use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Pending,
    Active,
    Resolved,
    Closed,
}

impl ConversationStatus {
    /// Resolved and closed conversations no longer count toward agent load
    /// and never receive another assignment.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConversationStatus::Resolved | ConversationStatus::Closed)
    }
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationStatus::Pending => write!(f, "pending"),
            ConversationStatus::Active => write!(f, "active"),
            ConversationStatus::Resolved => write!(f, "resolved"),
            ConversationStatus::Closed => write!(f, "closed"),
        }
    }
}

impl std::str::FromStr for ConversationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ConversationStatus::Pending),
            "active" => Ok(ConversationStatus::Active),
            "resolved" => Ok(ConversationStatus::Resolved),
            "closed" => Ok(ConversationStatus::Closed),
            _ => Err(format!("Invalid conversation status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Low,
        Priority::Medium,
        Priority::High,
        Priority::Urgent,
    ];

    /// Next tier up; urgent stays urgent.
    pub fn bumped(&self) -> Priority {
        match self {
            Priority::Low => Priority::Medium,
            Priority::Medium => Priority::High,
            Priority::High | Priority::Urgent => Priority::Urgent,
        }
    }

    pub fn is_high(&self) -> bool {
        matches!(self, Priority::High | Priority::Urgent)
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Medium => write!(f, "medium"),
            Priority::High => write!(f, "high"),
            Priority::Urgent => write!(f, "urgent"),
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            _ => Err(format!("Invalid priority: {}", s)),
        }
    }
}

/// Routing input captured at first contact and kept on the conversation so a
/// queued conversation can be routed again later.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingContext {
    pub channel: String,
    pub page_url: Option<String>,
}

impl RoutingContext {
    pub fn new(channel: impl Into<String>, page_url: Option<String>) -> Self {
        Self {
            channel: channel.into(),
            page_url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaDeadlines {
    pub respond_by: DateTime<Utc>,
    pub resolve_by: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub org_id: String,
    pub status: ConversationStatus,
    pub priority: Priority,
    pub agent_id: Option<String>,
    pub channel: String,
    pub page_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub first_response_at: Option<DateTime<Utc>>,
    pub sla_respond_by: DateTime<Utc>,
    pub sla_resolve_by: DateTime<Utc>,
    pub queue_entered_at: Option<DateTime<Utc>>,
    pub last_customer_message_at: Option<DateTime<Utc>>,
    pub last_agent_reply_at: Option<DateTime<Utc>>,
}

impl Conversation {
    pub fn new(
        org_id: impl Into<String>,
        context: RoutingContext,
        priority: Priority,
        deadlines: SlaDeadlines,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            org_id: org_id.into(),
            status: ConversationStatus::Pending,
            priority,
            agent_id: None,
            channel: context.channel,
            page_url: context.page_url,
            created_at,
            first_response_at: None,
            sla_respond_by: deadlines.respond_by,
            sla_resolve_by: deadlines.resolve_by,
            queue_entered_at: None,
            last_customer_message_at: Some(created_at),
            last_agent_reply_at: None,
        }
    }

    pub fn routing_context(&self) -> RoutingContext {
        RoutingContext {
            channel: self.channel.clone(),
            page_url: self.page_url.clone(),
        }
    }

    /// Pending and not yet picked up by anyone.
    pub fn is_queued(&self) -> bool {
        self.status == ConversationStatus::Pending && self.agent_id.is_none()
    }
}
