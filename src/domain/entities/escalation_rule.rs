use crate::domain::entities::{Conversation, Priority};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationTrigger {
    /// No agent reply since the conversation was created.
    FirstResponseSla,
    /// Still open after the threshold.
    ResolutionSla,
    /// Customer wrote last and nobody answered since.
    NoResponse,
    /// High or urgent conversation still open after the threshold.
    PriorityHigh,
}

impl EscalationTrigger {
    /// The timestamp the threshold is measured from. Candidate scans are
    /// ordered by this value, then by conversation id.
    pub fn reference_time(&self, conversation: &Conversation) -> Option<DateTime<Utc>> {
        match self {
            EscalationTrigger::NoResponse => conversation.last_customer_message_at,
            _ => Some(conversation.created_at),
        }
    }
}

impl fmt::Display for EscalationTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EscalationTrigger::FirstResponseSla => write!(f, "first_response_sla"),
            EscalationTrigger::ResolutionSla => write!(f, "resolution_sla"),
            EscalationTrigger::NoResponse => write!(f, "no_response"),
            EscalationTrigger::PriorityHigh => write!(f, "priority_high"),
        }
    }
}

impl std::str::FromStr for EscalationTrigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first_response_sla" => Ok(EscalationTrigger::FirstResponseSla),
            "resolution_sla" => Ok(EscalationTrigger::ResolutionSla),
            "no_response" => Ok(EscalationTrigger::NoResponse),
            "priority_high" => Ok(EscalationTrigger::PriorityHigh),
            _ => Err(format!("Invalid escalation trigger: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationAction {
    NotifyManager,
    NotifyTeam,
    Reassign,
    ChangePriority,
}

impl fmt::Display for EscalationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EscalationAction::NotifyManager => write!(f, "notify_manager"),
            EscalationAction::NotifyTeam => write!(f, "notify_team"),
            EscalationAction::Reassign => write!(f, "reassign"),
            EscalationAction::ChangePriority => write!(f, "change_priority"),
        }
    }
}

impl std::str::FromStr for EscalationAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "notify_manager" => Ok(EscalationAction::NotifyManager),
            "notify_team" => Ok(EscalationAction::NotifyTeam),
            "reassign" => Ok(EscalationAction::Reassign),
            "change_priority" => Ok(EscalationAction::ChangePriority),
            _ => Err(format!("Invalid escalation action: {}", s)),
        }
    }
}

/// Optional knobs per action. Unknown keys in stored JSON are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recipient_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationRule {
    pub id: String,
    pub org_id: String,
    pub is_active: bool,
    pub trigger_type: EscalationTrigger,
    pub threshold_minutes: i64,
    pub action: EscalationAction,
    #[serde(default)]
    pub action_config: ActionConfig,
}

impl EscalationRule {
    pub fn threshold(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.threshold_minutes.max(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_config_from_partial_json() {
        let config: ActionConfig =
            serde_json::from_str(r#"{"target_agent_id":"a9","unused":true}"#).unwrap();
        assert_eq!(config.target_agent_id.as_deref(), Some("a9"));
        assert!(config.recipient_ids.is_empty());
        assert_eq!(config.priority, None);
    }

    #[test]
    fn test_trigger_round_trips_through_display() {
        for trigger in [
            EscalationTrigger::FirstResponseSla,
            EscalationTrigger::ResolutionSla,
            EscalationTrigger::NoResponse,
            EscalationTrigger::PriorityHigh,
        ] {
            assert_eq!(trigger.to_string().parse::<EscalationTrigger>(), Ok(trigger));
        }
    }

    #[test]
    fn test_negative_threshold_clamped() {
        let rule = EscalationRule {
            id: "r1".to_string(),
            org_id: "org1".to_string(),
            is_active: true,
            trigger_type: EscalationTrigger::ResolutionSla,
            threshold_minutes: -5,
            action: EscalationAction::NotifyTeam,
            action_config: ActionConfig::default(),
        };
        assert_eq!(rule.threshold(), chrono::Duration::zero());
    }
}
