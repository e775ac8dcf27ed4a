use crate::domain::entities::RoutingContext;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingTargetType {
    Agent,
    Team,
    RoundRobinTeam,
}

impl fmt::Display for RoutingTargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingTargetType::Agent => write!(f, "agent"),
            RoutingTargetType::Team => write!(f, "team"),
            RoutingTargetType::RoundRobinTeam => write!(f, "round_robin_team"),
        }
    }
}

impl std::str::FromStr for RoutingTargetType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "agent" => Ok(RoutingTargetType::Agent),
            "team" => Ok(RoutingTargetType::Team),
            "round_robin_team" => Ok(RoutingTargetType::RoundRobinTeam),
            _ => Err(format!("Invalid routing target type: {}", s)),
        }
    }
}

/// Absent conditions are wildcards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingConditions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_url_contains: Option<String>,
}

impl RoutingConditions {
    pub fn matches(&self, context: &RoutingContext) -> bool {
        if let Some(channel) = &self.channel {
            if channel != &context.channel {
                return false;
            }
        }

        if let Some(fragment) = &self.page_url_contains {
            match &context.page_url {
                Some(url) if url.contains(fragment.as_str()) => {}
                _ => return false,
            }
        }

        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRule {
    pub id: String,
    pub org_id: String,
    pub priority: i32,
    pub is_active: bool,
    pub conditions: RoutingConditions,
    pub target_type: RoutingTargetType,
    pub target_id: Option<String>,
}

impl RoutingRule {
    /// Evaluation order: higher priority first, then ascending id.
    pub fn evaluation_order(a: &RoutingRule, b: &RoutingRule) -> Ordering {
        b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id))
    }

    pub fn matches(&self, context: &RoutingContext) -> bool {
        self.is_active && self.conditions.matches(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(id: &str, priority: i32) -> RoutingRule {
        RoutingRule {
            id: id.to_string(),
            org_id: "org1".to_string(),
            priority,
            is_active: true,
            conditions: RoutingConditions::default(),
            target_type: RoutingTargetType::Team,
            target_id: None,
        }
    }

    #[test]
    fn test_evaluation_order_priority_desc_then_id_asc() {
        let mut rules = vec![rule("b", 5), rule("c", 10), rule("a", 5), rule("d", 1)];
        rules.sort_by(RoutingRule::evaluation_order);
        let ids: Vec<_> = rules.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b", "d"]);
    }

    #[test]
    fn test_conditions_wildcard() {
        let context = RoutingContext::new("email", None);
        assert!(RoutingConditions::default().matches(&context));
    }

    #[test]
    fn test_conditions_channel_and_url() {
        let conditions = RoutingConditions {
            channel: Some("web_widget".to_string()),
            page_url_contains: Some("/pricing".to_string()),
        };

        let hit = RoutingContext::new(
            "web_widget",
            Some("https://example.com/pricing?plan=pro".to_string()),
        );
        let wrong_channel = RoutingContext::new("email", hit.page_url.clone());
        let no_url = RoutingContext::new("web_widget", None);

        assert!(conditions.matches(&hit));
        assert!(!conditions.matches(&wrong_channel));
        assert!(!conditions.matches(&no_url));
    }

    #[test]
    fn test_inactive_rule_never_matches() {
        let mut inactive = rule("x", 1);
        inactive.is_active = false;
        assert!(!inactive.matches(&RoutingContext::new("web_widget", None)));
    }
}
