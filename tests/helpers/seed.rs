use livedesk::domain::entities::{
    ActionConfig, Agent, AgentRole, EscalationAction, EscalationRule, EscalationTrigger,
    OnlineStatus, RoutingConditions, RoutingRule, RoutingTargetType,
};
use livedesk::infrastructure::persistence::Database;

pub async fn create_test_agent(
    db: &Database,
    id: &str,
    org_id: &str,
    max_concurrent_chats: u32,
    status: OnlineStatus,
) -> Agent {
    let agent = Agent::new(id, org_id, max_concurrent_chats).with_status(status);
    db.upsert_agent(&agent)
        .await
        .expect("Failed to create test agent");
    agent
}

pub async fn create_test_manager(db: &Database, id: &str, org_id: &str) -> Agent {
    let agent = Agent::new(id, org_id, 0).with_role(AgentRole::Manager);
    db.upsert_agent(&agent)
        .await
        .expect("Failed to create test manager");
    agent
}

pub async fn create_test_routing_rule(
    db: &Database,
    id: &str,
    org_id: &str,
    priority: i32,
    target_type: RoutingTargetType,
    target_id: Option<&str>,
    conditions: RoutingConditions,
) -> RoutingRule {
    let rule = RoutingRule {
        id: id.to_string(),
        org_id: org_id.to_string(),
        priority,
        is_active: true,
        conditions,
        target_type,
        target_id: target_id.map(str::to_string),
    };
    db.create_routing_rule(&rule)
        .await
        .expect("Failed to create routing rule");
    rule
}

pub async fn create_test_escalation_rule(
    db: &Database,
    id: &str,
    org_id: &str,
    trigger_type: EscalationTrigger,
    threshold_minutes: i64,
    action: EscalationAction,
    action_config: ActionConfig,
) -> EscalationRule {
    let rule = EscalationRule {
        id: id.to_string(),
        org_id: org_id.to_string(),
        is_active: true,
        trigger_type,
        threshold_minutes,
        action,
        action_config,
    };
    db.create_escalation_rule(&rule)
        .await
        .expect("Failed to create escalation rule");
    rule
}
