use crate::domain::entities::EscalationRule;
use crate::domain::errors::DomainResult;
use async_trait::async_trait;

#[async_trait]
pub trait EscalationRuleRepository: Send + Sync {
    /// Orgs with at least one active escalation rule, ascending.
    async fn list_orgs_with_active_rules(&self) -> DomainResult<Vec<String>>;

    async fn list_active_rules(&self, org_id: &str) -> DomainResult<Vec<EscalationRule>>;
}
