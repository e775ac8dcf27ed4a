use crate::domain::entities::RoutingRule;
use crate::domain::errors::DomainResult;
use async_trait::async_trait;

#[async_trait]
pub trait RoutingRuleRepository: Send + Sync {
    /// Active rules of an org. Callers must not rely on the returned order.
    async fn list_active_rules(&self, org_id: &str) -> DomainResult<Vec<RoutingRule>>;
}
