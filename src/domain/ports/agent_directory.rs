use crate::domain::entities::{Agent, OnlineStatus};
use crate::domain::errors::DomainResult;
use async_trait::async_trait;

/// View of the agents the engine may route to.
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    async fn list_agents(&self, org_id: &str) -> DomainResult<Vec<Agent>>;

    async fn get_agent(&self, agent_id: &str) -> DomainResult<Option<Agent>>;

    /// Agent ids belonging to a team
    async fn list_team_members(&self, team_id: &str) -> DomainResult<Vec<String>>;

    /// Persist a presence transition. Only the presence tracker calls this.
    async fn update_online_status(&self, agent_id: &str, status: OnlineStatus)
        -> DomainResult<()>;

    /// Set every non-offline agent to offline. Returns how many changed.
    async fn reset_online_statuses(&self) -> DomainResult<u64>;
}
