use crate::application::services::RoutingService;
use crate::domain::entities::OnlineStatus;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{
    agent_directory::AgentDirectory, broadcast_gateway::BroadcastGateway,
    task_spawner::TaskSpawner,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresenceSnapshot {
    pub status: OnlineStatus,
    pub connections: u32,
}

struct AgentPresence {
    org_id: String,
    connections: u32,
    /// Explicit busy/away set by the agent. Survives reconnects until the
    /// agent goes back online explicitly.
    override_status: Option<OnlineStatus>,
    status: OnlineStatus,
}

type PresenceSlot = Arc<Mutex<AgentPresence>>;

/// Connection reference counting and status transitions per agent.
///
/// Each agent has its own async mutex held across persist and broadcast, so
/// transitions for one agent are totally ordered while different agents
/// proceed in parallel.
#[derive(Clone)]
pub struct PresenceService {
    agent_directory: Arc<dyn AgentDirectory>,
    gateway: Arc<dyn BroadcastGateway>,
    slots: Arc<Mutex<HashMap<String, PresenceSlot>>>,
    queue_drain: Option<(RoutingService, Arc<dyn TaskSpawner>)>,
}

impl PresenceService {
    pub fn new(
        agent_directory: Arc<dyn AgentDirectory>,
        gateway: Arc<dyn BroadcastGateway>,
    ) -> Self {
        Self {
            agent_directory,
            gateway,
            slots: Arc::new(Mutex::new(HashMap::new())),
            queue_drain: None,
        }
    }

    /// Drain the org queue in the background whenever an agent becomes
    /// assignable.
    pub fn with_queue_drain(mut self, routing: RoutingService, spawner: Arc<dyn TaskSpawner>) -> Self {
        self.queue_drain = Some((routing, spawner));
        self
    }

    /// First sight of an agent in this process. Status follows the
    /// connection counter, which starts at zero, so a stale persisted status
    /// is written back to offline before the slot is used.
    async fn slot(&self, agent_id: &str) -> DomainResult<PresenceSlot> {
        let mut slots = self.slots.lock().await;
        if let Some(slot) = slots.get(agent_id) {
            return Ok(slot.clone());
        }

        let agent = self
            .agent_directory
            .get_agent(agent_id)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("Agent {} not found", agent_id)))?;

        if agent.online_status != OnlineStatus::Offline {
            self.agent_directory
                .update_online_status(agent_id, OnlineStatus::Offline)
                .await?;
            tracing::info!(
                "Agent {} was stored as {} with no open connections, reset to offline",
                agent_id,
                agent.online_status
            );
        }

        let slot = Arc::new(Mutex::new(AgentPresence {
            org_id: agent.org_id,
            connections: 0,
            override_status: None,
            status: OnlineStatus::Offline,
        }));
        slots.insert(agent_id.to_string(), slot.clone());
        Ok(slot)
    }

    /// Mark every stored agent offline. Run once at startup, before any
    /// connection is accepted.
    pub async fn reset_all(&self) -> DomainResult<u64> {
        let reset = self.agent_directory.reset_online_statuses().await?;
        if reset > 0 {
            tracing::info!("Reset {} agents to offline at startup", reset);
        }
        Ok(reset)
    }

    async fn existing_slot(&self, agent_id: &str) -> Option<PresenceSlot> {
        self.slots.lock().await.get(agent_id).cloned()
    }

    /// Persist, broadcast and optionally trigger a drain. Caller holds the
    /// agent's lock.
    async fn transition(
        &self,
        agent_id: &str,
        presence: &mut AgentPresence,
        status: OnlineStatus,
    ) -> DomainResult<()> {
        if presence.status == status {
            return Ok(());
        }

        self.agent_directory
            .update_online_status(agent_id, status)
            .await?;

        let previous = presence.status;
        presence.status = status;

        tracing::info!("Agent {} presence {} -> {}", agent_id, previous, status);
        metrics::counter!("livedesk_presence_transitions_total").increment(1);

        self.gateway
            .emit_presence_changed(&presence.org_id, agent_id, status)
            .await;

        if status.is_assignable() && !previous.is_assignable() {
            if let Some((routing, spawner)) = &self.queue_drain {
                let routing = routing.clone();
                let org_id = presence.org_id.clone();
                spawner.spawn(Box::pin(async move {
                    if let Err(e) = routing.drain_queue(&org_id).await {
                        tracing::error!("Queue drain for org {} failed: {}", org_id, e);
                    }
                }));
            }
        }

        Ok(())
    }

    pub async fn on_connect(&self, agent_id: &str, org_id: &str) -> DomainResult<()> {
        let slot = self.slot(agent_id).await?;
        let mut presence = slot.lock().await;

        if presence.org_id != org_id {
            return Err(DomainError::ValidationError(format!(
                "Agent {} does not belong to org {}",
                agent_id, org_id
            )));
        }

        presence.connections += 1;
        tracing::debug!(
            "Agent {} connected ({} connections)",
            agent_id,
            presence.connections
        );

        if presence.connections == 1 {
            let status = presence.override_status.unwrap_or(OnlineStatus::Online);
            if let Err(e) = self.transition(agent_id, &mut presence, status).await {
                presence.connections -= 1;
                return Err(e);
            }
        }

        Ok(())
    }

    pub async fn on_disconnect(&self, agent_id: &str, org_id: &str) -> DomainResult<()> {
        let Some(slot) = self.existing_slot(agent_id).await else {
            tracing::warn!("Disconnect for unknown agent {} in org {}", agent_id, org_id);
            return Ok(());
        };
        let mut presence = slot.lock().await;

        if presence.connections == 0 {
            tracing::warn!("Disconnect for agent {} with no open connections", agent_id);
            return Ok(());
        }

        presence.connections -= 1;
        tracing::debug!(
            "Agent {} disconnected ({} connections left)",
            agent_id,
            presence.connections
        );

        if presence.connections == 0 {
            self.transition(agent_id, &mut presence, OnlineStatus::Offline)
                .await?;
        }

        Ok(())
    }

    pub async fn on_explicit_status(&self, agent_id: &str, status: OnlineStatus) -> DomainResult<()> {
        let slot = self.slot(agent_id).await?;
        let mut presence = slot.lock().await;

        match status {
            OnlineStatus::Offline => {
                if presence.connections > 0 {
                    tracing::warn!(
                        "Rejected explicit offline for agent {} with {} open connections",
                        agent_id,
                        presence.connections
                    );
                    return Err(DomainError::ValidationError(
                        "Cannot go offline while connected".to_string(),
                    ));
                }
                Ok(())
            }
            OnlineStatus::Online => {
                presence.override_status = None;
                self.transition(agent_id, &mut presence, status).await
            }
            OnlineStatus::Busy | OnlineStatus::Away => {
                presence.override_status = Some(status);
                self.transition(agent_id, &mut presence, status).await
            }
        }
    }

    pub async fn snapshot(&self, agent_id: &str) -> DomainResult<PresenceSnapshot> {
        let slot = self.slot(agent_id).await?;
        let presence = slot.lock().await;
        Ok(PresenceSnapshot {
            status: presence.status,
            connections: presence.connections,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::Agent;
    use crate::domain::events::RealtimeEvent;
    use crate::infrastructure::memory::InMemoryStore;
    use crate::infrastructure::providers::MockBroadcastGateway;

    async fn fixture() -> (InMemoryStore, MockBroadcastGateway, PresenceService) {
        let store = InMemoryStore::new();
        store.upsert_agent(Agent::new("a1", "org1", 3)).await;
        let gateway = MockBroadcastGateway::new();
        let presence = PresenceService::new(Arc::new(store.clone()), Arc::new(gateway.clone()));
        (store, gateway, presence)
    }

    async fn transitions(gateway: &MockBroadcastGateway) -> Vec<OnlineStatus> {
        gateway
            .events()
            .await
            .into_iter()
            .filter_map(|e| match e {
                RealtimeEvent::PresenceChanged { status, .. } => Some(status),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_many_connections_emit_two_transitions() {
        let (store, gateway, presence) = fixture().await;

        for _ in 0..5 {
            presence.on_connect("a1", "org1").await.unwrap();
        }
        for _ in 0..5 {
            presence.on_disconnect("a1", "org1").await.unwrap();
        }

        assert_eq!(
            transitions(&gateway).await,
            vec![OnlineStatus::Online, OnlineStatus::Offline]
        );
        let agent = store.get_agent("a1").await.unwrap().unwrap();
        assert_eq!(agent.online_status, OnlineStatus::Offline);
    }

    #[tokio::test]
    async fn test_extra_disconnect_is_ignored() {
        let (_, gateway, presence) = fixture().await;

        presence.on_connect("a1", "org1").await.unwrap();
        presence.on_disconnect("a1", "org1").await.unwrap();
        presence.on_disconnect("a1", "org1").await.unwrap();

        let snapshot = presence.snapshot("a1").await.unwrap();
        assert_eq!(snapshot.connections, 0);
        assert_eq!(transitions(&gateway).await.len(), 2);
    }

    #[tokio::test]
    async fn test_explicit_offline_rejected_while_connected() {
        let (_, _, presence) = fixture().await;
        presence.on_connect("a1", "org1").await.unwrap();

        let result = presence
            .on_explicit_status("a1", OnlineStatus::Offline)
            .await;
        assert!(matches!(result, Err(DomainError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_away_override_survives_reconnect() {
        let (_, gateway, presence) = fixture().await;

        presence.on_connect("a1", "org1").await.unwrap();
        presence
            .on_explicit_status("a1", OnlineStatus::Away)
            .await
            .unwrap();
        presence.on_disconnect("a1", "org1").await.unwrap();
        presence.on_connect("a1", "org1").await.unwrap();

        assert_eq!(
            transitions(&gateway).await,
            vec![
                OnlineStatus::Online,
                OnlineStatus::Away,
                OnlineStatus::Offline,
                OnlineStatus::Away
            ]
        );

        presence
            .on_explicit_status("a1", OnlineStatus::Online)
            .await
            .unwrap();
        assert_eq!(
            presence.snapshot("a1").await.unwrap().status,
            OnlineStatus::Online
        );
    }

    #[tokio::test]
    async fn test_connect_rejects_foreign_org() {
        let (_, _, presence) = fixture().await;
        let result = presence.on_connect("a1", "org2").await;
        assert!(matches!(result, Err(DomainError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_unknown_agent_is_not_found() {
        let (_, _, presence) = fixture().await;
        let result = presence.on_connect("ghost", "org1").await;
        assert!(matches!(result, Err(DomainError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_concurrent_connects_single_online_transition() {
        let (_, gateway, presence) = fixture().await;

        let mut handles = Vec::new();
        for _ in 0..20 {
            let presence = presence.clone();
            handles.push(tokio::spawn(async move {
                presence.on_connect("a1", "org1").await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(transitions(&gateway).await, vec![OnlineStatus::Online]);
        assert_eq!(presence.snapshot("a1").await.unwrap().connections, 20);
    }

    #[tokio::test]
    async fn test_stale_online_status_is_not_trusted() {
        let (store, gateway, presence) = fixture().await;
        store
            .upsert_agent(Agent::new("a1", "org1", 3).with_status(OnlineStatus::Online))
            .await;

        let snapshot = presence.snapshot("a1").await.unwrap();
        assert_eq!(snapshot.status, OnlineStatus::Offline);
        assert_eq!(
            store.get_agent("a1").await.unwrap().unwrap().online_status,
            OnlineStatus::Offline
        );

        for _ in 0..3 {
            presence.on_connect("a1", "org1").await.unwrap();
        }
        for _ in 0..3 {
            presence.on_disconnect("a1", "org1").await.unwrap();
        }

        assert_eq!(
            transitions(&gateway).await,
            vec![OnlineStatus::Online, OnlineStatus::Offline]
        );
    }

    #[tokio::test]
    async fn test_reset_all_marks_everyone_offline() {
        let (store, _, presence) = fixture().await;
        store
            .upsert_agent(Agent::new("a2", "org1", 3).with_status(OnlineStatus::Busy))
            .await;
        store
            .upsert_agent(Agent::new("b1", "org2", 3).with_status(OnlineStatus::Online))
            .await;

        assert_eq!(presence.reset_all().await.unwrap(), 2);
        assert_eq!(presence.reset_all().await.unwrap(), 0);
        for id in ["a1", "a2", "b1"] {
            let agent = store.get_agent(id).await.unwrap().unwrap();
            assert_eq!(agent.online_status, OnlineStatus::Offline);
        }
    }
}
