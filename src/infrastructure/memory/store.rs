use crate::domain::entities::{
    Agent, Conversation, ConversationStatus, EscalationRule, EscalationTrigger, OnlineStatus,
    Priority, RoutingRule, SlaDeadlines,
};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{
    agent_directory::AgentDirectory,
    conversation_store::{AssignOutcome, CandidateCursor, ConversationStore, LostRace},
    escalation_rule_repository::EscalationRuleRepository,
    routing_rule_repository::RoutingRuleRepository,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct StoreState {
    agents: BTreeMap<String, Agent>,
    conversations: HashMap<String, Conversation>,
    routing_rules: Vec<RoutingRule>,
    escalation_rules: Vec<EscalationRule>,
}

impl StoreState {
    fn active_load(&self, agent_id: &str) -> u32 {
        self.conversations
            .values()
            .filter(|c| c.agent_id.as_deref() == Some(agent_id) && !c.status.is_terminal())
            .count() as u32
    }

    fn conversation_mut(&mut self, conversation_id: &str) -> DomainResult<&mut Conversation> {
        self.conversations.get_mut(conversation_id).ok_or_else(|| {
            DomainError::NotFound(format!("Conversation {} not found", conversation_id))
        })
    }
}

/// Process-local implementation of every store port. A single lock makes
/// each operation atomic, which is what the conditional assignment needs.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert_agent(&self, agent: Agent) {
        let mut state = self.state.write().await;
        state.agents.insert(agent.id.clone(), agent);
    }

    pub async fn add_routing_rule(&self, rule: RoutingRule) {
        self.state.write().await.routing_rules.push(rule);
    }

    pub async fn add_escalation_rule(&self, rule: EscalationRule) {
        self.state.write().await.escalation_rules.push(rule);
    }

    pub async fn active_load(&self, agent_id: &str) -> u32 {
        self.state.read().await.active_load(agent_id)
    }
}

#[async_trait]
impl AgentDirectory for InMemoryStore {
    async fn list_agents(&self, org_id: &str) -> DomainResult<Vec<Agent>> {
        let state = self.state.read().await;
        Ok(state
            .agents
            .values()
            .filter(|a| a.org_id == org_id)
            .cloned()
            .collect())
    }

    async fn get_agent(&self, agent_id: &str) -> DomainResult<Option<Agent>> {
        Ok(self.state.read().await.agents.get(agent_id).cloned())
    }

    async fn list_team_members(&self, team_id: &str) -> DomainResult<Vec<String>> {
        let state = self.state.read().await;
        Ok(state
            .agents
            .values()
            .filter(|a| a.team_ids.contains(team_id))
            .map(|a| a.id.clone())
            .collect())
    }

    async fn update_online_status(
        &self,
        agent_id: &str,
        status: OnlineStatus,
    ) -> DomainResult<()> {
        let mut state = self.state.write().await;
        let agent = state
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| DomainError::NotFound(format!("Agent {} not found", agent_id)))?;
        agent.online_status = status;
        Ok(())
    }

    async fn reset_online_statuses(&self) -> DomainResult<u64> {
        let mut state = self.state.write().await;
        let mut reset = 0;
        for agent in state.agents.values_mut() {
            if agent.online_status != OnlineStatus::Offline {
                agent.online_status = OnlineStatus::Offline;
                reset += 1;
            }
        }
        Ok(reset)
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn create_conversation(&self, conversation: &Conversation) -> DomainResult<()> {
        let mut state = self.state.write().await;
        if state.conversations.contains_key(&conversation.id) {
            return Err(DomainError::Conflict(format!(
                "Conversation {} already exists",
                conversation.id
            )));
        }
        state
            .conversations
            .insert(conversation.id.clone(), conversation.clone());
        Ok(())
    }

    async fn get_conversation(&self, conversation_id: &str) -> DomainResult<Option<Conversation>> {
        Ok(self
            .state
            .read()
            .await
            .conversations
            .get(conversation_id)
            .cloned())
    }

    async fn count_active_by_agent(&self, org_id: &str) -> DomainResult<HashMap<String, u32>> {
        let state = self.state.read().await;
        let mut loads = HashMap::new();
        for conversation in state.conversations.values() {
            if conversation.org_id != org_id || conversation.status.is_terminal() {
                continue;
            }
            if let Some(agent_id) = &conversation.agent_id {
                *loads.entry(agent_id.clone()).or_insert(0) += 1;
            }
        }
        Ok(loads)
    }

    async fn count_pending_before(
        &self,
        org_id: &str,
        created_at: DateTime<Utc>,
        conversation_id: &str,
    ) -> DomainResult<i64> {
        let state = self.state.read().await;
        Ok(state
            .conversations
            .values()
            .filter(|c| c.org_id == org_id && c.is_queued())
            .filter(|c| {
                c.created_at < created_at
                    || (c.created_at == created_at && c.id.as_str() < conversation_id)
            })
            .count() as i64)
    }

    async fn assign(
        &self,
        conversation_id: &str,
        agent_id: &str,
        capacity: Option<u32>,
        _at: DateTime<Utc>,
    ) -> DomainResult<AssignOutcome> {
        let mut state = self.state.write().await;

        let load = state.active_load(agent_id);
        let conversation = state.conversation_mut(conversation_id)?;

        if conversation.status != ConversationStatus::Pending {
            return Ok(AssignOutcome::LostRace(LostRace::NotPending));
        }
        if conversation.agent_id.is_some() {
            return Ok(AssignOutcome::LostRace(LostRace::AlreadyAssigned));
        }
        if let Some(max) = capacity {
            if load >= max {
                return Ok(AssignOutcome::LostRace(LostRace::AgentAtCapacity));
            }
        }

        conversation.agent_id = Some(agent_id.to_string());
        Ok(AssignOutcome::Assigned)
    }

    async fn force_assign(
        &self,
        conversation_id: &str,
        agent_id: &str,
        _at: DateTime<Utc>,
    ) -> DomainResult<bool> {
        let mut state = self.state.write().await;
        let conversation = state.conversation_mut(conversation_id)?;
        if conversation.status.is_terminal() {
            return Ok(false);
        }
        conversation.agent_id = Some(agent_id.to_string());
        Ok(true)
    }

    async fn mark_queued(&self, conversation_id: &str, at: DateTime<Utc>) -> DomainResult<()> {
        let mut state = self.state.write().await;
        let conversation = state.conversation_mut(conversation_id)?;
        if conversation.is_queued() && conversation.queue_entered_at.is_none() {
            conversation.queue_entered_at = Some(at);
        }
        Ok(())
    }

    async fn list_queued(&self, org_id: &str, limit: i64) -> DomainResult<Vec<Conversation>> {
        let state = self.state.read().await;
        let mut queued: Vec<Conversation> = state
            .conversations
            .values()
            .filter(|c| c.org_id == org_id && c.is_queued())
            .cloned()
            .collect();
        queued.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        queued.truncate(limit.max(0) as usize);
        Ok(queued)
    }

    async fn set_priority(
        &self,
        conversation_id: &str,
        priority: Priority,
        _at: DateTime<Utc>,
    ) -> DomainResult<()> {
        let mut state = self.state.write().await;
        state.conversation_mut(conversation_id)?.priority = priority;
        Ok(())
    }

    async fn set_deadlines(
        &self,
        conversation_id: &str,
        deadlines: &SlaDeadlines,
        _at: DateTime<Utc>,
    ) -> DomainResult<()> {
        let mut state = self.state.write().await;
        let conversation = state.conversation_mut(conversation_id)?;
        conversation.sla_respond_by = deadlines.respond_by;
        conversation.sla_resolve_by = deadlines.resolve_by;
        Ok(())
    }

    async fn update_status(
        &self,
        conversation_id: &str,
        status: ConversationStatus,
        _at: DateTime<Utc>,
    ) -> DomainResult<()> {
        let mut state = self.state.write().await;
        state.conversation_mut(conversation_id)?.status = status;
        Ok(())
    }

    async fn record_customer_message(
        &self,
        conversation_id: &str,
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        let mut state = self.state.write().await;
        state.conversation_mut(conversation_id)?.last_customer_message_at = Some(at);
        Ok(())
    }

    async fn record_agent_reply(
        &self,
        conversation_id: &str,
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        let mut state = self.state.write().await;
        let conversation = state.conversation_mut(conversation_id)?;
        conversation.last_agent_reply_at = Some(at);
        if conversation.first_response_at.is_none() {
            conversation.first_response_at = Some(at);
        }
        if conversation.status == ConversationStatus::Pending && conversation.agent_id.is_some() {
            conversation.status = ConversationStatus::Active;
        }
        Ok(())
    }

    async fn find_escalation_candidates(
        &self,
        org_id: &str,
        trigger: EscalationTrigger,
        cutoff: DateTime<Utc>,
        after: Option<&CandidateCursor>,
        limit: i64,
    ) -> DomainResult<Vec<Conversation>> {
        let state = self.state.read().await;
        let mut matches: Vec<(DateTime<Utc>, Conversation)> = state
            .conversations
            .values()
            .filter(|c| c.org_id == org_id && !c.status.is_terminal())
            .filter_map(|c| {
                let reference = match trigger {
                    EscalationTrigger::FirstResponseSla => {
                        c.first_response_at.is_none().then_some(c.created_at)
                    }
                    EscalationTrigger::ResolutionSla => Some(c.created_at),
                    EscalationTrigger::NoResponse => {
                        c.last_customer_message_at.filter(|customer_at| {
                            c.last_agent_reply_at
                                .map_or(true, |agent_at| agent_at < *customer_at)
                        })
                    }
                    EscalationTrigger::PriorityHigh => {
                        c.priority.is_high().then_some(c.created_at)
                    }
                }?;
                (reference <= cutoff).then(|| (reference, c.clone()))
            })
            .filter(|(reference, c)| {
                after.map_or(true, |cursor| {
                    (*reference, c.id.as_str())
                        > (cursor.reference, cursor.conversation_id.as_str())
                })
            })
            .collect();

        matches.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id)));
        Ok(matches
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|(_, c)| c)
            .collect())
    }
}

#[async_trait]
impl RoutingRuleRepository for InMemoryStore {
    async fn list_active_rules(&self, org_id: &str) -> DomainResult<Vec<RoutingRule>> {
        let state = self.state.read().await;
        Ok(state
            .routing_rules
            .iter()
            .filter(|r| r.org_id == org_id && r.is_active)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl EscalationRuleRepository for InMemoryStore {
    async fn list_orgs_with_active_rules(&self) -> DomainResult<Vec<String>> {
        let state = self.state.read().await;
        let orgs: BTreeSet<String> = state
            .escalation_rules
            .iter()
            .filter(|r| r.is_active)
            .map(|r| r.org_id.clone())
            .collect();
        Ok(orgs.into_iter().collect())
    }

    async fn list_active_rules(&self, org_id: &str) -> DomainResult<Vec<EscalationRule>> {
        let state = self.state.read().await;
        Ok(state
            .escalation_rules
            .iter()
            .filter(|r| r.org_id == org_id && r.is_active)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::RoutingContext;

    fn conversation(org_id: &str, created_at: DateTime<Utc>) -> Conversation {
        Conversation::new(
            org_id,
            RoutingContext::new("web_widget", None),
            Priority::Medium,
            SlaDeadlines {
                respond_by: created_at,
                resolve_by: created_at,
            },
            created_at,
        )
    }

    #[tokio::test]
    async fn test_assign_is_conditional() {
        let store = InMemoryStore::new();
        let c1 = conversation("org1", Utc::now());
        store.create_conversation(&c1).await.unwrap();

        let first = store.assign(&c1.id, "a1", None, Utc::now()).await.unwrap();
        let second = store.assign(&c1.id, "a2", None, Utc::now()).await.unwrap();

        assert_eq!(first, AssignOutcome::Assigned);
        assert_eq!(second, AssignOutcome::LostRace(LostRace::AlreadyAssigned));
    }

    #[tokio::test]
    async fn test_assign_respects_capacity() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let c1 = conversation("org1", now);
        let c2 = conversation("org1", now);
        store.create_conversation(&c1).await.unwrap();
        store.create_conversation(&c2).await.unwrap();

        assert_eq!(
            store.assign(&c1.id, "a1", Some(1), now).await.unwrap(),
            AssignOutcome::Assigned
        );
        assert_eq!(
            store.assign(&c2.id, "a1", Some(1), now).await.unwrap(),
            AssignOutcome::LostRace(LostRace::AgentAtCapacity)
        );
        // Explicit targeting passes no capacity
        assert_eq!(
            store.assign(&c2.id, "a1", None, now).await.unwrap(),
            AssignOutcome::Assigned
        );
    }

    #[tokio::test]
    async fn test_terminal_conversation_is_not_assignable() {
        let store = InMemoryStore::new();
        let c1 = conversation("org1", Utc::now());
        store.create_conversation(&c1).await.unwrap();
        store
            .update_status(&c1.id, ConversationStatus::Closed, Utc::now())
            .await
            .unwrap();

        assert_eq!(
            store.assign(&c1.id, "a1", None, Utc::now()).await.unwrap(),
            AssignOutcome::LostRace(LostRace::NotPending)
        );
        assert!(!store.force_assign(&c1.id, "a1", Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_no_response_candidates() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let waiting = conversation("org1", now - chrono::Duration::minutes(40));
        let answered = conversation("org1", now - chrono::Duration::minutes(40));
        store.create_conversation(&waiting).await.unwrap();
        store.create_conversation(&answered).await.unwrap();
        store
            .record_agent_reply(&answered.id, now - chrono::Duration::minutes(5))
            .await
            .unwrap();

        let found = store
            .find_escalation_candidates(
                "org1",
                EscalationTrigger::NoResponse,
                now - chrono::Duration::minutes(30),
                None,
                10,
            )
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, waiting.id);
    }

    #[tokio::test]
    async fn test_candidate_pages_resume_after_cursor() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let created = now - chrono::Duration::minutes(40);
        let mut ids = Vec::new();
        for _ in 0..3 {
            let c = conversation("org1", created);
            store.create_conversation(&c).await.unwrap();
            ids.push(c.id);
        }
        ids.sort();

        let first = store
            .find_escalation_candidates("org1", EscalationTrigger::ResolutionSla, now, None, 2)
            .await
            .unwrap();
        let cursor = CandidateCursor {
            reference: created,
            conversation_id: first[1].id.clone(),
        };
        let second = store
            .find_escalation_candidates(
                "org1",
                EscalationTrigger::ResolutionSla,
                now,
                Some(&cursor),
                2,
            )
            .await
            .unwrap();

        let seen: Vec<String> = first.iter().chain(second.iter()).map(|c| c.id.clone()).collect();
        assert_eq!(seen, ids);
    }
}
