use crate::application::services::{LoadBalancer, QueueService, SlaService};
use crate::domain::entities::{
    Agent, Conversation, ConversationStatus, Priority, RoutingContext, RoutingRule,
    RoutingTargetType,
};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{
    agent_directory::AgentDirectory,
    broadcast_gateway::BroadcastGateway,
    clock::Clock,
    conversation_store::{AssignOutcome, ConversationStore, LostRace},
    routing_rule_repository::RoutingRuleRepository,
};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

/// Queued conversations considered per drain pass.
const DRAIN_BATCH: i64 = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RoutingOutcome {
    Assigned { agent_id: String },
    Queued { position: i64 },
    /// Another writer won, or the conversation is no longer pending.
    AlreadyHandled { agent_id: Option<String> },
}

enum RouteDecision {
    /// Explicit agent target, assigned without a capacity check.
    Explicit(String),
    Balanced(Agent),
    NoAgent,
}

/// Rule evaluation, conditional assignment and queue draining.
#[derive(Clone)]
pub struct RoutingService {
    agent_directory: Arc<dyn AgentDirectory>,
    conversation_store: Arc<dyn ConversationStore>,
    routing_rules: Arc<dyn RoutingRuleRepository>,
    gateway: Arc<dyn BroadcastGateway>,
    queue: QueueService,
    sla: SlaService,
    clock: Arc<dyn Clock>,
}

impl RoutingService {
    pub fn new(
        agent_directory: Arc<dyn AgentDirectory>,
        conversation_store: Arc<dyn ConversationStore>,
        routing_rules: Arc<dyn RoutingRuleRepository>,
        gateway: Arc<dyn BroadcastGateway>,
        queue: QueueService,
        sla: SlaService,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            agent_directory,
            conversation_store,
            routing_rules,
            gateway,
            queue,
            sla,
            clock,
        }
    }

    /// Pick an agent for a routing context without writing anything.
    pub async fn route(
        &self,
        org_id: &str,
        context: &RoutingContext,
    ) -> DomainResult<Option<String>> {
        let decision = self.decide(org_id, context, &HashSet::new()).await?;
        Ok(match decision {
            RouteDecision::Explicit(agent_id) => Some(agent_id),
            RouteDecision::Balanced(agent) => Some(agent.id),
            RouteDecision::NoAgent => None,
        })
    }

    async fn decide(
        &self,
        org_id: &str,
        context: &RoutingContext,
        excluded: &HashSet<String>,
    ) -> DomainResult<RouteDecision> {
        let mut rules = self.routing_rules.list_active_rules(org_id).await?;
        rules.sort_by(RoutingRule::evaluation_order);

        let Some(rule) = rules.iter().find(|r| r.matches(context)) else {
            return self.balance(org_id, None, excluded).await;
        };

        tracing::debug!(
            "Routing rule {} ({}) matched in org {}",
            rule.id,
            rule.target_type,
            org_id
        );

        match (rule.target_type, rule.target_id.as_deref()) {
            (RoutingTargetType::Agent, Some(agent_id)) => {
                Ok(RouteDecision::Explicit(agent_id.to_string()))
            }
            (RoutingTargetType::Agent, None) => {
                tracing::warn!(
                    "Routing rule {} targets an agent but names none, using org-wide balancing",
                    rule.id
                );
                self.balance(org_id, None, excluded).await
            }
            (RoutingTargetType::Team | RoutingTargetType::RoundRobinTeam, Some(team_id)) => {
                let members: HashSet<String> = self
                    .agent_directory
                    .list_team_members(team_id)
                    .await?
                    .into_iter()
                    .collect();
                self.balance(org_id, Some(&members), excluded).await
            }
            (RoutingTargetType::RoundRobinTeam, None) => {
                self.balance(org_id, None, excluded).await
            }
            (RoutingTargetType::Team, None) => {
                tracing::warn!(
                    "Routing rule {} targets a team but names none, conversation will queue",
                    rule.id
                );
                Ok(RouteDecision::NoAgent)
            }
        }
    }

    async fn balance(
        &self,
        org_id: &str,
        members: Option<&HashSet<String>>,
        excluded: &HashSet<String>,
    ) -> DomainResult<RouteDecision> {
        let candidates: Vec<Agent> = self
            .agent_directory
            .list_agents(org_id)
            .await?
            .into_iter()
            .filter(|a| !excluded.contains(&a.id))
            .filter(|a| members.map_or(true, |m| m.contains(&a.id)))
            .collect();

        let active_load = self.conversation_store.count_active_by_agent(org_id).await?;

        Ok(match LoadBalancer::pick(&candidates, &active_load) {
            Some(agent) => RouteDecision::Balanced(agent.clone()),
            None => RouteDecision::NoAgent,
        })
    }

    async fn load(&self, conversation_id: &str) -> DomainResult<Conversation> {
        self.conversation_store
            .get_conversation(conversation_id)
            .await?
            .ok_or_else(|| {
                DomainError::NotFound(format!("Conversation {} not found", conversation_id))
            })
    }

    /// Route a pending conversation and write the assignment conditionally.
    ///
    /// A capacity race excludes the losing agent and picks again; every other
    /// lost race means someone else already handled the conversation.
    pub async fn assign_conversation(&self, conversation_id: &str) -> DomainResult<RoutingOutcome> {
        let conversation = self.load(conversation_id).await?;
        if !conversation.is_queued() {
            return Ok(RoutingOutcome::AlreadyHandled {
                agent_id: conversation.agent_id,
            });
        }

        let context = conversation.routing_context();
        let mut excluded = HashSet::new();

        loop {
            let (agent_id, capacity) =
                match self.decide(&conversation.org_id, &context, &excluded).await? {
                    RouteDecision::Explicit(agent_id) => (agent_id, None),
                    RouteDecision::Balanced(agent) => {
                        let capacity = agent.capacity();
                        (agent.id, capacity)
                    }
                    RouteDecision::NoAgent => return self.enqueue(&conversation).await,
                };

            match self
                .conversation_store
                .assign(conversation_id, &agent_id, capacity, self.clock.now())
                .await?
            {
                AssignOutcome::Assigned => {
                    tracing::info!(
                        "Conversation {} assigned to agent {}",
                        conversation_id,
                        agent_id
                    );
                    metrics::counter!("livedesk_assignments_total").increment(1);
                    self.gateway
                        .emit_assigned(&conversation.org_id, conversation_id, &agent_id)
                        .await;
                    return Ok(RoutingOutcome::Assigned { agent_id });
                }
                AssignOutcome::LostRace(LostRace::AgentAtCapacity) => {
                    tracing::warn!(
                        "Agent {} filled up before conversation {} could be assigned, re-routing",
                        agent_id,
                        conversation_id
                    );
                    metrics::counter!("livedesk_assignment_lost_races_total").increment(1);
                    excluded.insert(agent_id);
                }
                AssignOutcome::LostRace(reason) => {
                    tracing::warn!(
                        "Conversation {} was handled concurrently ({:?})",
                        conversation_id,
                        reason
                    );
                    metrics::counter!("livedesk_assignment_lost_races_total").increment(1);
                    let current = self.load(conversation_id).await?;
                    return Ok(RoutingOutcome::AlreadyHandled {
                        agent_id: current.agent_id,
                    });
                }
            }
        }
    }

    async fn enqueue(&self, conversation: &Conversation) -> DomainResult<RoutingOutcome> {
        self.conversation_store
            .mark_queued(&conversation.id, self.clock.now())
            .await?;

        match self.queue.position(&conversation.id).await? {
            Some(position) => {
                tracing::info!(
                    "No agent available for conversation {}, queued at position {}",
                    conversation.id,
                    position
                );
                metrics::counter!("livedesk_conversations_queued_total").increment(1);
                self.gateway
                    .emit_queued(&conversation.org_id, &conversation.id, position)
                    .await;
                Ok(RoutingOutcome::Queued { position })
            }
            None => {
                let current = self.load(&conversation.id).await?;
                Ok(RoutingOutcome::AlreadyHandled {
                    agent_id: current.agent_id,
                })
            }
        }
    }

    /// Assign queued conversations of an org, oldest first. Returns how many
    /// were assigned.
    pub async fn drain_queue(&self, org_id: &str) -> DomainResult<usize> {
        let queued = self
            .conversation_store
            .list_queued(org_id, DRAIN_BATCH)
            .await?;

        if queued.is_empty() {
            tracing::debug!("Queue for org {} is empty", org_id);
            return Ok(0);
        }

        let mut assigned = 0;
        for conversation in queued {
            match self.assign_conversation(&conversation.id).await {
                Ok(RoutingOutcome::Assigned { .. }) => assigned += 1,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(
                        "Failed to drain conversation {} in org {}: {}",
                        conversation.id,
                        org_id,
                        e
                    );
                }
            }
        }

        tracing::info!("Drained {} conversations from org {} queue", assigned, org_id);
        Ok(assigned)
    }

    /// Intake: stamp deadlines, store as pending and route.
    pub async fn create_conversation(
        &self,
        org_id: &str,
        context: RoutingContext,
        priority: Priority,
    ) -> DomainResult<(Conversation, RoutingOutcome)> {
        let deadlines = self.sla.compute_deadlines(priority);
        let conversation = Conversation::new(org_id, context, priority, deadlines, self.clock.now());
        self.conversation_store
            .create_conversation(&conversation)
            .await?;

        tracing::info!(
            "Conversation {} created in org {} with priority {}",
            conversation.id,
            org_id,
            priority
        );

        let outcome = self.assign_conversation(&conversation.id).await?;
        let conversation = self.load(&conversation.id).await?;
        Ok((conversation, outcome))
    }

    /// Resolve or close a conversation and hand its slot to the queue.
    pub async fn release_conversation(
        &self,
        conversation_id: &str,
        status: ConversationStatus,
    ) -> DomainResult<Conversation> {
        if !status.is_terminal() {
            return Err(DomainError::ValidationError(format!(
                "Release status must be resolved or closed, got {}",
                status
            )));
        }

        let conversation = self.load(conversation_id).await?;
        if conversation.status.is_terminal() {
            return Ok(conversation);
        }

        self.conversation_store
            .update_status(conversation_id, status, self.clock.now())
            .await?;
        tracing::info!("Conversation {} {}", conversation_id, status);

        if let Err(e) = self.drain_queue(&conversation.org_id).await {
            tracing::error!(
                "Queue drain after releasing {} failed: {}",
                conversation_id,
                e
            );
        }

        self.load(conversation_id).await
    }
}
