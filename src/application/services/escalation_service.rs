use crate::application::services::{LoadBalancer, SlaService};
use crate::domain::entities::{
    Agent, Conversation, EscalationAction, EscalationRule, OnlineStatus,
};
use crate::domain::errors::DomainResult;
use crate::domain::ports::{
    agent_directory::AgentDirectory,
    broadcast_gateway::BroadcastGateway,
    clock::Clock,
    conversation_store::{CandidateCursor, ConversationStore},
    escalation_marks::EscalationMarks,
    escalation_rule_repository::EscalationRuleRepository,
    notifier::{Notification, Notifier},
    task_spawner::TaskSpawner,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct EscalationSettings {
    /// Upper bound on actions attempted per rule per tick. Already-marked
    /// conversations do not count. Also the candidate page size.
    pub max_matches_per_rule: i64,
    /// Wall-clock budget per org. Checked between actions, so an action in
    /// flight always completes.
    pub org_budget: Duration,
    pub notify_timeout: Duration,
}

impl Default for EscalationSettings {
    fn default() -> Self {
        Self {
            max_matches_per_rule: 200,
            org_budget: Duration::from_secs(30),
            notify_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub orgs_scanned: usize,
    pub matched: usize,
    pub fired: usize,
    pub skipped_marked: usize,
    pub failed_actions: usize,
    pub failed_orgs: usize,
    pub pruned_marks: usize,
}

/// Periodic scan of active escalation rules.
#[derive(Clone)]
pub struct EscalationService {
    rules: Arc<dyn EscalationRuleRepository>,
    conversation_store: Arc<dyn ConversationStore>,
    agent_directory: Arc<dyn AgentDirectory>,
    marks: Arc<dyn EscalationMarks>,
    notifier: Arc<dyn Notifier>,
    gateway: Arc<dyn BroadcastGateway>,
    spawner: Arc<dyn TaskSpawner>,
    clock: Arc<dyn Clock>,
    sla: SlaService,
    settings: EscalationSettings,
}

impl EscalationService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rules: Arc<dyn EscalationRuleRepository>,
        conversation_store: Arc<dyn ConversationStore>,
        agent_directory: Arc<dyn AgentDirectory>,
        marks: Arc<dyn EscalationMarks>,
        notifier: Arc<dyn Notifier>,
        gateway: Arc<dyn BroadcastGateway>,
        spawner: Arc<dyn TaskSpawner>,
        clock: Arc<dyn Clock>,
        sla: SlaService,
        settings: EscalationSettings,
    ) -> Self {
        Self {
            rules,
            conversation_store,
            agent_directory,
            marks,
            notifier,
            gateway,
            spawner,
            clock,
            sla,
            settings,
        }
    }

    /// One sweep over every org with active rules. Failures are counted in
    /// the report; a failing org never stops the others.
    pub async fn tick(&self) -> SweepReport {
        let started = Instant::now();
        let now = self.clock.now();
        let mut report = SweepReport {
            pruned_marks: self.marks.prune(now).await,
            ..SweepReport::default()
        };

        let orgs = match self.rules.list_orgs_with_active_rules().await {
            Ok(orgs) => orgs,
            Err(e) => {
                tracing::error!("Failed to list orgs with escalation rules: {}", e);
                report.failed_orgs += 1;
                return report;
            }
        };

        for org_id in orgs {
            report.orgs_scanned += 1;
            if let Err(e) = self.sweep_org(&org_id, now, &mut report).await {
                tracing::error!("Escalation sweep for org {} failed: {}", org_id, e);
                report.failed_orgs += 1;
            }
        }

        metrics::histogram!("livedesk_escalation_sweep_seconds")
            .record(started.elapsed().as_secs_f64());

        if report.matched == 0 {
            tracing::debug!("Escalation sweep found nothing: {:?}", report);
        } else {
            tracing::info!(
                "Escalation sweep: {} orgs, {} matched, {} fired, {} already marked, {} failed",
                report.orgs_scanned,
                report.matched,
                report.fired,
                report.skipped_marked,
                report.failed_actions
            );
        }

        report
    }

    async fn sweep_org(
        &self,
        org_id: &str,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> DomainResult<()> {
        let deadline = Instant::now() + self.settings.org_budget;

        let mut rules = self.rules.list_active_rules(org_id).await?;
        rules.sort_by(|a, b| a.id.cmp(&b.id));

        for rule in rules {
            if Instant::now() >= deadline {
                tracing::warn!("Escalation budget exhausted for org {}", org_id);
                return Ok(());
            }

            let cutoff = now - rule.threshold();
            let page_size = self.settings.max_matches_per_rule.max(1);
            let mut after: Option<CandidateCursor> = None;
            let mut attempted = 0;

            'pages: loop {
                let page = self
                    .conversation_store
                    .find_escalation_candidates(
                        org_id,
                        rule.trigger_type,
                        cutoff,
                        after.as_ref(),
                        page_size,
                    )
                    .await?;
                let last_page = (page.len() as i64) < page_size;
                after = page.last().and_then(|c| {
                    rule.trigger_type
                        .reference_time(c)
                        .map(|reference| CandidateCursor {
                            reference,
                            conversation_id: c.id.clone(),
                        })
                });

                for conversation in page {
                    if Instant::now() >= deadline {
                        tracing::warn!("Escalation budget exhausted for org {}", org_id);
                        return Ok(());
                    }
                    report.matched += 1;

                    if !self
                        .marks
                        .insert_if_absent(&rule.id, &conversation.id, now)
                        .await
                    {
                        report.skipped_marked += 1;
                        metrics::counter!("livedesk_escalations_skipped_total").increment(1);
                        continue;
                    }

                    attempted += 1;
                    self.fire(org_id, &rule, &conversation, report).await;

                    if attempted >= page_size {
                        tracing::debug!(
                            "Escalation rule {} reached {} actions this tick",
                            rule.id,
                            attempted
                        );
                        break 'pages;
                    }
                }

                if last_page || after.is_none() {
                    break;
                }
            }
        }

        Ok(())
    }

    async fn fire(
        &self,
        org_id: &str,
        rule: &EscalationRule,
        conversation: &Conversation,
        report: &mut SweepReport,
    ) {
        match self.execute(rule, conversation).await {
            Ok(true) => {
                report.fired += 1;
                metrics::counter!("livedesk_escalations_fired_total").increment(1);
                tracing::info!(
                    "Escalation rule {} ({} -> {}) fired for conversation {}",
                    rule.id,
                    rule.trigger_type,
                    rule.action,
                    conversation.id
                );
                self.gateway
                    .emit_escalated(org_id, &conversation.id, &rule.id, rule.action)
                    .await;
            }
            Ok(false) => {}
            Err(e) => {
                report.failed_actions += 1;
                tracing::error!(
                    "Escalation rule {} failed for conversation {}: {}",
                    rule.id,
                    conversation.id,
                    e
                );
            }
        }
    }

    /// Returns whether the action did anything.
    async fn execute(&self, rule: &EscalationRule, conversation: &Conversation) -> DomainResult<bool> {
        match rule.action {
            EscalationAction::NotifyManager => {
                let recipients = if rule.action_config.recipient_ids.is_empty() {
                    self.agent_directory
                        .list_agents(&conversation.org_id)
                        .await?
                        .into_iter()
                        .filter(|a| a.role.is_supervisor())
                        .map(|a| a.id)
                        .collect()
                } else {
                    rule.action_config.recipient_ids.clone()
                };
                Ok(self.dispatch(rule, conversation, recipients))
            }
            EscalationAction::NotifyTeam => {
                let recipients = match &rule.action_config.team_id {
                    Some(team_id) => self.agent_directory.list_team_members(team_id).await?,
                    None => self
                        .agent_directory
                        .list_agents(&conversation.org_id)
                        .await?
                        .into_iter()
                        .filter(|a| a.online_status != OnlineStatus::Offline)
                        .map(|a| a.id)
                        .collect(),
                };
                Ok(self.dispatch(rule, conversation, recipients))
            }
            EscalationAction::Reassign => self.reassign(rule, conversation).await,
            EscalationAction::ChangePriority => {
                let target = rule
                    .action_config
                    .priority
                    .unwrap_or_else(|| conversation.priority.bumped());
                if target == conversation.priority {
                    tracing::debug!(
                        "Conversation {} already at priority {}",
                        conversation.id,
                        target
                    );
                    return Ok(false);
                }
                self.sla.change_priority(&conversation.id, target).await?;
                Ok(true)
            }
        }
    }

    async fn reassign(&self, rule: &EscalationRule, conversation: &Conversation) -> DomainResult<bool> {
        let target = match &rule.action_config.target_agent_id {
            Some(agent_id) => Some(agent_id.clone()),
            None => {
                let candidates: Vec<Agent> = self
                    .agent_directory
                    .list_agents(&conversation.org_id)
                    .await?
                    .into_iter()
                    .filter(|a| conversation.agent_id.as_deref() != Some(a.id.as_str()))
                    .collect();
                let active_load = self
                    .conversation_store
                    .count_active_by_agent(&conversation.org_id)
                    .await?;
                LoadBalancer::pick(&candidates, &active_load).map(|a| a.id.clone())
            }
        };

        let Some(agent_id) = target else {
            tracing::warn!(
                "No agent available to take over conversation {} (rule {})",
                conversation.id,
                rule.id
            );
            return Ok(false);
        };

        if conversation.agent_id.as_deref() == Some(agent_id.as_str()) {
            return Ok(false);
        }

        if !self
            .conversation_store
            .force_assign(&conversation.id, &agent_id, self.clock.now())
            .await?
        {
            return Ok(false);
        }

        self.gateway
            .emit_assigned(&conversation.org_id, &conversation.id, &agent_id)
            .await;
        Ok(true)
    }

    /// Fire-and-forget delivery with its own timeout.
    fn dispatch(&self, rule: &EscalationRule, conversation: &Conversation, recipients: Vec<String>) -> bool {
        if recipients.is_empty() {
            tracing::warn!(
                "Escalation rule {} has no recipients for conversation {}",
                rule.id,
                conversation.id
            );
            return false;
        }

        let notification = Notification {
            recipient_ids: recipients,
            title: format!("Escalation: {}", rule.trigger_type),
            content: format!(
                "Conversation {} ({} priority) matched rule {} after {} minutes",
                conversation.id, conversation.priority, rule.id, rule.threshold_minutes
            ),
            resource_ref: Some(conversation.id.clone()),
        };

        let notifier = self.notifier.clone();
        let timeout = self.settings.notify_timeout;
        self.spawner.spawn(Box::pin(async move {
            match tokio::time::timeout(timeout, notifier.notify(notification)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("Escalation notification failed: {}", e),
                Err(_) => tracing::warn!("Escalation notification timed out after {:?}", timeout),
            }
        }));

        true
    }
}
