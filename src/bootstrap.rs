use crate::application::services::*;
use crate::config::Config;
use crate::domain::ports::{
    agent_directory::AgentDirectory, broadcast_gateway::BroadcastGateway, clock::Clock,
    conversation_store::ConversationStore, escalation_marks::EscalationMarks,
    escalation_rule_repository::EscalationRuleRepository, notifier::Notifier,
    routing_rule_repository::RoutingRuleRepository, task_spawner::TaskSpawner,
};
use crate::infrastructure::cache::InMemoryEscalationMarks;
use crate::infrastructure::http::middleware::AppState;
use crate::infrastructure::persistence::Database;
use crate::infrastructure::providers::{ConnectionHub, GatewayNotifier, WebhookNotifier};
use crate::infrastructure::runtime::{SystemClock, TokioTaskSpawner};
use crate::infrastructure::workers::EscalationWorker;
use std::sync::Arc;

/// Everything `main` needs: request state plus the background sweep.
pub struct App {
    pub state: AppState,
    pub escalation_worker: EscalationWorker,
}

pub fn build_app(db: Database, config: &Config) -> Result<App, Box<dyn std::error::Error>> {
    let task_spawner: Arc<dyn TaskSpawner> = Arc::new(TokioTaskSpawner::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());

    let agent_directory: Arc<dyn AgentDirectory> = Arc::new(db.clone());
    let conversation_store: Arc<dyn ConversationStore> = Arc::new(db.clone());
    let routing_rules: Arc<dyn RoutingRuleRepository> = Arc::new(db.clone());
    let escalation_rules: Arc<dyn EscalationRuleRepository> = Arc::new(db);

    let connection_hub = ConnectionHub::new();
    let gateway: Arc<dyn BroadcastGateway> = Arc::new(connection_hub.clone());

    let notifier: Arc<dyn Notifier> = match &config.notifier_webhook_url {
        Some(url) => {
            tracing::info!("Escalation notifications will be posted to {}", url);
            Arc::new(WebhookNotifier::new(
                url.clone(),
                config.escalation.notify_timeout,
            )?)
        }
        None => {
            tracing::info!("Escalation notifications will be delivered in-app");
            Arc::new(GatewayNotifier::new(gateway.clone()))
        }
    };

    let mark_horizon = chrono::Duration::from_std(config.escalation.mark_horizon)?;
    let marks: Arc<dyn EscalationMarks> = Arc::new(InMemoryEscalationMarks::new(
        mark_horizon,
        config.escalation.mark_capacity,
    ));

    let sla_service = SlaService::new(
        conversation_store.clone(),
        gateway.clone(),
        clock.clone(),
        config.sla_policy.clone(),
    );
    let queue_service = QueueService::new(conversation_store.clone());
    let routing_service = RoutingService::new(
        agent_directory.clone(),
        conversation_store.clone(),
        routing_rules,
        gateway.clone(),
        queue_service.clone(),
        sla_service.clone(),
        clock.clone(),
    );
    let presence_service = PresenceService::new(agent_directory.clone(), gateway.clone())
        .with_queue_drain(routing_service.clone(), task_spawner.clone());

    let escalation_service = EscalationService::new(
        escalation_rules,
        conversation_store,
        agent_directory,
        marks,
        notifier,
        gateway,
        task_spawner,
        clock,
        sla_service.clone(),
        EscalationSettings {
            max_matches_per_rule: config.escalation.max_matches_per_rule,
            org_budget: config.escalation.org_budget,
            notify_timeout: config.escalation.notify_timeout,
        },
    );
    let escalation_worker =
        EscalationWorker::new(escalation_service, config.escalation.sweep_interval);

    tracing::info!(
        "Services initialized (sweep every {:?}, mark horizon {:?})",
        config.escalation.sweep_interval,
        config.escalation.mark_horizon
    );

    Ok(App {
        state: AppState {
            routing_service,
            presence_service,
            queue_service,
            sla_service,
            connection_hub,
        },
        escalation_worker,
    })
}
