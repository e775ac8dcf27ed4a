use chrono::{TimeZone, Utc};
use livedesk::application::services::*;
use livedesk::domain::entities::SlaPolicyTable;
use livedesk::domain::ports::{
    agent_directory::AgentDirectory, broadcast_gateway::BroadcastGateway, clock::Clock,
    conversation_store::ConversationStore, task_spawner::TaskSpawner,
};
use livedesk::infrastructure::cache::InMemoryEscalationMarks;
use livedesk::infrastructure::persistence::Database;
use livedesk::infrastructure::providers::{MockBroadcastGateway, MockNotifier};
use livedesk::infrastructure::runtime::{ManualClock, TokioTaskSpawner};
use std::sync::Arc;

/// All services wired against one SQLite database, with recorded events and
/// a clock the test moves by hand.
pub struct TestEngine {
    pub db: Database,
    pub gateway: MockBroadcastGateway,
    pub notifier: MockNotifier,
    pub clock: ManualClock,
    pub routing: RoutingService,
    pub presence: PresenceService,
    pub queue: QueueService,
    pub sla: SlaService,
    pub escalation: EscalationService,
}

/// SQLite keeps millisecond precision, so start on a whole millisecond.
pub fn test_clock() -> ManualClock {
    let start = Utc
        .timestamp_millis_opt(Utc::now().timestamp_millis())
        .single()
        .expect("valid timestamp");
    ManualClock::new(start)
}

pub fn build_engine(db: Database) -> TestEngine {
    build_engine_with(db, EscalationSettings::default())
}

pub fn build_engine_with(db: Database, settings: EscalationSettings) -> TestEngine {
    let gateway = MockBroadcastGateway::new();
    let notifier = MockNotifier::new();
    let clock = test_clock();

    let directory: Arc<dyn AgentDirectory> = Arc::new(db.clone());
    let store: Arc<dyn ConversationStore> = Arc::new(db.clone());
    let gateway_port: Arc<dyn BroadcastGateway> = Arc::new(gateway.clone());
    let clock_port: Arc<dyn Clock> = Arc::new(clock.clone());
    let spawner: Arc<dyn TaskSpawner> = Arc::new(TokioTaskSpawner::new());

    let sla = SlaService::new(
        store.clone(),
        gateway_port.clone(),
        clock_port.clone(),
        SlaPolicyTable::default(),
    );
    let queue = QueueService::new(store.clone());
    let routing = RoutingService::new(
        directory.clone(),
        store.clone(),
        Arc::new(db.clone()),
        gateway_port.clone(),
        queue.clone(),
        sla.clone(),
        clock_port.clone(),
    );
    let presence = PresenceService::new(directory.clone(), gateway_port.clone())
        .with_queue_drain(routing.clone(), spawner.clone());
    let escalation = EscalationService::new(
        Arc::new(db.clone()),
        store,
        directory,
        Arc::new(InMemoryEscalationMarks::default()),
        Arc::new(notifier.clone()),
        gateway_port,
        spawner,
        clock_port,
        sla.clone(),
        settings,
    );

    TestEngine {
        db,
        gateway,
        notifier,
        clock,
        routing,
        presence,
        queue,
        sla,
        escalation,
    }
}

/// Give spawned notification and drain tasks a chance to run.
pub async fn settle() {
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
}

pub fn app_state(engine: &TestEngine) -> livedesk::infrastructure::http::middleware::AppState {
    livedesk::infrastructure::http::middleware::AppState {
        routing_service: engine.routing.clone(),
        presence_service: engine.presence.clone(),
        queue_service: engine.queue.clone(),
        sla_service: engine.sla.clone(),
        connection_hub: livedesk::infrastructure::providers::ConnectionHub::new(),
    }
}
