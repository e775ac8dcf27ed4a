use crate::application::services::{
    PresenceService, QueueService, RoutingService, SlaService,
};
use crate::infrastructure::providers::ConnectionHub;

#[derive(Clone)]
pub struct AppState {
    pub routing_service: RoutingService,
    pub presence_service: PresenceService,
    pub queue_service: QueueService,
    pub sla_service: SlaService,
    pub connection_hub: ConnectionHub,
}
