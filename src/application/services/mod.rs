pub mod escalation_service;
pub mod load_balancer;
pub mod presence_service;
pub mod queue_service;
pub mod routing_service;
pub mod sla_service;

pub use escalation_service::{EscalationService, EscalationSettings, SweepReport};
pub use load_balancer::LoadBalancer;
pub use presence_service::{PresenceService, PresenceSnapshot};
pub use queue_service::QueueService;
pub use routing_service::{RoutingOutcome, RoutingService};
pub use sla_service::SlaService;
