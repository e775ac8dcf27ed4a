pub mod agent_directory;
pub mod broadcast_gateway;
pub mod clock;
pub mod conversation_store;
pub mod escalation_marks;
pub mod escalation_rule_repository;
pub mod notifier;
pub mod routing_rule_repository;
pub mod task_spawner;
