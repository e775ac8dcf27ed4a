pub mod escalation_worker;

pub use escalation_worker::EscalationWorker;
