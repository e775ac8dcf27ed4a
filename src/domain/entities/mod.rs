pub mod agent;
pub mod conversation;
pub mod escalation_rule;
pub mod routing_rule;
pub mod sla_policy;

pub use agent::*;
pub use conversation::*;
pub use escalation_rule::*;
pub use routing_rule::*;
pub use sla_policy::*;
