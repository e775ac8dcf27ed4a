pub mod escalation_marks;

pub use escalation_marks::InMemoryEscalationMarks;
