use chrono::{DateTime, Utc};

/// Source of "now" so deadlines, queue anchors and sweeps can be tested
/// without sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
