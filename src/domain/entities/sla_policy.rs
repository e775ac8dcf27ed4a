use crate::domain::entities::{Priority, SlaDeadlines};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlaTarget {
    pub first_response: chrono::Duration,
    pub resolution: chrono::Duration,
}

/// Fixed per-priority allowances. Higher priority always gets the shorter
/// allowance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlaPolicyTable {
    targets: HashMap<Priority, SlaTarget>,
}

impl Default for SlaPolicyTable {
    fn default() -> Self {
        let mut targets = HashMap::new();
        targets.insert(
            Priority::Low,
            SlaTarget {
                first_response: chrono::Duration::minutes(240),
                resolution: chrono::Duration::hours(72),
            },
        );
        targets.insert(
            Priority::Medium,
            SlaTarget {
                first_response: chrono::Duration::minutes(120),
                resolution: chrono::Duration::hours(48),
            },
        );
        targets.insert(
            Priority::High,
            SlaTarget {
                first_response: chrono::Duration::minutes(60),
                resolution: chrono::Duration::hours(24),
            },
        );
        targets.insert(
            Priority::Urgent,
            SlaTarget {
                first_response: chrono::Duration::minutes(15),
                resolution: chrono::Duration::hours(4),
            },
        );
        Self { targets }
    }
}

impl SlaPolicyTable {
    pub fn target(&self, priority: Priority) -> SlaTarget {
        // Every priority is seeded in Default and overrides only replace entries.
        self.targets
            .get(&priority)
            .copied()
            .unwrap_or(SlaTarget {
                first_response: chrono::Duration::minutes(120),
                resolution: chrono::Duration::hours(48),
            })
    }

    pub fn with_target(mut self, priority: Priority, target: SlaTarget) -> Self {
        self.targets.insert(priority, target);
        self
    }

    /// Deadlines offset from `now`. Never cumulative: a priority change
    /// recomputes both from the time of the change.
    pub fn compute_deadlines(&self, priority: Priority, now: DateTime<Utc>) -> SlaDeadlines {
        let target = self.target(priority);
        SlaDeadlines {
            respond_by: now + target.first_response,
            resolve_by: now + target.resolution,
        }
    }

    /// Overrides must keep allowances non-increasing as priority rises.
    pub fn validate(&self) -> Result<(), String> {
        for pair in Priority::ALL.windows(2) {
            let lower = self.target(pair[0]);
            let higher = self.target(pair[1]);
            if higher.first_response > lower.first_response || higher.resolution > lower.resolution
            {
                return Err(format!(
                    "SLA allowances for {} must not exceed those for {}",
                    pair[1], pair[0]
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_is_monotonic() {
        let table = SlaPolicyTable::default();
        assert!(table.validate().is_ok());
        assert!(
            table.target(Priority::Urgent).first_response
                < table.target(Priority::Low).first_response
        );
    }

    #[test]
    fn test_compute_deadlines_offsets_from_now() {
        let table = SlaPolicyTable::default();
        let now = Utc::now();
        let deadlines = table.compute_deadlines(Priority::High, now);
        assert_eq!(deadlines.respond_by, now + chrono::Duration::minutes(60));
        assert_eq!(deadlines.resolve_by, now + chrono::Duration::hours(24));
    }

    #[test]
    fn test_override_breaking_order_is_rejected() {
        let table = SlaPolicyTable::default().with_target(
            Priority::Urgent,
            SlaTarget {
                first_response: chrono::Duration::hours(10),
                resolution: chrono::Duration::hours(1),
            },
        );
        assert!(table.validate().is_err());
    }
}
