use crate::domain::ports::escalation_marks::EscalationMarks;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

type MarkKey = (String, String);

/// In-process mark set with TTL eviction and a hard size bound.
///
/// Lost on restart; the worst case is one duplicate escalation per
/// rule/conversation pair, never a missed one.
#[derive(Clone)]
pub struct InMemoryEscalationMarks {
    marks: Arc<Mutex<HashMap<MarkKey, DateTime<Utc>>>>,
    horizon: chrono::Duration,
    capacity: usize,
}

impl InMemoryEscalationMarks {
    pub fn new(horizon: chrono::Duration, capacity: usize) -> Self {
        Self {
            marks: Arc::new(Mutex::new(HashMap::new())),
            horizon,
            capacity: capacity.max(1),
        }
    }

    fn is_live(&self, marked_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - marked_at < self.horizon
    }
}

impl Default for InMemoryEscalationMarks {
    fn default() -> Self {
        Self::new(chrono::Duration::hours(1), 10_000)
    }
}

#[async_trait]
impl EscalationMarks for InMemoryEscalationMarks {
    async fn insert_if_absent(
        &self,
        rule_id: &str,
        conversation_id: &str,
        now: DateTime<Utc>,
    ) -> bool {
        let mut marks = self.marks.lock().await;
        let key = (rule_id.to_string(), conversation_id.to_string());

        if let Some(marked_at) = marks.get(&key) {
            if self.is_live(*marked_at, now) {
                return false;
            }
        }

        if !marks.contains_key(&key) && marks.len() >= self.capacity {
            marks.retain(|_, marked_at| now - *marked_at < self.horizon);
            if marks.len() >= self.capacity {
                let oldest = marks
                    .iter()
                    .min_by_key(|(_, marked_at)| **marked_at)
                    .map(|(key, _)| key.clone());
                if let Some(oldest) = oldest {
                    tracing::warn!(
                        "Escalation mark set full ({}), evicting mark for rule {} / conversation {}",
                        self.capacity,
                        oldest.0,
                        oldest.1
                    );
                    marks.remove(&oldest);
                }
            }
        }

        marks.insert(key, now);
        true
    }

    async fn prune(&self, now: DateTime<Utc>) -> usize {
        let mut marks = self.marks.lock().await;
        let before = marks.len();
        marks.retain(|_, marked_at| now - *marked_at < self.horizon);
        before - marks.len()
    }

    async fn len(&self) -> usize {
        self.marks.lock().await.len()
    }
}
