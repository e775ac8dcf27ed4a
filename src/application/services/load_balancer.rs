use crate::domain::entities::Agent;
use std::collections::HashMap;

/// Least-loaded selection over a candidate set.
pub struct LoadBalancer;

impl LoadBalancer {
    /// Assignable agents under capacity, minimum active load, ties by
    /// ascending agent id. `None` means the conversation should be queued.
    pub fn pick<'a>(
        candidates: &'a [Agent],
        active_load: &HashMap<String, u32>,
    ) -> Option<&'a Agent> {
        candidates
            .iter()
            .filter(|agent| agent.online_status.is_assignable())
            .map(|agent| (agent, active_load.get(&agent.id).copied().unwrap_or(0)))
            .filter(|(agent, load)| agent.has_capacity_for(*load))
            .min_by(|(a, load_a), (b, load_b)| load_a.cmp(load_b).then_with(|| a.id.cmp(&b.id)))
            .map(|(agent, _)| agent)
    }
}
