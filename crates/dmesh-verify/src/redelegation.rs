use dmesh_core::constants::{DEFAULT_MAX_REDELEGATIONS, DEFAULT_REDELEGATION_COOLDOWN_MS};
use dmesh_core::types::{DelegationTracker, NodeId, TaskId};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Clone, Debug)]
pub struct RedelegationConfig {
    pub max_redelegations: u32,
    pub cooldown_ms: u64,
}

impl Default for RedelegationConfig {
    fn default() -> Self {
        Self {
            max_redelegations: DEFAULT_MAX_REDELEGATIONS,
            cooldown_ms: DEFAULT_REDELEGATION_COOLDOWN_MS,
        }
    }
}

/// Tracks every active delegation and, on each health tick, surfaces the
/// ones whose peer has gone degraded and are eligible to be reissued to
/// someone else (§4.17).
pub struct RedelegationMonitor {
    cfg: RedelegationConfig,
    tracked: RwLock<HashMap<TaskId, DelegationTracker>>,
}

impl RedelegationMonitor {
    pub fn new(cfg: RedelegationConfig) -> Self {
        Self {
            cfg,
            tracked: RwLock::new(HashMap::new()),
        }
    }

    pub async fn track(&self, tracker: DelegationTracker) {
        self.tracked.write().await.insert(tracker.task_id, tracker);
    }

    pub async fn untrack(&self, task_id: &TaskId) {
        self.tracked.write().await.remove(task_id);
    }

    pub async fn get(&self, task_id: &TaskId) -> Option<DelegationTracker> {
        self.tracked.read().await.get(task_id).cloned()
    }

    /// Whether `tracker` has room left under `max_redelegations` and its
    /// cooldown since the last redelegation has elapsed. The single
    /// source of truth for both the health-tick path and any other
    /// caller that wants to reissue a tracked delegation.
    pub fn is_eligible(&self, tracker: &DelegationTracker, now_ms: u64) -> bool {
        tracker.redelegation_count < self.cfg.max_redelegations
            && now_ms.saturating_sub(tracker.last_redelegated_at_ms) >= self.cfg.cooldown_ms
    }

    /// Given the current set of degraded peer ids and the current time,
    /// returns every tracked delegation that: is assigned to a degraded
    /// peer, has room left under `max_redelegations`, and whose cooldown
    /// since the last redelegation has elapsed.
    pub async fn health_tick(&self, degraded_peers: &[NodeId], now_ms: u64) -> Vec<DelegationTracker> {
        let tracked = self.tracked.read().await;
        tracked
            .values()
            .filter(|t| degraded_peers.contains(&t.peer))
            .filter(|t| self.is_eligible(t, now_ms))
            .cloned()
            .collect()
    }

    /// Records that `task_id` was reissued from its old peer to
    /// `new_peer`: excludes the old peer from future candidates for this
    /// task, bumps the redelegation count, reassigns the peer, and resets
    /// the cooldown timer.
    pub async fn record_redelegation(&self, task_id: &TaskId, new_peer: NodeId, now_ms: u64) -> Option<DelegationTracker> {
        let mut tracked = self.tracked.write().await;
        let tracker = tracked.get_mut(task_id)?;
        tracker.excluded_peers.insert(tracker.peer);
        tracker.peer = new_peer;
        tracker.redelegation_count += 1;
        tracker.last_redelegated_at_ms = now_ms;
        Some(tracker.clone())
    }
}

impl Default for RedelegationMonitor {
    fn default() -> Self {
        Self::new(RedelegationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dmesh_core::types::TaskConstraints;
    use uuid::Uuid;

    fn tracker(task_id: TaskId, peer: NodeId) -> DelegationTracker {
        DelegationTracker {
            task_id,
            peer,
            task_text: "do the thing".into(),
            session_id: Uuid::new_v4(),
            constraints: TaskConstraints {
                max_cost_usd: 1.0,
                max_duration_ms: 10_000,
                max_tokens: 1_000,
                tool_allowlist: Vec::new(),
            },
            redelegation_count: 0,
            excluded_peers: Default::default(),
            last_redelegated_at_ms: 0,
        }
    }

    #[tokio::test]
    async fn degraded_peer_with_elapsed_cooldown_is_eligible() {
        let monitor = RedelegationMonitor::default();
        let task_id = TaskId::new();
        let peer = NodeId::new();
        monitor.track(tracker(task_id, peer)).await;

        let eligible = monitor.health_tick(&[peer], DEFAULT_REDELEGATION_COOLDOWN_MS).await;
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].task_id, task_id);
    }

    #[tokio::test]
    async fn healthy_peer_is_never_surfaced() {
        let monitor = RedelegationMonitor::default();
        let task_id = TaskId::new();
        let peer = NodeId::new();
        monitor.track(tracker(task_id, peer)).await;

        let eligible = monitor.health_tick(&[NodeId::new()], 1_000_000).await;
        assert!(eligible.is_empty());
    }

    #[tokio::test]
    async fn cooldown_blocks_immediate_second_redelegation() {
        let monitor = RedelegationMonitor::default();
        let task_id = TaskId::new();
        let peer = NodeId::new();
        monitor.track(tracker(task_id, peer)).await;
        monitor.record_redelegation(&task_id, NodeId::new(), 1_000).await;

        let eligible = monitor.health_tick(&[monitor.get(&task_id).await.unwrap().peer], 1_500).await;
        assert!(eligible.is_empty());
    }

    #[tokio::test]
    async fn exhausted_redelegation_budget_excludes_task() {
        let monitor = RedelegationMonitor::default();
        let task_id = TaskId::new();
        let original_peer = NodeId::new();
        monitor.track(tracker(task_id, original_peer)).await;

        let mut now = 0u64;
        for _ in 0..DEFAULT_MAX_REDELEGATIONS {
            let current_peer = monitor.get(&task_id).await.unwrap().peer;
            let eligible = monitor.health_tick(&[current_peer], now).await;
            assert_eq!(eligible.len(), 1);
            monitor.record_redelegation(&task_id, NodeId::new(), now).await;
            now += DEFAULT_REDELEGATION_COOLDOWN_MS;
        }

        let current_peer = monitor.get(&task_id).await.unwrap().peer;
        let eligible = monitor.health_tick(&[current_peer], now).await;
        assert!(eligible.is_empty());

        let final_tracker = monitor.get(&task_id).await.unwrap();
        assert_eq!(final_tracker.excluded_peers.len() as u32, DEFAULT_MAX_REDELEGATIONS);
        assert!(final_tracker.excluded_peers.contains(&original_peer));
    }
}
