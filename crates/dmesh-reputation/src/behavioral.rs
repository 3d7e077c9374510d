use dmesh_core::constants::BEHAVIOR_MAX_OBSERVATIONS;
use dmesh_core::events::MeshEvent;
use dmesh_core::types::{BehavioralObservation, BehavioralObservationType as Obs, BehavioralScore, NodeId};
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

/// Rolling four-axis behavioral scoring derived from qualitative
/// observations a delegator logs about a delegatee's conduct during task
/// execution (§4.15): transparency, safety, protocol compliance, and
/// reasoning clarity. Each axis is the rolling mean of its observations
/// mapped to 1.0 (positive) or 0.0 (negative).
pub struct BehavioralScorer {
    observations: RwLock<HashMap<NodeId, VecDeque<BehavioralObservation>>>,
    last_emitted_composite: RwLock<HashMap<NodeId, f64>>,
}

impl BehavioralScorer {
    pub fn new() -> Self {
        Self {
            observations: RwLock::new(HashMap::new()),
            last_emitted_composite: RwLock::new(HashMap::new()),
        }
    }

    /// Record an observation and return an event only if the composite
    /// score moved by more than the emit threshold since last reported,
    /// to avoid flooding subscribers with noise.
    pub async fn observe(&self, node: NodeId, obs: BehavioralObservation) -> Option<MeshEvent> {
        let mut all = self.observations.write().await;
        let deque = all.entry(node).or_insert_with(VecDeque::new);
        deque.push_back(obs);
        if deque.len() > BEHAVIOR_MAX_OBSERVATIONS {
            deque.pop_front();
        }
        let score = Self::compute(deque);
        let composite = score.composite();
        drop(all);

        let mut last = self.last_emitted_composite.write().await;
        let should_emit = match last.get(&node) {
            None => true,
            Some(prev) => (composite - prev).abs() > dmesh_core::constants::BEHAVIOR_EMIT_EPSILON,
        };
        if should_emit {
            last.insert(node, composite);
            Some(MeshEvent::BehavioralScoreUpdated { node, score, composite })
        } else {
            None
        }
    }

    pub async fn current_score(&self, node: NodeId) -> BehavioralScore {
        let all = self.observations.read().await;
        match all.get(&node) {
            Some(deque) => Self::compute(deque),
            None => BehavioralScore::default(),
        }
    }

    fn compute(deque: &VecDeque<BehavioralObservation>) -> BehavioralScore {
        let axis_mean = |positive: Obs, negative: Obs| -> f64 {
            let relevant: Vec<&BehavioralObservation> = deque
                .iter()
                .filter(|o| o.obs_type == positive || o.obs_type == negative)
                .collect();
            if relevant.is_empty() {
                return 0.5;
            }
            let sum: f64 = relevant
                .iter()
                .map(|o| if o.obs_type == positive { 1.0 } else { 0.0 })
                .sum();
            sum / relevant.len() as f64
        };

        BehavioralScore {
            transparency: axis_mean(Obs::TransparencyHigh, Obs::TransparencyLow),
            safety: axis_mean(Obs::SafetyCompliant, Obs::SafetyViolation),
            protocol_compliance: axis_mean(Obs::ProtocolFollowed, Obs::ProtocolViolated),
            reasoning_clarity: axis_mean(Obs::ReasoningClear, Obs::ReasoningOpaque),
        }
    }
}

impl Default for BehavioralScorer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(t: Obs) -> BehavioralObservation {
        BehavioralObservation {
            obs_type: t,
            timestamp: 0,
            evidence: None,
        }
    }

    #[tokio::test]
    async fn first_observation_always_emits() {
        let scorer = BehavioralScorer::new();
        let node = NodeId::new();
        let ev = scorer.observe(node, obs(Obs::TransparencyHigh)).await;
        assert!(ev.is_some());
    }

    #[tokio::test]
    async fn tiny_delta_does_not_emit_again() {
        let scorer = BehavioralScorer::new();
        let node = NodeId::new();
        scorer.observe(node, obs(Obs::SafetyCompliant)).await;
        // A second identical-direction observation barely moves the mean;
        // still within epsilon of the last emission for a small sample.
        let ev = scorer.observe(node, obs(Obs::SafetyCompliant)).await;
        assert!(ev.is_none());
    }

    #[tokio::test]
    async fn safety_violation_drags_score_down() {
        let scorer = BehavioralScorer::new();
        let node = NodeId::new();
        for _ in 0..5 {
            scorer.observe(node, obs(Obs::SafetyCompliant)).await;
        }
        let before = scorer.current_score(node).await.safety;
        scorer.observe(node, obs(Obs::SafetyViolation)).await;
        let after = scorer.current_score(node).await.safety;
        assert!(after < before);
    }
}
