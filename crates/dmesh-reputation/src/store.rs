use dmesh_core::constants::*;
use dmesh_core::events::MeshEvent;
use dmesh_core::types::{NodeId, ReputationRecord, ReputationTier};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Bayesian success/failure scoring with exponential time decay, so a
/// node's reputation reflects recent behavior more than ancient history
/// (§4.6). Each observation decays prior evidence by
/// `0.5 ^ (elapsed / half_life)` before folding in the new outcome.
pub struct ReputationStore {
    half_life_secs: f64,
    records: RwLock<HashMap<NodeId, ReputationRecord>>,
}

impl ReputationStore {
    pub fn new(half_life_secs: f64) -> Self {
        Self {
            half_life_secs,
            records: RwLock::new(HashMap::new()),
        }
    }

    pub async fn score(&self, node: NodeId) -> f64 {
        self.records
            .read()
            .await
            .get(&node)
            .map(|r| r.decayed_score)
            .unwrap_or_else(|| bayesian_score(0.0, 0.0))
    }

    pub fn tier_of(score: f64) -> ReputationTier {
        if score < REPUTATION_TIER_LOW {
            ReputationTier::Untrusted
        } else if score < REPUTATION_TIER_MEDIUM {
            ReputationTier::Low
        } else if score < REPUTATION_TIER_HIGH {
            ReputationTier::Medium
        } else {
            ReputationTier::High
        }
    }

    pub async fn record_outcome(&self, node: NodeId, success: bool, now_ms: u64) -> MeshEvent {
        let mut records = self.records.write().await;
        let record = records.entry(node).or_insert(ReputationRecord {
            successes: 0.0,
            failures: 0.0,
            last_update_ms: now_ms,
            decayed_score: bayesian_score(0.0, 0.0),
        });

        let elapsed_secs = now_ms.saturating_sub(record.last_update_ms) as f64 / 1000.0;
        let factor = 0.5f64.powf(elapsed_secs / self.half_life_secs);
        record.successes *= factor;
        record.failures *= factor;

        if success {
            record.successes += 1.0;
        } else {
            record.failures += 1.0;
        }
        record.last_update_ms = now_ms;
        record.decayed_score = bayesian_score(record.successes, record.failures);

        let tier = Self::tier_of(record.decayed_score);
        MeshEvent::ReputationUpdated {
            node,
            score: record.decayed_score,
            tier: format!("{:?}", tier).to_lowercase(),
        }
    }
}

fn bayesian_score(successes: f64, failures: f64) -> f64 {
    (successes + REPUTATION_PRIOR_ALPHA) / (successes + failures + REPUTATION_PRIOR_ALPHA + REPUTATION_PRIOR_BETA)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fresh_node_starts_at_prior_midpoint() {
        let store = ReputationStore::new(DEFAULT_REPUTATION_HALF_LIFE_SECS);
        let score = store.score(NodeId::new()).await;
        assert!((score - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn repeated_success_raises_score_towards_high_tier() {
        let store = ReputationStore::new(DEFAULT_REPUTATION_HALF_LIFE_SECS);
        let node = NodeId::new();
        let mut last = 0.5;
        for i in 0..20 {
            let ev = store.record_outcome(node, true, i * 1_000).await;
            if let MeshEvent::ReputationUpdated { score, .. } = ev {
                assert!(score >= last);
                last = score;
            }
        }
        assert!(last > REPUTATION_TIER_HIGH);
    }

    #[tokio::test]
    async fn old_history_decays_so_recent_failures_dominate() {
        let store = ReputationStore::new(1.0); // 1 second half-life for fast decay in test
        let node = NodeId::new();
        for i in 0..10 {
            store.record_outcome(node, true, i * 100).await;
        }
        let high_score = store.score(node).await;

        // Jump far ahead in time; old successes should have decayed away.
        let ev = store.record_outcome(node, false, 1_000 * 1_000).await;
        let MeshEvent::ReputationUpdated { score: after, .. } = ev else {
            panic!("wrong event")
        };
        assert!(after < high_score);
    }
}
