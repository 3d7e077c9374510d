use crate::analyzer::TaskAnalyzer;
use dmesh_core::constants::{
    DEFAULT_ROUTER_SCORE_FLOOR, ROUTER_WEIGHT_CAPABILITY, ROUTER_WEIGHT_LATENCY,
    ROUTER_WEIGHT_REPUTATION,
};
use dmesh_core::types::{DelegationTarget, NodeId, PeerRecord, PeerState, TaskAttributes};
use std::collections::BTreeSet;

/// Where (and to whom) a sub-task should be sent (§4.7).
#[derive(Clone, Debug, PartialEq)]
pub struct RoutingDecision {
    pub target: DelegationTarget,
    pub node_id: Option<NodeId>,
}

/// Picks an AI peer or a human reviewer for a sub-task given the current
/// peer table (§4.7). Stateless: every call is a pure function of
/// its inputs, so it holds no lock of its own.
pub struct DelegateeRouter {
    pub score_floor: f64,
}

impl Default for DelegateeRouter {
    fn default() -> Self {
        Self {
            score_floor: DEFAULT_ROUTER_SCORE_FLOOR,
        }
    }
}

impl DelegateeRouter {
    /// `text` is the sub-task's raw text (checked for human-gating
    /// keywords); `attrs` is its derived attributes; `peers` is every
    /// peer this node currently knows about, in any state.
    pub fn route(&self, text: &str, attrs: &TaskAttributes, peers: &[PeerRecord]) -> RoutingDecision {
        if TaskAnalyzer::requires_human_gate(text) {
            return RoutingDecision {
                target: DelegationTarget::Human,
                node_id: None,
            };
        }

        let candidates: Vec<&PeerRecord> = peers
            .iter()
            .filter(|p| p.state == PeerState::Alive)
            .filter(|p| p.identity.has_capabilities(&attrs.required_capabilities))
            .collect();

        if candidates.is_empty() {
            return RoutingDecision {
                target: DelegationTarget::Human,
                node_id: None,
            };
        }

        let max_latency = candidates
            .iter()
            .map(|p| p.latency_ewma_ms)
            .fold(0.0_f64, f64::max)
            .max(1.0);

        let mut ranked: Vec<(&PeerRecord, f64)> = candidates
            .iter()
            .map(|p| (*p, self.score(p, &attrs.required_capabilities, max_latency)))
            .collect();

        // Highest score first; ties broken by most recent successful contact.
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap()
                .then_with(|| b.0.last_success_ms.cmp(&a.0.last_success_ms))
        });

        match ranked.first() {
            Some((peer, score)) if *score >= self.score_floor => RoutingDecision {
                target: DelegationTarget::Ai,
                node_id: Some(peer.identity.id),
            },
            _ => RoutingDecision {
                target: DelegationTarget::Human,
                node_id: None,
            },
        }
    }

    fn score(&self, peer: &PeerRecord, required: &BTreeSet<String>, max_latency_ms: f64) -> f64 {
        let normalized_latency = (peer.latency_ewma_ms / max_latency_ms).clamp(0.0, 1.0);
        let overlap = peer.identity.capability_overlap(required);
        ROUTER_WEIGHT_REPUTATION * peer.reputation
            + ROUTER_WEIGHT_LATENCY * (1.0 - normalized_latency)
            + ROUTER_WEIGHT_CAPABILITY * overlap
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dmesh_core::types::{Level, NodeIdentity, Reversibility};
    use std::collections::BTreeSet;

    fn attrs(required: &[&str]) -> TaskAttributes {
        TaskAttributes {
            complexity: Level::Medium,
            criticality: Level::Low,
            verifiability: Level::Medium,
            reversibility: Reversibility::High,
            estimated_cost_usd: 1.0,
            estimated_duration_ms: 1_000,
            estimated_tokens: 100,
            required_capabilities: required.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn peer(caps: &[&str], reputation: f64, latency_ms: f64, state: PeerState) -> PeerRecord {
        PeerRecord {
            identity: NodeIdentity {
                id: NodeId::new(),
                name: "peer".into(),
                base_url: "http://127.0.0.1:9000".into(),
                capabilities: caps.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
                public_key: None,
                credentials: Vec::new(),
                version: 1,
            },
            state,
            last_heard_ms: 0,
            last_success_ms: 0,
            latency_ewma_ms: latency_ms,
            reputation,
        }
    }

    #[test]
    fn human_gating_keyword_always_routes_to_human() {
        let router = DelegateeRouter::default();
        let decision = router.route("please approve this change", &attrs(&[]), &[]);
        assert_eq!(decision.target, DelegationTarget::Human);
    }

    #[test]
    fn no_capable_peer_falls_back_to_human() {
        let router = DelegateeRouter::default();
        let peers = vec![peer(&["read-file"], 0.9, 10.0, PeerState::Alive)];
        let decision = router.route("run shell command", &attrs(&["shell-exec"]), &peers);
        assert_eq!(decision.target, DelegationTarget::Human);
    }

    #[test]
    fn evicted_like_states_are_never_selected() {
        let router = DelegateeRouter::default();
        let peers = vec![peer(&["shell-exec"], 0.9, 10.0, PeerState::Unreachable)];
        let decision = router.route("run shell command", &attrs(&["shell-exec"]), &peers);
        assert_eq!(decision.target, DelegationTarget::Human);
    }

    #[test]
    fn best_scoring_capable_peer_is_chosen() {
        let router = DelegateeRouter::default();
        let weak = peer(&["shell-exec"], 0.3, 500.0, PeerState::Alive);
        let strong = peer(&["shell-exec"], 0.95, 10.0, PeerState::Alive);
        let strong_id = strong.identity.id;
        let decision = router.route("run shell command", &attrs(&["shell-exec"]), &[weak, strong]);
        assert_eq!(decision.target, DelegationTarget::Ai);
        assert_eq!(decision.node_id, Some(strong_id));
    }

    #[test]
    fn low_score_below_floor_falls_back_to_human() {
        let router = DelegateeRouter { score_floor: 0.9 };
        let mediocre = peer(&["shell-exec"], 0.5, 200.0, PeerState::Alive);
        let decision = router.route("run shell command", &attrs(&["shell-exec"]), &[mediocre]);
        assert_eq!(decision.target, DelegationTarget::Human);
    }
}
