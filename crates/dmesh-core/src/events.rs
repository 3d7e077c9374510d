use crate::types::{
    BehavioralScore, BidId, ContractId, NodeId, RfqId, TaskId, Timestamp,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Every state change a node may emit to local subscribers (§7).
/// `Display` renders the dotted event-name string used in logs and the
/// wire-level event stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum MeshEvent {
    PeerJoined {
        peer: NodeId,
        at: Timestamp,
    },
    PeerIdentityUpdated {
        peer: NodeId,
        new_version: u64,
        at: Timestamp,
    },
    PeerStateChanged {
        peer: NodeId,
        from: String,
        to: String,
        at: Timestamp,
    },
    EscrowReserved {
        contract_id: ContractId,
        node: NodeId,
        amount: f64,
        balance_before: f64,
        balance_after: f64,
    },
    EscrowReleased {
        contract_id: ContractId,
        node: NodeId,
        amount: f64,
        balance_before: f64,
        balance_after: f64,
    },
    EscrowSlashed {
        contract_id: ContractId,
        node: NodeId,
        amount: f64,
        reason: String,
        balance_before: f64,
        balance_after: f64,
    },
    ContractCreated {
        contract_id: ContractId,
        delegator: NodeId,
        delegatee: NodeId,
        task_id: TaskId,
    },
    ContractCompleted {
        contract_id: ContractId,
        at: Timestamp,
    },
    ContractViolated {
        contract_id: ContractId,
        reason: String,
        at: Timestamp,
    },
    ContractCancelled {
        contract_id: ContractId,
        at: Timestamp,
    },
    ContractRenegotiated {
        contract_id: ContractId,
        accepted: bool,
        at: Timestamp,
    },
    ReputationUpdated {
        node: NodeId,
        score: f64,
        tier: String,
    },
    BehavioralScoreUpdated {
        node: NodeId,
        score: BehavioralScore,
        composite: f64,
    },
    FrontRunningDetected {
        rfq_id: RfqId,
        suspect: NodeId,
        confidence: f64,
    },
    SabotageFlagged {
        node: NodeId,
        heuristic: String,
        confidence: f64,
    },
    RedelegationQueued {
        task_id: TaskId,
        previous_peer: NodeId,
        attempt: u32,
    },
    RedelegationIssued {
        task_id: TaskId,
        new_peer: NodeId,
        attempt: u32,
    },
    BidCommitted {
        rfq_id: RfqId,
        bid_id: BidId,
        bidder: NodeId,
    },
    BidRevealed {
        rfq_id: RfqId,
        bid_id: BidId,
        bidder: NodeId,
    },
}

impl MeshEvent {
    /// The canonical dotted event-name string, e.g. `"peer.joined"`.
    pub fn name(&self) -> &'static str {
        match self {
            MeshEvent::PeerJoined { .. } => "peer.joined",
            MeshEvent::PeerIdentityUpdated { .. } => "peer.identity_updated",
            MeshEvent::PeerStateChanged { .. } => "peer.state_changed",
            MeshEvent::EscrowReserved { .. } => "escrow.reserved",
            MeshEvent::EscrowReleased { .. } => "escrow.released",
            MeshEvent::EscrowSlashed { .. } => "escrow.slashed",
            MeshEvent::ContractCreated { .. } => "contract.created",
            MeshEvent::ContractCompleted { .. } => "contract.completed",
            MeshEvent::ContractViolated { .. } => "contract.violated",
            MeshEvent::ContractCancelled { .. } => "contract.cancelled",
            MeshEvent::ContractRenegotiated { .. } => "contract.renegotiated",
            MeshEvent::ReputationUpdated { .. } => "reputation.updated",
            MeshEvent::BehavioralScoreUpdated { .. } => "behavioral_score_updated",
            MeshEvent::FrontRunningDetected { .. } => "front_running_detected",
            MeshEvent::SabotageFlagged { .. } => "sabotage_flagged",
            MeshEvent::RedelegationQueued { .. } => "redelegation.queued",
            MeshEvent::RedelegationIssued { .. } => "redelegation.issued",
            MeshEvent::BidCommitted { .. } => "bid.committed",
            MeshEvent::BidRevealed { .. } => "bid.revealed",
        }
    }
}

impl fmt::Display for MeshEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeId;

    #[test]
    fn event_names_match_expected_strings() {
        let ev = MeshEvent::PeerJoined {
            peer: NodeId::new(),
            at: 0,
        };
        assert_eq!(ev.to_string(), "peer.joined");

        let ev = MeshEvent::ReputationUpdated {
            node: NodeId::new(),
            score: 0.5,
            tier: "medium".into(),
        };
        assert_eq!(ev.name(), "reputation.updated");
    }
}
