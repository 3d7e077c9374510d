use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Unix timestamp, seconds UTC.
pub type Timestamp = i64;

macro_rules! uuid_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(u: Uuid) -> Self {
                Self(u)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}:{}", $prefix, self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), &self.0.to_string()[..8])
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

uuid_id!(NodeId, "node");
uuid_id!(ContractId, "contract");
uuid_id!(TaskId, "task");
uuid_id!(RfqId, "rfq");
uuid_id!(BidId, "bid");
uuid_id!(CredentialId, "cred");

// ── Public key / signature newtypes ───────────────────────────────────────────

/// Ed25519 public key bytes, hex-encoded on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyBytes(#[serde(with = "hex_bytes_32")] pub [u8; 32]);

impl fmt::Debug for PublicKeyBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKeyBytes({}…)", &hex::encode(self.0)[..8])
    }
}

/// Ed25519 signature bytes, hex-encoded on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureBytes(#[serde(with = "hex_bytes_64")] pub [u8; 64]);

impl fmt::Debug for SignatureBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SignatureBytes({}…)", &hex::encode(self.0)[..8])
    }
}

mod hex_bytes_32 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(b: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(b))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let hex_str = String::deserialize(d)?;
        let bytes = hex::decode(&hex_str).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 32 bytes"))
    }
}

mod hex_bytes_64 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(b: &[u8; 64], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(b))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 64], D::Error> {
        let hex_str = String::deserialize(d)?;
        let bytes = hex::decode(&hex_str).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 64 bytes"))
    }
}

// ── Capability claims & credentials (§3, §4.4) ────────────────────────────────

/// A signature over `(claim_id, endorser_id)`, vouching for an issued claim.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Endorsement {
    pub endorser_id: NodeId,
    pub signature: SignatureBytes,
}

/// "Issuer I claims subject S has capability C, valid until T."
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CapabilityClaim {
    pub claim_id: Uuid,
    pub issuer: NodeId,
    pub subject: NodeId,
    pub capability: String,
    pub valid_until: Timestamp,
    pub signature: SignatureBytes,
    pub endorsements: Vec<Endorsement>,
}

/// `{credential_id, issuer, subject, capability_claims[], issued_at,
/// expires_at, signature, endorsements[]}` (§4.4).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub credential_id: CredentialId,
    pub issuer: NodeId,
    pub subject: NodeId,
    pub capability_claims: Vec<CapabilityClaim>,
    pub issued_at: Timestamp,
    pub expires_at: Timestamp,
    pub signature: SignatureBytes,
    pub endorsements: Vec<Endorsement>,
}

// ── Node identity & peer record (§3) ──────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeIdentity {
    pub id: NodeId,
    pub name: String,
    pub base_url: String,
    pub capabilities: BTreeSet<String>,
    pub public_key: Option<PublicKeyBytes>,
    pub credentials: Vec<Credential>,
    pub version: u64,
}

impl NodeIdentity {
    /// Two identities sharing an id are reconciled by taking the higher
    /// `version` (§3). Ties keep `self`.
    pub fn reconcile(self, other: NodeIdentity) -> NodeIdentity {
        if other.version > self.version {
            other
        } else {
            self
        }
    }

    pub fn has_capabilities(&self, required: &BTreeSet<String>) -> bool {
        required.is_subset(&self.capabilities)
    }

    /// Capability overlap in [0,1]: fraction of `required` present.
    pub fn capability_overlap(&self, required: &BTreeSet<String>) -> f64 {
        if required.is_empty() {
            return 1.0;
        }
        let matched = required.intersection(&self.capabilities).count();
        matched as f64 / required.len() as f64
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerState {
    Alive,
    Suspected,
    Unreachable,
    Evicted,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeerRecord {
    pub identity: NodeIdentity,
    pub state: PeerState,
    pub last_heard_ms: u64,
    pub last_success_ms: u64,
    pub latency_ewma_ms: f64,
    pub reputation: f64,
}

// ── Task attributes & sub-tasks (§3, §4.8) ────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Level {
    Low,
    Medium,
    High,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reversibility {
    Low,
    High,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskAttributes {
    pub complexity: Level,
    pub criticality: Level,
    pub verifiability: Level,
    pub reversibility: Reversibility,
    pub estimated_cost_usd: f64,
    pub estimated_duration_ms: u64,
    pub estimated_tokens: u64,
    pub required_capabilities: BTreeSet<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DelegationTarget {
    Ai,
    Human,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskConstraints {
    pub max_cost_usd: f64,
    pub max_duration_ms: u64,
    pub max_tokens: u64,
    pub tool_allowlist: Vec<String>,
}

impl TaskConstraints {
    /// Attenuate this budget evenly across `n_children` sub-tasks (§4.8).
    /// The tool allowlist is inherited verbatim.
    pub fn split(&self, n_children: usize) -> Self {
        let n = n_children.max(1) as f64;
        Self {
            max_cost_usd: self.max_cost_usd / n,
            max_duration_ms: (self.max_duration_ms as f64 / n) as u64,
            max_tokens: (self.max_tokens as f64 / n) as u64,
            tool_allowlist: self.tool_allowlist.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verifiability {
    Verifiable,
    Unverifiable,
    Partial,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubTask {
    pub id: TaskId,
    pub text: String,
    pub attributes: TaskAttributes,
    pub dependencies: BTreeSet<TaskId>,
    pub parallel_group: u32,
    pub delegation_target: DelegationTarget,
    pub constraints: TaskConstraints,
}

/// A candidate decomposition strategy, scored and ranked (§4.8).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecompositionProposal {
    pub strategy: ProposalStrategy,
    pub sub_tasks: Vec<SubTask>,
    pub score: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalStrategy {
    Recursive,
    FlatParallel,
    StrictlySequential,
}

// ── SLO & permission boundary (§3) ────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Slo {
    pub max_duration_ms: u64,
    pub max_tokens: u64,
    pub max_cost_usd: f64,
    pub min_quality_score: Option<f64>,
    pub required_checkpoints: Option<u32>,
}

/// A delta applied to an `Slo` during renegotiation. `None` leaves a field
/// unchanged; signed deltas widen (positive) or tighten (negative) a budget.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SloDelta {
    pub max_duration_ms: Option<i64>,
    pub max_tokens: Option<i64>,
    pub max_cost_usd: Option<f64>,
    pub min_quality_score: Option<f64>,
}

impl Slo {
    pub fn apply_delta(&self, delta: &SloDelta) -> Slo {
        let mut out = self.clone();
        if let Some(d) = delta.max_duration_ms {
            out.max_duration_ms = (out.max_duration_ms as i64 + d).max(0) as u64;
        }
        if let Some(d) = delta.max_tokens {
            out.max_tokens = (out.max_tokens as i64 + d).max(0) as u64;
        }
        if let Some(d) = delta.max_cost_usd {
            out.max_cost_usd = (out.max_cost_usd + d).max(0.0);
        }
        if let Some(q) = delta.min_quality_score {
            out.min_quality_score = Some(q);
        }
        out
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PermissionBoundary {
    pub tool_allowlist: Vec<String>,
    pub max_permissions: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Monitoring {
    pub checkpoint_interval_ms: Option<u64>,
}

// ── Renegotiation (§4.10) ─────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RenegotiationRequest {
    pub request_id: Uuid,
    pub requested_by: NodeId,
    pub proposed_slo_delta: SloDelta,
    pub reason: String,
    pub requested_at: Timestamp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenegotiationOutcome {
    Accepted,
    Rejected,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RenegotiationRecord {
    pub request: RenegotiationRequest,
    pub outcome: RenegotiationOutcome,
    pub decided_at: Timestamp,
}

// ── Delegation contract (§3, §4.10) ───────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractStatus {
    Active,
    Completed,
    Violated,
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DelegationContract {
    pub contract_id: ContractId,
    pub delegator: NodeId,
    pub delegatee: NodeId,
    pub task_id: TaskId,
    pub task_text: String,
    pub slo: Slo,
    pub permission_boundary: PermissionBoundary,
    pub monitoring: Monitoring,
    pub status: ContractStatus,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    pub violation_reason: Option<String>,
    pub original_slo: Option<Slo>,
    pub renegotiation_history: Vec<RenegotiationRecord>,
    pub pending_renegotiation: Option<RenegotiationRequest>,
    /// Depth of this delegation within its chain (§4.12); 0 for a
    /// top-level delegation issued directly by a human-facing originator.
    pub delegation_depth: u32,
}

// ── Auction / bidding (§3, §4.9) ──────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rfq {
    pub rfq_id: RfqId,
    pub task_attributes: TaskAttributes,
    pub slo: Slo,
    pub deadline: Timestamp,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SealedBid {
    pub bid_id: BidId,
    pub rfq_id: RfqId,
    pub bidder: NodeId,
    pub commitment_hash: [u8; 32],
    pub timestamp: Timestamp,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RevealedBid {
    pub bid_id: BidId,
    pub rfq_id: RfqId,
    pub bidder: NodeId,
    pub estimated_cost_usd: f64,
    pub estimated_duration_ms: u64,
    pub estimated_tokens: u64,
    pub capabilities_offered: Vec<String>,
    pub expiry: Timestamp,
    pub round: u32,
    pub nonce: [u8; 16],
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Bid {
    Sealed(SealedBid),
    Revealed(RevealedBid),
}

// ── Escrow (§3, §4.5) ──────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EscrowAccount {
    pub total_balance: f64,
    pub reserved_balance: f64,
}

impl EscrowAccount {
    pub fn free_balance(&self) -> f64 {
        self.total_balance - self.reserved_balance
    }
}

// ── Reputation (§3, §4.6) ─────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReputationRecord {
    pub successes: f64,
    pub failures: f64,
    pub last_update_ms: u64,
    pub decayed_score: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReputationTier {
    Untrusted,
    Low,
    Medium,
    High,
}

// ── Behavioral observations (§3, §4.15) ───────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BehavioralObservationType {
    TransparencyHigh,
    TransparencyLow,
    SafetyCompliant,
    SafetyViolation,
    ProtocolFollowed,
    ProtocolViolated,
    ReasoningClear,
    ReasoningOpaque,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BehavioralObservation {
    pub obs_type: BehavioralObservationType,
    pub timestamp: Timestamp,
    pub evidence: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BehavioralScore {
    pub transparency: f64,
    pub safety: f64,
    pub protocol_compliance: f64,
    pub reasoning_clarity: f64,
}

impl BehavioralScore {
    pub fn composite(&self) -> f64 {
        use crate::constants::*;
        self.transparency * BEHAVIOR_WEIGHT_TRANSPARENCY
            + self.safety * BEHAVIOR_WEIGHT_SAFETY
            + self.protocol_compliance * BEHAVIOR_WEIGHT_PROTOCOL
            + self.reasoning_clarity * BEHAVIOR_WEIGHT_REASONING
    }
}

impl Default for ReputationTier {
    fn default() -> Self {
        ReputationTier::Untrusted
    }
}

// ── Task request / result wire types (§6) ─────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub task_id: TaskId,
    pub originator_node_id: NodeId,
    pub task_text: String,
    pub session_id: Uuid,
    pub constraints: Option<TaskConstraints>,
    pub contract: Option<DelegationContract>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskResultStatus {
    Completed,
    Failed,
    Aborted,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub key: String,
    pub value: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub peer_node_id: NodeId,
    pub peer_session_id: Uuid,
    pub status: TaskResultStatus,
    pub findings: Vec<Finding>,
    pub tokens_used: u64,
    pub cost_usd: f64,
    pub duration_ms: u64,
}

impl TaskResult {
    /// Self-reported quality score in findings (key == "quality"), or
    /// `None` if the result carries no quality dimension (§4.13).
    pub fn quality_score(&self) -> Option<f64> {
        self.findings
            .iter()
            .find(|f| f.key == "quality")
            .map(|f| f.value)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckpointStatus {
    pub progress: f64,
    pub estimated_remaining_ms: u64,
    pub last_activity: Timestamp,
}

// ── Re-delegation tracking (§4.17) ────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DelegationTracker {
    pub task_id: TaskId,
    pub peer: NodeId,
    pub task_text: String,
    pub session_id: Uuid,
    pub constraints: TaskConstraints,
    pub redelegation_count: u32,
    pub excluded_peers: BTreeSet<NodeId>,
    pub last_redelegated_at_ms: u64,
}
