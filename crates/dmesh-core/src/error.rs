use thiserror::Error;

/// Machine-readable reason codes surfaced in events and `reason` fields
/// across the mesh (§7).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MeshError {
    // ── Membership / credentials ─────────────────────────────────────────────
    #[error("peer lacks required capability: {0}")]
    CapabilityMissing(String),

    #[error("credential invalid: {0}")]
    CredentialInvalid(String),

    #[error("unknown peer: {0}")]
    UnknownPeer(String),

    // ── Delegation gating ─────────────────────────────────────────────────────
    #[error("delegation depth {depth} exceeds maximum {max} for this task's criticality/reversibility")]
    FirebreakExceeded { depth: u32, max: u32 },

    #[error("insufficient escrow funds: need {need}, have {have} free")]
    InsufficientFunds { need: f64, have: f64 },

    #[error("SLO violated: {dimension} value {value} failed floor {floor}")]
    SloViolated {
        dimension: String,
        value: f64,
        floor: f64,
    },

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("commitment mismatch: revealed bid does not match committed hash")]
    CommitmentMismatch,

    #[error("deadline exceeded after {0}ms")]
    DeadlineExceeded(u64),

    #[error("consensus verifier quorum disagreed: {agree}/{total} agreed, needed {needed}")]
    ConsensusFailed {
        agree: usize,
        total: usize,
        needed: usize,
    },

    #[error("contract cancelled")]
    Cancelled,

    // ── Contract store ────────────────────────────────────────────────────────
    #[error("unknown contract: {0}")]
    UnknownContract(String),

    #[error("contract {0} is not active")]
    ContractNotActive(String),

    #[error("a renegotiation request is already pending for contract {0}")]
    RenegotiationPending(String),

    #[error("no pending renegotiation for contract {0}")]
    NoPendingRenegotiation(String),

    // ── Auction ────────────────────────────────────────────────────────────────
    #[error("bid already committed")]
    BidAlreadyCommitted,

    #[error("bid already revealed")]
    BidAlreadyRevealed,

    #[error("unknown bid: {0}")]
    UnknownBid(String),

    // ── Escrow ─────────────────────────────────────────────────────────────────
    #[error("no escrow reservation for contract {0}")]
    NoReservation(String),

    // ── Serialization / storage ──────────────────────────────────────────────
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),

    // ── Transport ──────────────────────────────────────────────────────────────
    #[error("transport error: {0}")]
    Transport(String),

    #[error("unauthorized: missing or invalid bearer token")]
    Unauthorized,

    // ── General ────────────────────────────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

pub type MeshResult<T> = Result<T, MeshError>;
