//! ─── Delegation Mesh Protocol Constants ─────────────────────────────────────
//!
//! Every tunable named in the component design has a sane default here.
//! `MeshConfig` (in `dmesh-node`) may override any of these at boot; nothing
//! in the core reads these constants directly except as `Default` impls.

// ── Membership (§4.2) ────────────────────────────────────────────────────────

pub const DEFAULT_SUSPECTED_AFTER_MS: u64 = 15_000;
pub const DEFAULT_UNREACHABLE_AFTER_MS: u64 = 60_000;
pub const DEFAULT_EVICT_AFTER_MS: u64 = 300_000;
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 10_000;

// ── Gossip (§4.3) ─────────────────────────────────────────────────────────────

pub const DEFAULT_GOSSIP_FANOUT: usize = 3;
pub const DEFAULT_GOSSIP_INTERVAL_MS: u64 = 10_000;

// ── Transport (§4.1) ─────────────────────────────────────────────────────────

pub const DEFAULT_REQUEST_DEADLINE_MS: u64 = 10_000;

// ── Router (§4.7) ─────────────────────────────────────────────────────────────

pub const DEFAULT_ROUTER_SCORE_FLOOR: f64 = 0.2;
pub const ROUTER_WEIGHT_REPUTATION: f64 = 0.6;
pub const ROUTER_WEIGHT_LATENCY: f64 = 0.3;
pub const ROUTER_WEIGHT_CAPABILITY: f64 = 0.1;

// ── Decomposer (§4.8) ─────────────────────────────────────────────────────────

pub const DEFAULT_MAX_RECURSION_DEPTH: u32 = 3;
pub const DEFAULT_MAX_PROPOSALS: usize = 3;

// ── Auction Guard (§4.9) ──────────────────────────────────────────────────────

pub const DEFAULT_MAX_BIDS_PER_NODE_PER_MINUTE: u32 = 10;
pub const DEFAULT_FRONTRUN_WINDOW_MS: u64 = 2_000;
pub const FRONTRUN_MIN_SAMPLE: usize = 3;
pub const FRONTRUN_THRESHOLD_FRACTION: f64 = 0.75;

// ── Reputation (§4.6) ─────────────────────────────────────────────────────────

/// Half-life for exponential decay of reputation counts (one week).
pub const DEFAULT_REPUTATION_HALF_LIFE_SECS: f64 = 7.0 * 24.0 * 3600.0;
pub const REPUTATION_PRIOR_ALPHA: f64 = 1.0;
pub const REPUTATION_PRIOR_BETA: f64 = 1.0;
pub const REPUTATION_TIER_LOW: f64 = 0.25;
pub const REPUTATION_TIER_MEDIUM: f64 = 0.5;
pub const REPUTATION_TIER_HIGH: f64 = 0.75;

// ── Behavioral Scorer (§4.15) ─────────────────────────────────────────────────

pub const BEHAVIOR_MAX_OBSERVATIONS: usize = 100;
pub const BEHAVIOR_WEIGHT_TRANSPARENCY: f64 = 0.25;
pub const BEHAVIOR_WEIGHT_SAFETY: f64 = 0.30;
pub const BEHAVIOR_WEIGHT_PROTOCOL: f64 = 0.25;
pub const BEHAVIOR_WEIGHT_REASONING: f64 = 0.20;
pub const BEHAVIOR_EMIT_EPSILON: f64 = 0.02;

// ── Sabotage Detector (§4.16) ─────────────────────────────────────────────────

pub const SABOTAGE_LEDGER_CAP: usize = 10_000;
pub const SABOTAGE_LEDGER_TRIM_TO: usize = 5_000;
pub const SABOTAGE_DISPROPORTIONATE_FRACTION: f64 = 0.80;
pub const SABOTAGE_DISPROPORTIONATE_MAX_CONFIDENCE: f64 = 0.9;
pub const SABOTAGE_REVIEW_BOMB_COUNT: u32 = 5;
pub const DEFAULT_SABOTAGE_BURST_WINDOW_MS: u64 = 60_000;
pub const SABOTAGE_COLLUSION_DISCOUNT_CONFIDENCE: f64 = 0.7;

// ── Re-delegation Monitor (§4.17) ─────────────────────────────────────────────

pub const DEFAULT_MAX_REDELEGATIONS: u32 = 2;
pub const DEFAULT_REDELEGATION_COOLDOWN_MS: u64 = 5_000;

// ── Liability Firebreak (§4.12) ───────────────────────────────────────────────

pub const DEFAULT_FIREBREAK_BASE_DEPTH: u32 = 4;

// ── Cognitive Friction (§4.11) ────────────────────────────────────────────────

pub const DEFAULT_FRICTION_THRESHOLD: f64 = 0.6;
pub const DEFAULT_FRICTION_BUCKET_CAPACITY: u32 = 5;
pub const DEFAULT_FRICTION_BUCKET_REFILL_PER_HOUR: u32 = 5;
pub const DEFAULT_FRICTION_DIGEST_INTERVAL_MS: u64 = 3_600_000;

// ── Consensus Verifier (§4.14) ────────────────────────────────────────────────

pub const DEFAULT_QUORUM_SIZE: usize = 3;
pub const DEFAULT_QUORUM_THRESHOLD_NUM: u64 = 2;
pub const DEFAULT_QUORUM_THRESHOLD_DEN: u64 = 3;

// ── Escrow / violations ───────────────────────────────────────────────────────

pub const DEFAULT_SLASH_FRACTION: f64 = 0.5;
pub const DEFAULT_CONSENSUS_FAILURE_SLASH_FRACTION: f64 = 0.5;
