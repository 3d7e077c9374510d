use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use dmesh_auction::AuctionConfig;
use dmesh_core::constants::*;
use dmesh_gossip::GossipConfig;
use dmesh_membership::MembershipConfig;
use dmesh_verify::{ConsensusConfig, FrictionConfig, RedelegationConfig};
use serde::{Deserialize, Serialize};

/// Every tunable the mesh names, collected into one flat CLI/config
/// surface. `dmesh-node::main` is the only place that parses this; every
/// other crate takes the already-built component config it needs.
#[derive(Parser, Clone, Debug, Serialize, Deserialize)]
#[command(name = "dmesh-node", version, about = "Intelligent Delegation Mesh node")]
pub struct MeshConfig {
    /// Human-readable name for this node's identity.
    #[arg(long, default_value = "mesh-node")]
    pub node_name: String,

    /// Externally reachable base URL peers should use to reach this node.
    #[arg(long, default_value = "http://127.0.0.1:8900")]
    pub base_url: String,

    /// Address this node's HTTP transport binds to.
    #[arg(long, default_value = "0.0.0.0:8900")]
    pub bind_addr: SocketAddr,

    /// Bearer token every peer must present (§6).
    #[arg(long, env = "MESH_SHARED_SECRET", default_value = "dev-shared-secret")]
    pub shared_secret: String,

    /// Directory holding `contracts.jsonl` and this node's signing key seed.
    #[arg(long, default_value = "~/.dmesh/data")]
    pub data_dir: PathBuf,

    /// Capabilities this node advertises (comma-separated).
    #[arg(long, value_delimiter = ',', default_value = "")]
    pub capabilities: Vec<String>,

    /// Peer base URLs to join at startup (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub bootstrap_peers: Vec<String>,

    /// Starting escrow balance deposited into this node's own account at
    /// boot, for local development. Production deployments fund accounts
    /// out of band.
    #[arg(long, default_value_t = 100.0)]
    pub initial_escrow_balance: f64,

    // ── Membership (§4.2) ─────────────────────────────────────────────────
    #[arg(long, default_value_t = DEFAULT_SUSPECTED_AFTER_MS)]
    pub suspected_after_ms: u64,
    #[arg(long, default_value_t = DEFAULT_UNREACHABLE_AFTER_MS)]
    pub unreachable_after_ms: u64,
    #[arg(long, default_value_t = DEFAULT_EVICT_AFTER_MS)]
    pub evict_after_ms: u64,
    #[arg(long, default_value_t = DEFAULT_SWEEP_INTERVAL_MS)]
    pub sweep_interval_ms: u64,
    #[arg(long, default_value_t = DEFAULT_HEARTBEAT_INTERVAL_MS)]
    pub heartbeat_interval_ms: u64,

    // ── Gossip (§4.3) ──────────────────────────────────────────────────────
    #[arg(long, default_value_t = DEFAULT_GOSSIP_FANOUT)]
    pub gossip_fanout: usize,
    #[arg(long, default_value_t = DEFAULT_GOSSIP_INTERVAL_MS)]
    pub gossip_interval_ms: u64,

    // ── Transport (§4.1) ───────────────────────────────────────────────────
    #[arg(long, default_value_t = DEFAULT_REQUEST_DEADLINE_MS)]
    pub request_deadline_ms: u64,

    // ── Router (§4.7) ──────────────────────────────────────────────────────
    #[arg(long, default_value_t = DEFAULT_ROUTER_SCORE_FLOOR)]
    pub router_score_floor: f64,

    // ── Decomposer (§4.8) ──────────────────────────────────────────────────
    #[arg(long, default_value_t = DEFAULT_MAX_RECURSION_DEPTH)]
    pub max_recursion_depth: u32,
    #[arg(long, default_value_t = DEFAULT_MAX_PROPOSALS)]
    pub max_proposals: usize,

    // ── Auction Guard (§4.9) ───────────────────────────────────────────────
    #[arg(long, default_value_t = DEFAULT_MAX_BIDS_PER_NODE_PER_MINUTE)]
    pub max_bids_per_node_per_minute: u32,
    #[arg(long, default_value_t = DEFAULT_FRONTRUN_WINDOW_MS)]
    pub frontrun_window_ms: u64,

    // ── Reputation (§4.6) ──────────────────────────────────────────────────
    #[arg(long, default_value_t = DEFAULT_REPUTATION_HALF_LIFE_SECS)]
    pub reputation_half_life_secs: f64,

    // ── Sabotage Detector (§4.16) ──────────────────────────────────────────
    #[arg(long, default_value_t = DEFAULT_SABOTAGE_BURST_WINDOW_MS)]
    pub sabotage_burst_window_ms: u64,

    // ── Re-delegation Monitor (§4.17) ──────────────────────────────────────
    #[arg(long, default_value_t = DEFAULT_MAX_REDELEGATIONS)]
    pub max_redelegations: u32,
    #[arg(long, default_value_t = DEFAULT_REDELEGATION_COOLDOWN_MS)]
    pub redelegation_cooldown_ms: u64,

    // ── Liability Firebreak (§4.12) ────────────────────────────────────────
    #[arg(long, default_value_t = DEFAULT_FIREBREAK_BASE_DEPTH)]
    pub firebreak_base_depth: u32,

    // ── Cognitive Friction (§4.11) ─────────────────────────────────────────
    #[arg(long, default_value_t = DEFAULT_FRICTION_THRESHOLD)]
    pub friction_threshold: f64,
    #[arg(long, default_value_t = DEFAULT_FRICTION_BUCKET_CAPACITY)]
    pub friction_bucket_capacity: u32,
    #[arg(long, default_value_t = DEFAULT_FRICTION_BUCKET_REFILL_PER_HOUR)]
    pub friction_bucket_refill_per_hour: u32,
    #[arg(long, default_value_t = DEFAULT_FRICTION_DIGEST_INTERVAL_MS)]
    pub friction_digest_interval_ms: u64,

    // ── Consensus Verifier (§4.14) ─────────────────────────────────────────
    #[arg(long, default_value_t = DEFAULT_QUORUM_SIZE)]
    pub quorum_size: usize,
    #[arg(long, default_value_t = DEFAULT_QUORUM_THRESHOLD_NUM)]
    pub quorum_threshold_num: u64,
    #[arg(long, default_value_t = DEFAULT_QUORUM_THRESHOLD_DEN)]
    pub quorum_threshold_den: u64,

    // ── Escrow / violations ────────────────────────────────────────────────
    #[arg(long, default_value_t = DEFAULT_SLASH_FRACTION)]
    pub slash_fraction: f64,
    #[arg(long, default_value_t = DEFAULT_CONSENSUS_FAILURE_SLASH_FRACTION)]
    pub consensus_failure_slash_fraction: f64,
    #[arg(long, default_value_t = 2)]
    pub min_endorsements: usize,
}

impl MeshConfig {
    pub fn membership_config(&self) -> MembershipConfig {
        MembershipConfig {
            suspected_after_ms: self.suspected_after_ms,
            unreachable_after_ms: self.unreachable_after_ms,
            evict_after_ms: self.evict_after_ms,
            sweep_interval_ms: self.sweep_interval_ms,
            heartbeat_interval_ms: self.heartbeat_interval_ms,
        }
    }

    pub fn gossip_config(&self) -> GossipConfig {
        GossipConfig {
            fanout: self.gossip_fanout,
            interval_ms: self.gossip_interval_ms,
            ..GossipConfig::default()
        }
    }

    pub fn auction_config(&self) -> AuctionConfig {
        AuctionConfig {
            max_bids_per_node_per_minute: self.max_bids_per_node_per_minute,
            frontrun_window_ms: self.frontrun_window_ms,
        }
    }

    pub fn consensus_config(&self) -> ConsensusConfig {
        ConsensusConfig {
            quorum_size: self.quorum_size,
            quorum_threshold_num: self.quorum_threshold_num,
            quorum_threshold_den: self.quorum_threshold_den,
        }
    }

    pub fn friction_config(&self) -> FrictionConfig {
        FrictionConfig {
            threshold: self.friction_threshold,
            bucket_capacity: self.friction_bucket_capacity,
            refill_per_hour: self.friction_bucket_refill_per_hour,
            digest_interval_ms: self.friction_digest_interval_ms,
        }
    }

    pub fn redelegation_config(&self) -> RedelegationConfig {
        RedelegationConfig {
            max_redelegations: self.max_redelegations,
            cooldown_ms: self.redelegation_cooldown_ms,
        }
    }

    pub fn contracts_path(&self) -> PathBuf {
        self.data_dir.join("contracts.jsonl")
    }

    pub fn key_seed_path(&self) -> PathBuf {
        self.data_dir.join("node_key.seed")
    }
}
