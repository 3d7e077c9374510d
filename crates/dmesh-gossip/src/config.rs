use dmesh_core::constants::{DEFAULT_GOSSIP_FANOUT, DEFAULT_GOSSIP_INTERVAL_MS};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GossipConfig {
    pub fanout: usize,
    pub interval_ms: u64,
    /// Upper bound on the self-message dedup cache before the oldest
    /// entries are evicted.
    pub seen_cache_cap: usize,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            fanout: DEFAULT_GOSSIP_FANOUT,
            interval_ms: DEFAULT_GOSSIP_INTERVAL_MS,
            seen_cache_cap: 4_096,
        }
    }
}
