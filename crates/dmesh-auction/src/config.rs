use dmesh_core::constants::{DEFAULT_FRONTRUN_WINDOW_MS, DEFAULT_MAX_BIDS_PER_NODE_PER_MINUTE};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuctionConfig {
    pub max_bids_per_node_per_minute: u32,
    pub frontrun_window_ms: u64,
}

impl Default for AuctionConfig {
    fn default() -> Self {
        Self {
            max_bids_per_node_per_minute: DEFAULT_MAX_BIDS_PER_NODE_PER_MINUTE,
            frontrun_window_ms: DEFAULT_FRONTRUN_WINDOW_MS,
        }
    }
}
