use dmesh_core::constants::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MembershipConfig {
    pub suspected_after_ms: u64,
    pub unreachable_after_ms: u64,
    pub evict_after_ms: u64,
    pub sweep_interval_ms: u64,
    pub heartbeat_interval_ms: u64,
}

impl Default for MembershipConfig {
    fn default() -> Self {
        Self {
            suspected_after_ms: DEFAULT_SUSPECTED_AFTER_MS,
            unreachable_after_ms: DEFAULT_UNREACHABLE_AFTER_MS,
            evict_after_ms: DEFAULT_EVICT_AFTER_MS,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
        }
    }
}
