use dmesh_core::constants::*;
use dmesh_core::types::{Level, Reversibility};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FrictionConfig {
    pub threshold: f64,
    pub bucket_capacity: u32,
    pub refill_per_hour: u32,
    pub digest_interval_ms: u64,
}

impl Default for FrictionConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_FRICTION_THRESHOLD,
            bucket_capacity: DEFAULT_FRICTION_BUCKET_CAPACITY,
            refill_per_hour: DEFAULT_FRICTION_BUCKET_REFILL_PER_HOUR,
            digest_interval_ms: DEFAULT_FRICTION_DIGEST_INTERVAL_MS,
        }
    }
}

/// Inputs that drive the friction score for one proposed delegation
/// (§4.11).
#[derive(Clone, Copy, Debug)]
pub struct FrictionInputs {
    pub criticality: Level,
    pub reversibility: Reversibility,
    /// Count of sabotage heuristics previously tripped against the
    /// candidate delegatee.
    pub sabotage_flags_against_candidate: u32,
    /// Fraction in `[0,1]` of the requester's recent approvals that were
    /// rubber-stamped with no real scrutiny — a high density means the
    /// human reviewer is primed to approve, so friction should rise to
    /// counteract it.
    pub requester_approval_density: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrictionDecision {
    /// Below threshold: proceed automatically.
    Proceed,
    /// Above threshold and a confirmation slot is available: interrupt
    /// the human now.
    RequireConfirmation,
    /// Above threshold but the hourly confirmation budget is spent:
    /// queue into the periodic digest instead of interrupting.
    Digest,
}

struct TokenBucket {
    tokens: f64,
    capacity: f64,
    refill_per_ms: f64,
    last_refill_ms: u64,
}

impl TokenBucket {
    fn new(capacity: u32, refill_per_hour: u32, now_ms: u64) -> Self {
        Self {
            tokens: capacity as f64,
            capacity: capacity as f64,
            refill_per_ms: refill_per_hour as f64 / 3_600_000.0,
            last_refill_ms: now_ms,
        }
    }

    fn try_consume(&mut self, now_ms: u64) -> bool {
        let elapsed = now_ms.saturating_sub(self.last_refill_ms) as f64;
        self.tokens = (self.tokens + elapsed * self.refill_per_ms).min(self.capacity);
        self.last_refill_ms = now_ms;
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Gates risky delegations on human confirmation while combating
/// alarm-fatigue-induced rubber-stamping with a token-bucket throttle:
/// once the hourly confirmation budget is spent, lower-risk prompts are
/// coalesced into a digest rather than interrupting immediately (spec
/// §4.11).
pub struct CognitiveFrictionEngine {
    cfg: FrictionConfig,
    bucket: Mutex<Option<TokenBucket>>,
    digest: Mutex<Vec<(FrictionInputs, f64)>>,
}

impl CognitiveFrictionEngine {
    pub fn new(cfg: FrictionConfig) -> Self {
        Self {
            cfg,
            bucket: Mutex::new(None),
            digest: Mutex::new(Vec::new()),
        }
    }

    pub fn score(inputs: &FrictionInputs) -> f64 {
        let criticality = match inputs.criticality {
            Level::Low => 0.0,
            Level::Medium => 0.5,
            Level::High => 1.0,
        };
        let reversibility = match inputs.reversibility {
            Reversibility::High => 0.0,
            Reversibility::Low => 1.0,
        };
        let sabotage = (inputs.sabotage_flags_against_candidate as f64 / 5.0).min(1.0);
        let approval_density = inputs.requester_approval_density.clamp(0.0, 1.0);

        (0.35 * criticality + 0.25 * reversibility + 0.25 * sabotage + 0.15 * approval_density)
            .clamp(0.0, 1.0)
    }

    /// Decide how to gate this delegation given the current time. Below
    /// threshold never touches the token bucket. At or above threshold,
    /// consumes a confirmation token if one is available; otherwise the
    /// delegation is coalesced into the next digest.
    pub async fn decide(&self, inputs: &FrictionInputs, now_ms: u64) -> FrictionDecision {
        let score = Self::score(inputs);
        if score < self.cfg.threshold {
            return FrictionDecision::Proceed;
        }

        let mut bucket_guard = self.bucket.lock().await;
        let bucket = bucket_guard.get_or_insert_with(|| {
            TokenBucket::new(self.cfg.bucket_capacity, self.cfg.refill_per_hour, now_ms)
        });
        if bucket.try_consume(now_ms) {
            FrictionDecision::RequireConfirmation
        } else {
            drop(bucket_guard);
            self.digest.lock().await.push((*inputs, score));
            FrictionDecision::Digest
        }
    }

    /// Drain and return everything queued since the last digest flush,
    /// ordered highest-friction first — called by the digest timer.
    pub async fn drain_digest(&self) -> Vec<(FrictionInputs, f64)> {
        let mut digest = self.digest.lock().await;
        let mut drained = std::mem::take(&mut *digest);
        drained.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
        drained
    }
}

impl Default for CognitiveFrictionEngine {
    fn default() -> Self {
        Self::new(FrictionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn low_risk() -> FrictionInputs {
        FrictionInputs {
            criticality: Level::Low,
            reversibility: Reversibility::High,
            sabotage_flags_against_candidate: 0,
            requester_approval_density: 0.0,
        }
    }

    fn high_risk() -> FrictionInputs {
        FrictionInputs {
            criticality: Level::High,
            reversibility: Reversibility::Low,
            sabotage_flags_against_candidate: 5,
            requester_approval_density: 1.0,
        }
    }

    #[tokio::test]
    async fn low_risk_delegation_proceeds_without_touching_bucket() {
        let engine = CognitiveFrictionEngine::default();
        let decision = engine.decide(&low_risk(), 0).await;
        assert_eq!(decision, FrictionDecision::Proceed);
    }

    #[tokio::test]
    async fn high_risk_delegation_requires_confirmation_until_bucket_empties() {
        let engine = CognitiveFrictionEngine::new(FrictionConfig {
            bucket_capacity: 2,
            refill_per_hour: 0,
            ..FrictionConfig::default()
        });
        let inputs = high_risk();
        assert_eq!(engine.decide(&inputs, 0).await, FrictionDecision::RequireConfirmation);
        assert_eq!(engine.decide(&inputs, 1).await, FrictionDecision::RequireConfirmation);
        assert_eq!(engine.decide(&inputs, 2).await, FrictionDecision::Digest);
    }

    #[tokio::test]
    async fn digest_collects_and_drains_overflow_prompts() {
        let engine = CognitiveFrictionEngine::new(FrictionConfig {
            bucket_capacity: 0,
            refill_per_hour: 0,
            ..FrictionConfig::default()
        });
        let inputs = high_risk();
        engine.decide(&inputs, 0).await;
        engine.decide(&inputs, 0).await;
        let drained = engine.drain_digest().await;
        assert_eq!(drained.len(), 2);
        assert!(engine.drain_digest().await.is_empty());
    }
}
