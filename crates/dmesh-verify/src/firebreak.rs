use dmesh_core::constants::DEFAULT_FIREBREAK_BASE_DEPTH;
use dmesh_core::error::{MeshError, MeshResult};
use dmesh_core::types::{Level, Reversibility};

fn criticality_penalty(level: Level) -> u32 {
    match level {
        Level::Low => 0,
        Level::Medium => 1,
        Level::High => 2,
    }
}

fn reversibility_penalty(r: Reversibility) -> u32 {
    match r {
        Reversibility::High => 0,
        Reversibility::Low => 1,
    }
}

/// Caps how many times a delegation chain may re-delegate before a human
/// must take direct responsibility (§4.12). The cap shrinks with
/// task criticality and irreversibility — a high-criticality,
/// low-reversibility task gets almost no slack for a runaway chain of
/// delegations to dilute accountability.
pub struct LiabilityFirebreak {
    pub base_depth: u32,
}

impl Default for LiabilityFirebreak {
    fn default() -> Self {
        Self {
            base_depth: DEFAULT_FIREBREAK_BASE_DEPTH,
        }
    }
}

impl LiabilityFirebreak {
    pub fn max_depth(&self, criticality: Level, reversibility: Reversibility) -> u32 {
        self.base_depth
            .saturating_sub(criticality_penalty(criticality))
            .saturating_sub(reversibility_penalty(reversibility))
    }

    /// Reject a delegation that would push the chain past its legal
    /// depth for this task's criticality/reversibility. Must run *before*
    /// escrow is reserved (§4.12's ordering invariant) — callers are
    /// responsible for that sequencing, this is a pure check.
    pub fn check(&self, attempted_depth: u32, criticality: Level, reversibility: Reversibility) -> MeshResult<()> {
        let max = self.max_depth(criticality, reversibility);
        if attempted_depth > max {
            Err(MeshError::FirebreakExceeded { depth: attempted_depth, max })
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_criticality_low_reversibility_yields_depth_one() {
        let fb = LiabilityFirebreak::default();
        assert_eq!(fb.max_depth(Level::High, Reversibility::Low), 1);
    }

    #[test]
    fn low_stakes_task_gets_full_base_depth() {
        let fb = LiabilityFirebreak::default();
        assert_eq!(fb.max_depth(Level::Low, Reversibility::High), 4);
    }

    #[test]
    fn fourth_hop_in_a_b_c_d_chain_is_rejected_for_high_risk_task() {
        let fb = LiabilityFirebreak::default();
        // A->B is depth 1, B->C depth 2, C->D depth 3: all exceed max=1.
        assert!(fb.check(1, Level::High, Reversibility::Low).is_err());
        assert!(fb.check(0, Level::High, Reversibility::Low).is_ok());
    }
}
