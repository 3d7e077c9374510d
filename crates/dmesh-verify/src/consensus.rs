use dmesh_core::constants::{DEFAULT_QUORUM_SIZE, DEFAULT_QUORUM_THRESHOLD_DEN, DEFAULT_QUORUM_THRESHOLD_NUM};
use dmesh_core::error::{MeshError, MeshResult};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConsensusConfig {
    pub quorum_size: usize,
    pub quorum_threshold_num: u64,
    pub quorum_threshold_den: u64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            quorum_size: DEFAULT_QUORUM_SIZE,
            quorum_threshold_num: DEFAULT_QUORUM_THRESHOLD_NUM,
            quorum_threshold_den: DEFAULT_QUORUM_THRESHOLD_DEN,
        }
    }
}

/// For tasks flagged critical, broadcasts a `VERIFY` request to
/// `quorum_size` independent peers and requires at least
/// `quorum_threshold` of them to agree with the delegator's own verdict
/// before the outcome is accepted (§4.14). The actual broadcast is
/// the transport's job; this component is the pure agreement rule.
pub struct ConsensusVerifier {
    cfg: ConsensusConfig,
}

impl ConsensusVerifier {
    pub fn new(cfg: ConsensusConfig) -> Self {
        Self { cfg }
    }

    /// `local_verdict` is the delegator's own pass/fail; `peer_verdicts`
    /// are the independent verifiers' pass/fail results (already
    /// collected by the transport layer). Accepts iff the fraction of
    /// peers agreeing with `local_verdict` meets the configured quorum
    /// threshold.
    pub fn decide(&self, local_verdict: bool, peer_verdicts: &[bool]) -> MeshResult<()> {
        let total = peer_verdicts.len();
        let agree = peer_verdicts.iter().filter(|&&v| v == local_verdict).count();
        let needed = self.needed_votes(total.max(self.cfg.quorum_size));

        if agree >= needed {
            Ok(())
        } else {
            Err(MeshError::ConsensusFailed { agree, total, needed })
        }
    }

    fn needed_votes(&self, total: usize) -> usize {
        let num = (total as u64) * self.cfg.quorum_threshold_num;
        // Ceiling division so e.g. 2/3 of 3 peers requires exactly 2, not 1.
        ((num + self.cfg.quorum_threshold_den - 1) / self.cfg.quorum_threshold_den) as usize
    }
}

impl Default for ConsensusVerifier {
    fn default() -> Self {
        Self::new(ConsensusConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_of_three_agreeing_meets_default_quorum() {
        let verifier = ConsensusVerifier::default();
        assert!(verifier.decide(true, &[true, true, false]).is_ok());
    }

    #[test]
    fn one_of_three_agreeing_fails_default_quorum() {
        let verifier = ConsensusVerifier::default();
        let err = verifier.decide(true, &[true, false, false]).unwrap_err();
        assert!(matches!(err, MeshError::ConsensusFailed { agree: 1, total: 3, needed: 2 }));
    }

    #[test]
    fn unanimous_disagreement_is_reported_fully() {
        let verifier = ConsensusVerifier::default();
        let err = verifier.decide(true, &[false, false, false]).unwrap_err();
        assert!(matches!(err, MeshError::ConsensusFailed { agree: 0, .. }));
    }
}
