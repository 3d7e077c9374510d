pub mod consensus;
pub mod firebreak;
pub mod friction;
pub mod outcome;
pub mod redelegation;

pub use consensus::{ConsensusConfig, ConsensusVerifier};
pub use firebreak::LiabilityFirebreak;
pub use friction::{CognitiveFrictionEngine, FrictionConfig, FrictionDecision, FrictionInputs};
pub use outcome::{OutcomeVector, OutcomeVerdict, OutcomeVerifier};
pub use redelegation::{RedelegationConfig, RedelegationMonitor};
