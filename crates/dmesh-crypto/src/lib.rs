pub mod commitment;
pub mod keypair;

pub use commitment::{commit_hash, verify_commitment};
pub use keypair::{node_id_from_pubkey, verify, KeyPair};
