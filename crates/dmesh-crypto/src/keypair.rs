use dmesh_core::types::{NodeId, PublicKeyBytes, SignatureBytes};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;

/// A node's long-lived identity key. The node id is derived from the
/// public key so peers can verify `id` <-> `public_key` binding without a
/// separate certificate authority.
pub struct KeyPair {
    pub node_id: NodeId,
    pub public_key: PublicKeyBytes,
    signing_key: SigningKey,
}

impl KeyPair {
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let public_key = PublicKeyBytes(signing_key.verifying_key().to_bytes());
        let node_id = node_id_from_pubkey(&public_key);
        Self {
            node_id,
            public_key,
            signing_key,
        }
    }

    pub fn from_seed(seed: [u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(&seed);
        let public_key = PublicKeyBytes(signing_key.verifying_key().to_bytes());
        let node_id = node_id_from_pubkey(&public_key);
        Self {
            node_id,
            public_key,
            signing_key,
        }
    }

    pub fn sign(&self, message: &[u8]) -> SignatureBytes {
        SignatureBytes(self.signing_key.sign(message).to_bytes())
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyPair {{ node_id: {:?} }}", self.node_id)
    }
}

/// Derive a stable `NodeId` (a UUID) from a public key's blake3 digest.
/// Deterministic for a given key, so the same node restarting with the
/// same key re-joins under the same identity.
pub fn node_id_from_pubkey(pk: &PublicKeyBytes) -> NodeId {
    let digest = blake3::hash(&pk.0);
    let bytes = digest.as_bytes();
    let mut uuid_bytes = [0u8; 16];
    uuid_bytes.copy_from_slice(&bytes[..16]);
    NodeId::from_uuid(uuid::Uuid::from_bytes(uuid_bytes))
}

pub fn verify(public_key: &PublicKeyBytes, message: &[u8], signature: &SignatureBytes) -> bool {
    let Ok(vk) = VerifyingKey::from_bytes(&public_key.0) else {
        return false;
    };
    let sig = Signature::from_bytes(&signature.0);
    vk.verify(message, &sig).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_roundtrip() {
        let kp = KeyPair::generate();
        let msg = b"delegate this task";
        let sig = kp.sign(msg);
        assert!(verify(&kp.public_key, msg, &sig));
    }

    #[test]
    fn tampered_message_fails_verification() {
        let kp = KeyPair::generate();
        let sig = kp.sign(b"original");
        assert!(!verify(&kp.public_key, b"tampered", &sig));
    }

    #[test]
    fn node_id_is_deterministic_for_same_key() {
        let seed = [7u8; 32];
        let a = KeyPair::from_seed(seed);
        let b = KeyPair::from_seed(seed);
        assert_eq!(a.node_id, b.node_id);
    }
}
