use dmesh_core::types::{CapabilityClaim, Credential, CredentialId, Endorsement, NodeId, Timestamp};
use dmesh_crypto::KeyPair;

/// Build and sign a credential asserting `claims` on behalf of `subject`.
/// The signature covers the canonical bytes of every field but the
/// signature itself, so tampering with any claim invalidates it.
pub fn issue_credential(
    issuer_key: &KeyPair,
    subject: NodeId,
    claims: Vec<CapabilityClaim>,
    issued_at: Timestamp,
    expires_at: Timestamp,
) -> Credential {
    let credential_id = CredentialId::new();
    let signing_bytes = signing_bytes(&credential_id, &issuer_key.node_id, &subject, &claims, issued_at, expires_at);
    let signature = issuer_key.sign(&signing_bytes);

    Credential {
        credential_id,
        issuer: issuer_key.node_id,
        subject,
        capability_claims: claims,
        issued_at,
        expires_at,
        signature,
        endorsements: Vec::new(),
    }
}

/// An endorser vouches for a specific, already-issued credential by
/// signing over its signing bytes plus the issuer's own signature, so the
/// endorsement can't be replayed against a different credential the
/// endorser never saw.
pub fn endorse_credential(endorser: &KeyPair, credential: &Credential) -> Endorsement {
    let signature = endorser.sign(&endorsement_signing_bytes(credential));
    Endorsement {
        endorser_id: endorser.node_id,
        signature,
    }
}

pub fn endorsement_signing_bytes(credential: &Credential) -> Vec<u8> {
    let mut buf = signing_bytes(
        &credential.credential_id,
        &credential.issuer,
        &credential.subject,
        &credential.capability_claims,
        credential.issued_at,
        credential.expires_at,
    );
    buf.extend_from_slice(&credential.signature.0);
    buf
}

pub fn signing_bytes(
    credential_id: &CredentialId,
    issuer: &NodeId,
    subject: &NodeId,
    claims: &[CapabilityClaim],
    issued_at: Timestamp,
    expires_at: Timestamp,
) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(credential_id.0.as_bytes());
    buf.extend_from_slice(issuer.0.as_bytes());
    buf.extend_from_slice(subject.0.as_bytes());
    buf.extend_from_slice(&issued_at.to_le_bytes());
    buf.extend_from_slice(&expires_at.to_le_bytes());
    for claim in claims {
        buf.extend_from_slice(claim.capability.as_bytes());
        buf.extend_from_slice(&claim.valid_until.to_le_bytes());
    }
    buf
}
