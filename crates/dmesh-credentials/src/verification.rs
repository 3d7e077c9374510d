use crate::error::CredentialError;
use crate::issuance::{endorsement_signing_bytes, signing_bytes};
use dmesh_core::types::{Credential, NodeId, PublicKeyBytes, Timestamp};
use std::collections::HashSet;

/// Policy knobs a verifier checks a credential against.
pub struct VerificationPolicy<'a> {
    pub trusted_issuers: &'a HashSet<NodeId>,
    pub min_endorsements: usize,
}

/// Verify `credential` was signed by `issuer_public_key`, has not expired,
/// was issued by a trusted authority, and carries enough validly-signed
/// endorsements. `resolve_endorser_key` looks up an endorser's public key
/// (e.g. via the peer table); an endorsement from an unresolvable
/// endorser is treated as invalid. Checks run in this order so the first
/// applicable failure reason is the one surfaced (§4.4 distinguishes
/// these as separate reasons).
pub fn verify_credential(
    credential: &Credential,
    issuer_public_key: &PublicKeyBytes,
    now: Timestamp,
    policy: &VerificationPolicy,
    resolve_endorser_key: impl Fn(&NodeId) -> Option<PublicKeyBytes>,
) -> Result<(), CredentialError> {
    let bytes = signing_bytes(
        &credential.credential_id,
        &credential.issuer,
        &credential.subject,
        &credential.capability_claims,
        credential.issued_at,
        credential.expires_at,
    );
    if !dmesh_crypto::verify(issuer_public_key, &bytes, &credential.signature) {
        return Err(CredentialError::SignatureInvalid);
    }

    if now >= credential.expires_at {
        return Err(CredentialError::Expired {
            expires_at: credential.expires_at,
            now,
        });
    }

    if !policy.trusted_issuers.contains(&credential.issuer) {
        return Err(CredentialError::IssuerNotTrusted);
    }

    if credential.endorsements.len() < policy.min_endorsements {
        return Err(CredentialError::InsufficientEndorsements {
            have: credential.endorsements.len(),
            required: policy.min_endorsements,
        });
    }

    let endorsement_bytes = endorsement_signing_bytes(credential);
    for endorsement in &credential.endorsements {
        let valid = resolve_endorser_key(&endorsement.endorser_id)
            .is_some_and(|pk| dmesh_crypto::verify(&pk, &endorsement_bytes, &endorsement.signature));
        if !valid {
            return Err(CredentialError::EndorsementInvalid);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issuance::issue_credential;
    use dmesh_crypto::KeyPair;

    #[test]
    fn freshly_issued_credential_fails_trust_check_by_default() {
        let issuer = KeyPair::generate();
        let subject = NodeId::new();
        let cred = issue_credential(&issuer, subject, Vec::new(), 0, 1_000);

        let trusted = HashSet::new();
        let policy = VerificationPolicy {
            trusted_issuers: &trusted,
            min_endorsements: 0,
        };
        let err = verify_credential(&cred, &issuer.public_key, 10, &policy, |_| None).unwrap_err();
        assert_eq!(err, CredentialError::IssuerNotTrusted);
    }

    #[test]
    fn trusted_unexpired_credential_verifies() {
        let issuer = KeyPair::generate();
        let subject = NodeId::new();
        let cred = issue_credential(&issuer, subject, Vec::new(), 0, 1_000);

        let mut trusted = HashSet::new();
        trusted.insert(issuer.node_id);
        let policy = VerificationPolicy {
            trusted_issuers: &trusted,
            min_endorsements: 0,
        };
        assert!(verify_credential(&cred, &issuer.public_key, 10, &policy, |_| None).is_ok());
    }

    #[test]
    fn expired_credential_is_rejected() {
        let issuer = KeyPair::generate();
        let subject = NodeId::new();
        let cred = issue_credential(&issuer, subject, Vec::new(), 0, 100);

        let mut trusted = HashSet::new();
        trusted.insert(issuer.node_id);
        let policy = VerificationPolicy {
            trusted_issuers: &trusted,
            min_endorsements: 0,
        };
        let err = verify_credential(&cred, &issuer.public_key, 200, &policy, |_| None).unwrap_err();
        assert!(matches!(err, CredentialError::Expired { .. }));
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let issuer = KeyPair::generate();
        let other = KeyPair::generate();
        let subject = NodeId::new();
        let cred = issue_credential(&issuer, subject, Vec::new(), 0, 1_000);

        let mut trusted = HashSet::new();
        trusted.insert(issuer.node_id);
        let policy = VerificationPolicy {
            trusted_issuers: &trusted,
            min_endorsements: 0,
        };
        let err = verify_credential(&cred, &other.public_key, 10, &policy, |_| None).unwrap_err();
        assert_eq!(err, CredentialError::SignatureInvalid);
    }

    #[test]
    fn valid_endorsement_signature_verifies() {
        let issuer = KeyPair::generate();
        let endorser = KeyPair::generate();
        let subject = NodeId::new();
        let mut cred = issue_credential(&issuer, subject, Vec::new(), 0, 1_000);
        cred.endorsements.push(crate::issuance::endorse_credential(&endorser, &cred));

        let mut trusted = HashSet::new();
        trusted.insert(issuer.node_id);
        let policy = VerificationPolicy {
            trusted_issuers: &trusted,
            min_endorsements: 1,
        };
        let endorser_key = endorser.public_key.clone();
        let resolve = move |id: &NodeId| if *id == endorser.node_id { Some(endorser_key.clone()) } else { None };
        assert!(verify_credential(&cred, &issuer.public_key, 10, &policy, resolve).is_ok());
    }

    #[test]
    fn endorsement_from_unresolvable_endorser_is_rejected() {
        let issuer = KeyPair::generate();
        let endorser = KeyPair::generate();
        let subject = NodeId::new();
        let mut cred = issue_credential(&issuer, subject, Vec::new(), 0, 1_000);
        cred.endorsements.push(crate::issuance::endorse_credential(&endorser, &cred));

        let mut trusted = HashSet::new();
        trusted.insert(issuer.node_id);
        let policy = VerificationPolicy {
            trusted_issuers: &trusted,
            min_endorsements: 1,
        };
        let err = verify_credential(&cred, &issuer.public_key, 10, &policy, |_| None).unwrap_err();
        assert_eq!(err, CredentialError::EndorsementInvalid);
    }

    #[test]
    fn tampered_endorsement_signature_is_rejected() {
        let issuer = KeyPair::generate();
        let endorser = KeyPair::generate();
        let impostor = KeyPair::generate();
        let subject = NodeId::new();
        let mut cred = issue_credential(&issuer, subject, Vec::new(), 0, 1_000);
        // signed by impostor but claims to be from endorser.
        let mut forged = crate::issuance::endorse_credential(&impostor, &cred);
        forged.endorser_id = endorser.node_id;
        cred.endorsements.push(forged);

        let mut trusted = HashSet::new();
        trusted.insert(issuer.node_id);
        let policy = VerificationPolicy {
            trusted_issuers: &trusted,
            min_endorsements: 1,
        };
        let endorser_key = endorser.public_key.clone();
        let resolve = move |id: &NodeId| if *id == endorser.node_id { Some(endorser_key.clone()) } else { None };
        let err = verify_credential(&cred, &issuer.public_key, 10, &policy, resolve).unwrap_err();
        assert_eq!(err, CredentialError::EndorsementInvalid);
    }
}
