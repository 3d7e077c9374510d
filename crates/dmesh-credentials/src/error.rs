use thiserror::Error;

/// Distinct reasons a credential fails verification (§4.4) — kept
/// separate from `MeshError` so callers can log the specific failure mode
/// without string-matching.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CredentialError {
    #[error("credential signature does not match issuer public key")]
    SignatureInvalid,

    #[error("credential expired at {expires_at}, now is {now}")]
    Expired { expires_at: i64, now: i64 },

    #[error("issuer is not a trusted credential authority")]
    IssuerNotTrusted,

    #[error("credential has {have} endorsements, requires at least {required}")]
    InsufficientEndorsements { have: usize, required: usize },

    #[error("one or more endorsement signatures are invalid")]
    EndorsementInvalid,
}
