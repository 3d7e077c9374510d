use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use dmesh_core::error::MeshError;
use serde::Serialize;

/// Wraps the error kinds into a reason code string (§7's
/// `reason` field) and an appropriate HTTP status.
pub struct ApiError(pub MeshError);

impl From<MeshError> for ApiError {
    fn from(e: MeshError) -> Self {
        Self(e)
    }
}

fn status_for(err: &MeshError) -> StatusCode {
    use MeshError::*;
    match err {
        Unauthorized => StatusCode::UNAUTHORIZED,
        UnknownPeer(_) | UnknownContract(_) | UnknownBid(_) => StatusCode::NOT_FOUND,
        DeadlineExceeded(_) => StatusCode::REQUEST_TIMEOUT,
        RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        CapabilityMissing(_)
        | CredentialInvalid(_)
        | FirebreakExceeded { .. }
        | InsufficientFunds { .. }
        | SloViolated { .. }
        | CommitmentMismatch
        | ConsensusFailed { .. }
        | Cancelled
        | ContractNotActive(_)
        | RenegotiationPending(_)
        | NoPendingRenegotiation(_)
        | BidAlreadyCommitted
        | BidAlreadyRevealed
        | NoReservation(_) => StatusCode::BAD_REQUEST,
        Serialization(_) | Storage(_) | Transport(_) | Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[derive(Serialize)]
struct ErrorBody {
    ok: bool,
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        (status, Json(ErrorBody { ok: false, error: self.0.to_string() })).into_response()
    }
}
