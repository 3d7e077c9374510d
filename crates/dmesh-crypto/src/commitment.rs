use dmesh_core::types::RevealedBid;

/// `commit = blake3(rfq_id || bidder || cost || duration || tokens || capabilities || nonce)`.
/// The commitment binds every field a bidder later reveals, so a node
/// cannot change its bid after seeing competitors' commitments (§4.9).
pub fn commit_hash(bid: &RevealedBid) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(bid.rfq_id.0.as_bytes());
    hasher.update(bid.bidder.0.as_bytes());
    hasher.update(&bid.estimated_cost_usd.to_le_bytes());
    hasher.update(&bid.estimated_duration_ms.to_le_bytes());
    hasher.update(&bid.estimated_tokens.to_le_bytes());
    for cap in &bid.capabilities_offered {
        hasher.update(cap.as_bytes());
        hasher.update(b"\0");
    }
    hasher.update(&bid.nonce);
    *hasher.finalize().as_bytes()
}

pub fn verify_commitment(bid: &RevealedBid, commitment: &[u8; 32]) -> bool {
    &commit_hash(bid) == commitment
}
