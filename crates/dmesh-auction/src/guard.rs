use crate::config::AuctionConfig;
use dmesh_core::constants::{FRONTRUN_MIN_SAMPLE, FRONTRUN_THRESHOLD_FRACTION};
use dmesh_core::error::{MeshError, MeshResult};
use dmesh_core::events::MeshEvent;
use dmesh_core::types::{BidId, NodeId, RevealedBid, RfqId, SealedBid};
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::RwLock;

struct BidLogEntry {
    bidder: NodeId,
    at_ms: u64,
}

/// Guards the sealed-bid auction against collusion and front-running
/// (§4.9). Consulted once at commit time and once at reveal time;
/// both calls can veto. Holds its own lock — callers never see partial
/// commit/reveal state.
pub struct AuctionGuard {
    cfg: AuctionConfig,
    commitments: RwLock<HashMap<BidId, SealedBid>>,
    revealed: RwLock<HashSet<BidId>>,
    bids_by_node: RwLock<HashMap<NodeId, VecDeque<u64>>>,
    rfq_log: RwLock<HashMap<RfqId, Vec<BidLogEntry>>>,
}

impl AuctionGuard {
    pub fn new(cfg: AuctionConfig) -> Self {
        Self {
            cfg,
            commitments: RwLock::new(HashMap::new()),
            revealed: RwLock::new(HashSet::new()),
            bids_by_node: RwLock::new(HashMap::new()),
            rfq_log: RwLock::new(HashMap::new()),
        }
    }

    /// Accept a sealed bid iff its `bid_id` is unseen and the bidder is
    /// within its per-minute rate limit. Records the bid in the RFQ's
    /// timing log for later front-running analysis.
    pub async fn commit(&self, bid: SealedBid, now_ms: u64) -> MeshResult<MeshEvent> {
        self.check_rate_limit(bid.bidder, now_ms).await?;

        let mut commitments = self.commitments.write().await;
        if commitments.contains_key(&bid.bid_id) {
            return Err(MeshError::BidAlreadyCommitted);
        }

        self.rfq_log
            .write()
            .await
            .entry(bid.rfq_id)
            .or_default()
            .push(BidLogEntry {
                bidder: bid.bidder,
                at_ms: now_ms,
            });

        let event = MeshEvent::BidCommitted {
            rfq_id: bid.rfq_id,
            bid_id: bid.bid_id,
            bidder: bid.bidder,
        };
        commitments.insert(bid.bid_id, bid);
        Ok(event)
    }

    /// Reveal a previously committed bid. Fails if the bid was never
    /// committed, has already been revealed, or its hash does not match
    /// the stored commitment.
    pub async fn reveal(&self, bid: RevealedBid) -> MeshResult<MeshEvent> {
        let commitments = self.commitments.read().await;
        let sealed = commitments
            .get(&bid.bid_id)
            .ok_or_else(|| MeshError::UnknownBid(bid.bid_id.to_string()))?;

        if self.revealed.read().await.contains(&bid.bid_id) {
            return Err(MeshError::BidAlreadyRevealed);
        }

        if !dmesh_crypto::verify_commitment(&bid, &sealed.commitment_hash) {
            return Err(MeshError::CommitmentMismatch);
        }

        self.revealed.write().await.insert(bid.bid_id);
        Ok(MeshEvent::BidRevealed {
            rfq_id: bid.rfq_id,
            bid_id: bid.bid_id,
            bidder: bid.bidder,
        })
    }

    async fn check_rate_limit(&self, node: NodeId, now_ms: u64) -> MeshResult<()> {
        let mut by_node = self.bids_by_node.write().await;
        let window = by_node.entry(node).or_default();
        while let Some(&oldest) = window.front() {
            if now_ms.saturating_sub(oldest) > 60_000 {
                window.pop_front();
            } else {
                break;
            }
        }
        if window.len() as u32 >= self.cfg.max_bids_per_node_per_minute {
            return Err(MeshError::RateLimited(format!(
                "node {node} exceeded {} bids/minute"
            , self.cfg.max_bids_per_node_per_minute)));
        }
        window.push_back(now_ms);
        Ok(())
    }

    /// Pairwise timing analysis over an RFQ's commit log: for each pair
    /// (A, B) with at least `FRONTRUN_MIN_SAMPLE` bids each, count how
    /// many of B's bids land within `frontrun_window_ms` of an A bid. If
    /// that fraction of B's bids is at or above the threshold, B is
    /// flagged as likely watching A's commits and racing to follow them.
    pub async fn detect_front_running(&self, rfq_id: RfqId) -> Vec<MeshEvent> {
        let log = self.rfq_log.read().await;
        let Some(entries) = log.get(&rfq_id) else {
            return Vec::new();
        };

        let mut by_node: HashMap<NodeId, Vec<u64>> = HashMap::new();
        for e in entries {
            by_node.entry(e.bidder).or_default().push(e.at_ms);
        }

        let mut events = Vec::new();
        let nodes: Vec<NodeId> = by_node.keys().copied().collect();
        for &a in &nodes {
            for &b in &nodes {
                if a == b {
                    continue;
                }
                let a_times = &by_node[&a];
                let b_times = &by_node[&b];
                if a_times.len() < FRONTRUN_MIN_SAMPLE || b_times.len() < FRONTRUN_MIN_SAMPLE {
                    continue;
                }
                let following = b_times
                    .iter()
                    .filter(|&&bt| {
                        a_times
                            .iter()
                            .any(|&at| bt >= at && bt - at <= self.cfg.frontrun_window_ms)
                    })
                    .count();
                let fraction = following as f64 / b_times.len() as f64;
                if fraction >= FRONTRUN_THRESHOLD_FRACTION {
                    events.push(MeshEvent::FrontRunningDetected {
                        rfq_id,
                        suspect: b,
                        confidence: fraction,
                    });
                }
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dmesh_crypto::commit_hash;

    fn sealed(bid_id: BidId, rfq_id: RfqId, bidder: NodeId, hash: [u8; 32], at_ms: u64) -> SealedBid {
        SealedBid {
            bid_id,
            rfq_id,
            bidder,
            commitment_hash: hash,
            timestamp: at_ms as i64,
        }
    }

    fn revealed(bid_id: BidId, rfq_id: RfqId, bidder: NodeId, nonce: [u8; 16]) -> RevealedBid {
        RevealedBid {
            bid_id,
            rfq_id,
            bidder,
            estimated_cost_usd: 1.0,
            estimated_duration_ms: 1_000,
            estimated_tokens: 100,
            capabilities_offered: vec![],
            expiry: 0,
            round: 0,
            nonce,
        }
    }

    #[tokio::test]
    async fn duplicate_commit_is_rejected() {
        let guard = AuctionGuard::new(AuctionConfig::default());
        let bid_id = BidId::new();
        let rfq = RfqId::new();
        let bidder = NodeId::new();
        let sealed1 = sealed(bid_id, rfq, bidder, [1u8; 32], 0);
        let sealed2 = sealed(bid_id, rfq, bidder, [2u8; 32], 100);

        guard.commit(sealed1, 0).await.unwrap();
        let err = guard.commit(sealed2, 100).await.unwrap_err();
        assert_eq!(err, MeshError::BidAlreadyCommitted);
    }

    #[tokio::test]
    async fn reveal_matching_commitment_succeeds() {
        let guard = AuctionGuard::new(AuctionConfig::default());
        let bid_id = BidId::new();
        let rfq = RfqId::new();
        let bidder = NodeId::new();
        let reveal = revealed(bid_id, rfq, bidder, [7u8; 16]);
        let hash = commit_hash(&reveal);

        guard.commit(sealed(bid_id, rfq, bidder, hash, 0), 0).await.unwrap();
        guard.reveal(reveal).await.unwrap();
    }

    #[tokio::test]
    async fn reveal_with_tampered_fields_is_commitment_mismatch() {
        let guard = AuctionGuard::new(AuctionConfig::default());
        let bid_id = BidId::new();
        let rfq = RfqId::new();
        let bidder = NodeId::new();
        let reveal = revealed(bid_id, rfq, bidder, [7u8; 16]);
        let hash = commit_hash(&reveal);
        guard.commit(sealed(bid_id, rfq, bidder, hash, 0), 0).await.unwrap();

        let mut tampered = reveal;
        tampered.estimated_cost_usd += 100.0;
        let err = guard.reveal(tampered).await.unwrap_err();
        assert_eq!(err, MeshError::CommitmentMismatch);
    }

    #[tokio::test]
    async fn double_reveal_is_rejected() {
        let guard = AuctionGuard::new(AuctionConfig::default());
        let bid_id = BidId::new();
        let rfq = RfqId::new();
        let bidder = NodeId::new();
        let reveal = revealed(bid_id, rfq, bidder, [7u8; 16]);
        let hash = commit_hash(&reveal);
        guard.commit(sealed(bid_id, rfq, bidder, hash, 0), 0).await.unwrap();

        guard.reveal(reveal.clone()).await.unwrap();
        let err = guard.reveal(reveal).await.unwrap_err();
        assert_eq!(err, MeshError::BidAlreadyRevealed);
    }

    #[tokio::test]
    async fn rate_limit_trips_after_configured_count() {
        let guard = AuctionGuard::new(AuctionConfig {
            max_bids_per_node_per_minute: 2,
            ..AuctionConfig::default()
        });
        let bidder = NodeId::new();
        let rfq = RfqId::new();
        guard.commit(sealed(BidId::new(), rfq, bidder, [0u8; 32], 0), 0).await.unwrap();
        guard.commit(sealed(BidId::new(), rfq, bidder, [0u8; 32], 1_000), 1_000).await.unwrap();
        let err = guard
            .commit(sealed(BidId::new(), rfq, bidder, [0u8; 32], 2_000), 2_000)
            .await
            .unwrap_err();
        assert!(matches!(err, MeshError::RateLimited(_)));
    }

    #[tokio::test]
    async fn follower_bidding_right_after_leader_is_flagged() {
        let guard = AuctionGuard::new(AuctionConfig::default());
        let rfq = RfqId::new();
        let leader = NodeId::new();
        let follower = NodeId::new();
        for i in 0..4u64 {
            let t = i * 10_000;
            guard
                .commit(sealed(BidId::new(), rfq, leader, [0u8; 32], t), t)
                .await
                .unwrap();
            guard
                .commit(sealed(BidId::new(), rfq, follower, [0u8; 32], t + 500), t + 500)
                .await
                .unwrap();
        }
        let events = guard.detect_front_running(rfq).await;
        assert!(events
            .iter()
            .any(|e| matches!(e, MeshEvent::FrontRunningDetected { suspect, .. } if *suspect == follower)));
    }
}
