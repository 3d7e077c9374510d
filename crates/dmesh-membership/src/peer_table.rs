use crate::config::MembershipConfig;
use dmesh_core::events::MeshEvent;
use dmesh_core::types::{NodeId, NodeIdentity, PeerRecord, PeerState};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// The authoritative view of mesh membership as seen by this node.
///
/// Rebuilt entirely from gossip at startup; nothing here is durably
/// persisted (§6 — membership state is not a durability concern).
pub struct PeerTable {
    self_id: NodeId,
    peers: RwLock<HashMap<NodeId, PeerRecord>>,
}

impl PeerTable {
    pub fn new(self_id: NodeId) -> Self {
        Self {
            self_id,
            peers: RwLock::new(HashMap::new()),
        }
    }

    pub fn self_id(&self) -> NodeId {
        self.self_id
    }

    /// Admit or update a peer's identity. Returns the event describing what
    /// happened: a join, an identity update (higher version reconciled in),
    /// or `None` if the incoming identity was stale and ignored.
    pub async fn handle_join(&self, identity: NodeIdentity, now_ms: u64) -> Option<MeshEvent> {
        if identity.id == self.self_id {
            return None;
        }
        let mut peers = self.peers.write().await;
        match peers.get_mut(&identity.id) {
            None => {
                let id = identity.id;
                peers.insert(
                    id,
                    PeerRecord {
                        identity,
                        state: PeerState::Alive,
                        last_heard_ms: now_ms,
                        last_success_ms: now_ms,
                        latency_ewma_ms: 0.0,
                        reputation: 0.5,
                    },
                );
                Some(MeshEvent::PeerJoined { peer: id, at: now_ms as i64 })
            }
            Some(existing) => {
                let before_version = existing.identity.version;
                let reconciled = existing.identity.clone().reconcile(identity);
                if reconciled.version > before_version {
                    let id = reconciled.id;
                    let new_version = reconciled.version;
                    existing.identity = reconciled;
                    existing.last_heard_ms = now_ms;
                    Some(MeshEvent::PeerIdentityUpdated {
                        peer: id,
                        new_version,
                        at: now_ms as i64,
                    })
                } else {
                    None
                }
            }
        }
    }

    /// Record a successful heartbeat/response from `peer`, resetting its
    /// liveness clock and moving it back to `Alive` if it had degraded.
    pub async fn record_heartbeat(&self, peer: NodeId, now_ms: u64, latency_ms: f64) -> Option<MeshEvent> {
        let mut peers = self.peers.write().await;
        let record = peers.get_mut(&peer)?;
        record.last_heard_ms = now_ms;
        record.last_success_ms = now_ms;
        record.latency_ewma_ms = if record.latency_ewma_ms == 0.0 {
            latency_ms
        } else {
            0.8 * record.latency_ewma_ms + 0.2 * latency_ms
        };
        self.transition(record, PeerState::Alive, now_ms)
    }

    pub async fn get(&self, peer: &NodeId) -> Option<PeerRecord> {
        self.peers.read().await.get(peer).cloned()
    }

    pub async fn alive_peers(&self) -> Vec<PeerRecord> {
        self.peers
            .read()
            .await
            .values()
            .filter(|p| p.state == PeerState::Alive)
            .cloned()
            .collect()
    }

    pub async fn all_peers(&self) -> Vec<PeerRecord> {
        self.peers.read().await.values().cloned().collect()
    }

    /// Drop a peer immediately (§6 `/leave`), bypassing the normal
    /// suspected -> unreachable -> evicted decay.
    pub async fn remove(&self, peer: &NodeId) -> bool {
        self.peers.write().await.remove(peer).is_some()
    }

    /// Evaluate every peer's last-heard time against the configured
    /// thresholds and apply Alive -> Suspected -> Unreachable -> Evicted
    /// transitions, returning the events for any peer that moved. Evicted
    /// peers are removed from the table entirely.
    pub async fn sweep(&self, now_ms: u64, cfg: &MembershipConfig) -> Vec<MeshEvent> {
        let mut peers = self.peers.write().await;
        let mut events = Vec::new();
        let mut evicted = Vec::new();

        for (id, record) in peers.iter_mut() {
            let elapsed = now_ms.saturating_sub(record.last_heard_ms);
            let target = if elapsed >= cfg.evict_after_ms {
                Some(PeerState::Evicted)
            } else if elapsed >= cfg.unreachable_after_ms {
                Some(PeerState::Unreachable)
            } else if elapsed >= cfg.suspected_after_ms {
                Some(PeerState::Suspected)
            } else {
                None
            };
            if let Some(target) = target {
                if target != record.state {
                    events.push(MeshEvent::PeerStateChanged {
                        peer: *id,
                        from: format!("{:?}", record.state),
                        to: format!("{:?}", target),
                        at: now_ms as i64,
                    });
                    record.state = target;
                    if target == PeerState::Evicted {
                        evicted.push(*id);
                    }
                }
            }
        }
        for id in evicted {
            peers.remove(&id);
        }
        events
    }

    fn transition(&self, record: &mut PeerRecord, to: PeerState, now_ms: u64) -> Option<MeshEvent> {
        if record.state == to {
            return None;
        }
        let from = record.state;
        record.state = to;
        Some(MeshEvent::PeerStateChanged {
            peer: record.identity.id,
            from: format!("{:?}", from),
            to: format!("{:?}", to),
            at: now_ms as i64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn make_identity(id: NodeId, version: u64) -> NodeIdentity {
        NodeIdentity {
            id,
            name: "peer".into(),
            base_url: "http://127.0.0.1:9000".into(),
            capabilities: BTreeSet::new(),
            public_key: None,
            credentials: Vec::new(),
            version,
        }
    }

    #[tokio::test]
    async fn join_then_duplicate_lower_version_is_ignored() {
        let table = PeerTable::new(NodeId::new());
        let peer = NodeId::new();
        let ev = table.handle_join(make_identity(peer, 1), 0).await;
        assert!(matches!(ev, Some(MeshEvent::PeerJoined { .. })));

        let ev2 = table.handle_join(make_identity(peer, 1), 10).await;
        assert!(ev2.is_none());
    }

    #[tokio::test]
    async fn higher_version_reconciles_in() {
        let table = PeerTable::new(NodeId::new());
        let peer = NodeId::new();
        table.handle_join(make_identity(peer, 1), 0).await;
        let ev = table.handle_join(make_identity(peer, 2), 10).await;
        assert!(matches!(ev, Some(MeshEvent::PeerIdentityUpdated { new_version: 2, .. })));
    }

    #[tokio::test]
    async fn sweep_degrades_and_evicts_stale_peer() {
        let table = PeerTable::new(NodeId::new());
        let peer = NodeId::new();
        table.handle_join(make_identity(peer, 1), 0).await;

        let cfg = MembershipConfig {
            suspected_after_ms: 100,
            unreachable_after_ms: 200,
            evict_after_ms: 300,
            sweep_interval_ms: 50,
            heartbeat_interval_ms: 50,
        };

        let events = table.sweep(150, &cfg).await;
        assert_eq!(events.len(), 1);
        assert_eq!(table.get(&peer).await.unwrap().state, PeerState::Suspected);

        table.sweep(250, &cfg).await;
        assert_eq!(table.get(&peer).await.unwrap().state, PeerState::Unreachable);

        table.sweep(350, &cfg).await;
        assert!(table.get(&peer).await.is_none());
    }
}
