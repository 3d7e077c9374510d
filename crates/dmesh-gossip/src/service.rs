use crate::config::GossipConfig;
use crate::message::GossipMessage;
use dmesh_core::events::MeshEvent;
use dmesh_core::types::{NodeId, NodeIdentity, PeerRecord};
use dmesh_membership::PeerTable;
use rand::seq::SliceRandom;
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Anti-entropy gossip over the membership table: pushes this node's view
/// of the mesh to a random fanout of peers each round, and merges whatever
/// views come back in. `NodeIdentity.version` acts as a per-peer version
/// vector entry — reconciliation (`PeerTable::handle_join`) always keeps
/// the higher version, so repeated re-delivery of stale state is harmless.
pub struct GossipService {
    cfg: GossipConfig,
    seen: Mutex<SeenCache>,
}

struct SeenCache {
    order: VecDeque<Uuid>,
    set: HashSet<Uuid>,
    cap: usize,
}

impl SeenCache {
    fn new(cap: usize) -> Self {
        Self {
            order: VecDeque::new(),
            set: HashSet::new(),
            cap,
        }
    }

    /// Returns `true` if `id` had not been seen before (and records it).
    fn record(&mut self, id: Uuid) -> bool {
        if !self.set.insert(id) {
            return false;
        }
        self.order.push_back(id);
        if self.order.len() > self.cap {
            if let Some(oldest) = self.order.pop_front() {
                self.set.remove(&oldest);
            }
        }
        true
    }
}

/// The per-peer versions a gossip message's sender is asserting knowledge
/// of, derived from whichever variant it is. Used by the recipient to
/// compute the delta it actually needs to push back.
pub fn known_versions(msg: &GossipMessage) -> HashMap<NodeId, u64> {
    match msg {
        GossipMessage::Announce { identity, .. } => {
            let mut map = HashMap::new();
            map.insert(identity.id, identity.version);
            map
        }
        GossipMessage::PeerExchange { identities, .. } => identities.iter().map(|i| (i.id, i.version)).collect(),
        GossipMessage::RequestPeers { known_versions, .. } => known_versions.clone(),
    }
}

impl GossipService {
    pub fn new(cfg: GossipConfig) -> Self {
        Self {
            seen: Mutex::new(SeenCache::new(cfg.seen_cache_cap)),
            cfg,
        }
    }

    /// Build this round's outbound message plus the peers it should be
    /// sent to (a random sample of size `fanout`, excluding the node
    /// whose identity we are about to send as a reflection of itself).
    pub async fn round(&self, table: &PeerTable, self_identity: NodeIdentity) -> (Vec<PeerRecord>, GossipMessage) {
        let mut alive = table.alive_peers().await;
        let mut rng = rand::thread_rng();
        alive.shuffle(&mut rng);
        alive.truncate(self.cfg.fanout);

        let mut identities: Vec<NodeIdentity> = alive.iter().map(|p| p.identity.clone()).collect();
        let source_id = self_identity.id;
        identities.push(self_identity);

        let message_id = Uuid::new_v4();
        self.seen.lock().await.record(message_id);

        (alive, GossipMessage::PeerExchange { message_id, source_id, identities })
    }

    /// Process an inbound gossip message: drop it if its `source_id` is
    /// this node's own id (a cycle — our gossip relayed back to us
    /// through one or more peers) or if we've already seen this
    /// `message_id` (the same relay bouncing the identical message back),
    /// otherwise merge any carried identities into `table`.
    pub async fn handle_incoming(
        &self,
        msg: GossipMessage,
        table: &PeerTable,
        now_ms: u64,
    ) -> Vec<MeshEvent> {
        if msg.source_id() == table.self_id() {
            return Vec::new();
        }
        let is_new = self.seen.lock().await.record(msg.message_id());
        if !is_new {
            return Vec::new();
        }

        let mut events = Vec::new();
        match msg {
            GossipMessage::Announce { identity, .. } => {
                if let Some(ev) = table.handle_join(identity, now_ms).await {
                    events.push(ev);
                }
            }
            GossipMessage::PeerExchange { identities, .. } => {
                for identity in identities {
                    if let Some(ev) = table.handle_join(identity, now_ms).await {
                        events.push(ev);
                    }
                }
            }
            GossipMessage::RequestPeers { .. } => {
                // Handled by the caller, which responds with `respond_peers`;
                // no membership-table effect on its own.
            }
        }
        events
    }

    /// Reply to an inbound gossip message with the delta the sender is
    /// missing: every peer this node holds at a version higher than what
    /// `sender_known_versions` already records for it (or that the sender
    /// didn't mention at all), plus this node's own identity unconditionally
    /// since it is the seed a fresh peer bootstraps its view from.
    pub async fn respond_peers(
        &self,
        table: &PeerTable,
        self_identity: NodeIdentity,
        sender_known_versions: &HashMap<NodeId, u64>,
    ) -> GossipMessage {
        let mut identities: Vec<NodeIdentity> = table
            .all_peers()
            .await
            .into_iter()
            .map(|p| p.identity)
            .filter(|identity| match sender_known_versions.get(&identity.id) {
                Some(&known) => identity.version > known,
                None => true,
            })
            .collect();
        let source_id = self_identity.id;
        identities.push(self_identity);
        let message_id = Uuid::new_v4();
        self.seen.lock().await.record(message_id);
        GossipMessage::PeerExchange { message_id, source_id, identities }
    }

    pub fn announce(&self, self_identity: NodeIdentity) -> GossipMessage {
        GossipMessage::Announce {
            message_id: Uuid::new_v4(),
            source_id: self_identity.id,
            identity: self_identity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dmesh_core::types::NodeId;
    use std::collections::BTreeSet;

    fn make_identity(id: NodeId) -> NodeIdentity {
        make_identity_versioned(id, 1)
    }

    fn make_identity_versioned(id: NodeId, version: u64) -> NodeIdentity {
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
    async fn self_message_reflected_back_is_dropped() {
        let table = PeerTable::new(NodeId::new());
        let svc = GossipService::new(GossipConfig::default());
        let peer = NodeId::new();
        let msg = GossipMessage::PeerExchange {
            message_id: Uuid::new_v4(),
            source_id: peer,
            identities: vec![make_identity(peer)],
        };

        let first = svc.handle_incoming(msg.clone(), &table, 0).await;
        assert_eq!(first.len(), 1);

        let second = svc.handle_incoming(msg, &table, 10).await;
        assert!(second.is_empty(), "replayed message must be deduped");
    }

    #[tokio::test]
    async fn message_whose_source_is_self_is_dropped_even_with_a_fresh_message_id() {
        let self_id = NodeId::new();
        let table = PeerTable::new(self_id);
        let svc = GossipService::new(GossipConfig::default());
        let msg = GossipMessage::PeerExchange {
            message_id: Uuid::new_v4(),
            source_id: self_id,
            identities: vec![make_identity(NodeId::new())],
        };

        let events = svc.handle_incoming(msg, &table, 0).await;
        assert!(events.is_empty(), "a cycle back to this node's own gossip must be dropped");
    }

    #[tokio::test]
    async fn peer_exchange_merges_new_identities() {
        let table = PeerTable::new(NodeId::new());
        let svc = GossipService::new(GossipConfig::default());
        let a = NodeId::new();
        let b = NodeId::new();
        let msg = GossipMessage::PeerExchange {
            message_id: Uuid::new_v4(),
            source_id: a,
            identities: vec![make_identity(a), make_identity(b)],
        };
        let events = svc.handle_incoming(msg, &table, 0).await;
        assert_eq!(events.len(), 2);
        assert_eq!(table.all_peers().await.len(), 2);
    }

    #[tokio::test]
    async fn respond_peers_omits_entries_the_sender_already_has_current() {
        let self_id = NodeId::new();
        let table = PeerTable::new(self_id);
        let svc = GossipService::new(GossipConfig::default());
        let stale = NodeId::new();
        let fresh = NodeId::new();
        table.handle_join(make_identity_versioned(stale, 3), 0).await;
        table.handle_join(make_identity_versioned(fresh, 5), 0).await;

        let mut sender_known = HashMap::new();
        sender_known.insert(stale, 3); // sender already has the current version.
        sender_known.insert(fresh, 2); // sender is behind.

        let self_identity = make_identity(self_id);
        let reply = svc.respond_peers(&table, self_identity, &sender_known).await;
        let GossipMessage::PeerExchange { identities, .. } = reply else {
            panic!("expected a PeerExchange reply")
        };
        let ids: HashSet<NodeId> = identities.iter().map(|i| i.id).collect();
        assert!(!ids.contains(&stale), "sender already has this peer's current version");
        assert!(ids.contains(&fresh), "sender is behind on this peer's version");
        assert!(ids.contains(&self_id), "self identity is always included");
    }
}
