use dmesh_core::types::{NodeId, NodeIdentity};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Anti-entropy gossip payloads exchanged between peers (§4.3).
///
/// Every message carries a `message_id`, used for replay dedup (a node
/// recognizes and drops its own gossip reflected back through a peer
/// unchanged), and a `source_id`, used for cycle detection (a node drops
/// any message whose `source_id` is its own regardless of how many hops
/// or re-wraps it has been through since).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum GossipMessage {
    /// "Here is my current identity" — the seed of all membership info.
    Announce {
        message_id: Uuid,
        source_id: NodeId,
        identity: NodeIdentity,
    },
    /// A batch of peer identities this node currently believes are alive,
    /// exchanged during a gossip round (version-vector push).
    PeerExchange {
        message_id: Uuid,
        source_id: NodeId,
        identities: Vec<NodeIdentity>,
    },
    /// Ask a peer to push back the identities it holds whose version is
    /// higher than what `known_versions` already records for them — the
    /// delta half of the anti-entropy protocol, so a catch-up round
    /// doesn't re-send state the requester already has.
    RequestPeers {
        message_id: Uuid,
        source_id: NodeId,
        known_versions: HashMap<NodeId, u64>,
    },
}

impl GossipMessage {
    pub fn message_id(&self) -> Uuid {
        match self {
            GossipMessage::Announce { message_id, .. } => *message_id,
            GossipMessage::PeerExchange { message_id, .. } => *message_id,
            GossipMessage::RequestPeers { message_id, .. } => *message_id,
        }
    }

    pub fn source_id(&self) -> NodeId {
        match self {
            GossipMessage::Announce { source_id, .. } => *source_id,
            GossipMessage::PeerExchange { source_id, .. } => *source_id,
            GossipMessage::RequestPeers { source_id, .. } => *source_id,
        }
    }
}
