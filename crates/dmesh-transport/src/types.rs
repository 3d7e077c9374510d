use dmesh_core::types::{CheckpointStatus, NodeId, NodeIdentity, Rfq, TaskId, TaskRequest, TaskResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub from_id: NodeId,
    pub timestamp: i64,
    pub peers: Vec<(NodeId, u64)>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub ok: bool,
    pub peers: Vec<NodeIdentity>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JoinRequest {
    pub identity: NodeIdentity,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LeaveRequest {
    pub node_id: NodeId,
    pub reason: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskAcceptance {
    pub accepted: bool,
    pub reason: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Ack {
    pub ok: bool,
}

impl Ack {
    pub fn yes() -> Self {
        Self { ok: true }
    }
}

pub type PeerTaskRequest = TaskRequest;
pub type PeerTaskResult = TaskResult;
pub type PeerRfq = Rfq;
pub type PeerCheckpointStatus = CheckpointStatus;

/// Path parameter re-export so callers don't need to reach into core types
/// directly for route building.
pub type PathTaskId = TaskId;
pub type PathNodeId = NodeId;
pub type PathSessionId = Uuid;
