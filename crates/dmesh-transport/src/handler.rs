use crate::types::{HeartbeatRequest, HeartbeatResponse, JoinRequest, LeaveRequest, TaskAcceptance};
use async_trait::async_trait;
use dmesh_core::error::MeshResult;
use dmesh_core::types::{
    Bid, CheckpointStatus, NodeIdentity, Rfq, TaskId, TaskRequest, TaskResult,
};
use dmesh_gossip::GossipMessage;

/// The node-side business logic a transport server dispatches into (spec
/// §6). `dmesh-node::MeshManager` is the sole production implementor; tests
/// may supply a stub.
#[async_trait]
pub trait MeshHandler: Send + Sync {
    fn identity(&self) -> NodeIdentity;

    async fn heartbeat(&self, req: HeartbeatRequest) -> MeshResult<HeartbeatResponse>;

    async fn join(&self, req: JoinRequest) -> MeshResult<()>;

    async fn leave(&self, req: LeaveRequest) -> MeshResult<()>;

    async fn gossip(&self, msg: GossipMessage) -> MeshResult<GossipMessage>;

    async fn task_request(&self, req: TaskRequest) -> TaskAcceptance;

    async fn task_result(&self, result: TaskResult) -> MeshResult<()>;

    async fn task_status(&self, task_id: TaskId) -> MeshResult<CheckpointStatus>;

    async fn task_cancel(&self, task_id: TaskId) -> MeshResult<()>;

    async fn rfq(&self, rfq: Rfq) -> MeshResult<()>;

    async fn bid(&self, bid: Bid) -> MeshResult<()>;
}
