use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;
use tracing::info;

use dmesh_core::types::{Bid, CheckpointStatus, NodeIdentity, Rfq, TaskId, TaskRequest, TaskResult};
use dmesh_gossip::GossipMessage;

use crate::auth::BearerAuthLayer;
use crate::envelope::ApiError;
use crate::handler::MeshHandler;
use crate::types::{Ack, HeartbeatRequest, HeartbeatResponse, JoinRequest, LeaveRequest, TaskAcceptance};

type SharedHandler = Arc<dyn MeshHandler>;

/// Builds the peer wire protocol router (§6). Every endpoint but
/// `GET /identity` is wrapped in `BearerAuthLayer`.
pub fn build_router(handler: SharedHandler, shared_secret: impl Into<String>) -> Router {
    let public = Router::new()
        .route("/identity", get(identity))
        .with_state(Arc::clone(&handler));

    let protected = Router::new()
        .route("/heartbeat", post(heartbeat))
        .route("/join", post(join))
        .route("/leave", post(leave))
        .route("/gossip", post(gossip))
        .route("/task", post(task_request))
        .route("/result", post(task_result))
        .route("/task/:id/status", get(task_status))
        .route("/task/:id/cancel", post(task_cancel))
        .route("/rfq", post(rfq))
        .route("/bid", post(bid))
        .layer(BearerAuthLayer::new(shared_secret.into()))
        .with_state(handler);

    public.merge(protected).layer(TraceLayer::new_for_http())
}

/// Starts the server on `addr`, blocking until the listener is closed.
pub async fn serve(router: Router, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound = listener.local_addr()?;
    info!(%bound, "mesh transport listening");
    axum::serve(listener, router).await?;
    Ok(())
}

async fn identity(State(handler): State<SharedHandler>) -> Json<NodeIdentity> {
    Json(handler.identity())
}

async fn heartbeat(
    State(handler): State<SharedHandler>,
    Json(req): Json<HeartbeatRequest>,
) -> Result<Json<HeartbeatResponse>, ApiError> {
    Ok(Json(handler.heartbeat(req).await?))
}

async fn join(State(handler): State<SharedHandler>, Json(req): Json<JoinRequest>) -> Result<Json<Ack>, ApiError> {
    handler.join(req).await?;
    Ok(Json(Ack::yes()))
}

async fn leave(State(handler): State<SharedHandler>, Json(req): Json<LeaveRequest>) -> Result<Json<Ack>, ApiError> {
    handler.leave(req).await?;
    Ok(Json(Ack::yes()))
}

async fn gossip(
    State(handler): State<SharedHandler>,
    Json(msg): Json<GossipMessage>,
) -> Result<Json<GossipMessage>, ApiError> {
    Ok(Json(handler.gossip(msg).await?))
}

async fn task_request(
    State(handler): State<SharedHandler>,
    Json(req): Json<TaskRequest>,
) -> Json<TaskAcceptance> {
    Json(handler.task_request(req).await)
}

async fn task_result(
    State(handler): State<SharedHandler>,
    Json(result): Json<TaskResult>,
) -> Result<Json<Ack>, ApiError> {
    handler.task_result(result).await?;
    Ok(Json(Ack::yes()))
}

async fn task_status(
    State(handler): State<SharedHandler>,
    Path(id): Path<TaskId>,
) -> Result<Json<CheckpointStatus>, ApiError> {
    Ok(Json(handler.task_status(id).await?))
}

async fn task_cancel(State(handler): State<SharedHandler>, Path(id): Path<TaskId>) -> Result<Json<Ack>, ApiError> {
    handler.task_cancel(id).await?;
    Ok(Json(Ack::yes()))
}

async fn rfq(State(handler): State<SharedHandler>, Json(rfq): Json<Rfq>) -> Result<Json<Ack>, ApiError> {
    handler.rfq(rfq).await?;
    Ok(Json(Ack::yes()))
}

async fn bid(State(handler): State<SharedHandler>, Json(bid): Json<Bid>) -> Result<Json<Ack>, ApiError> {
    handler.bid(bid).await?;
    Ok(Json(Ack::yes()))
}
