use anyhow::{bail, Context};
use std::time::Duration;

use dmesh_core::types::{Bid, CheckpointStatus, NodeId, NodeIdentity, Rfq, TaskId, TaskRequest, TaskResult};
use dmesh_gossip::GossipMessage;

use crate::types::{Ack, HeartbeatRequest, HeartbeatResponse, JoinRequest, LeaveRequest, TaskAcceptance};

const DEFAULT_DEADLINE_MS: u64 = 10_000;

/// Typed client for the peer wire protocol (§6). Kept deliberately
/// thin over `reqwest` rather than reaching for a generated client — every
/// call enforces the request's deadline with `tokio::time::timeout` and
/// surfaces a timeout as `MeshError::DeadlineExceeded` at the call site.
pub struct MeshClient {
    base_url: String,
    shared_secret: String,
    client: reqwest::Client,
    deadline_ms: u64,
}

impl MeshClient {
    pub fn new(base_url: impl Into<String>, shared_secret: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            shared_secret: shared_secret.into(),
            client: reqwest::Client::new(),
            deadline_ms: DEFAULT_DEADLINE_MS,
        }
    }

    pub fn with_deadline_ms(mut self, deadline_ms: u64) -> Self {
        self.deadline_ms = deadline_ms;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn with_deadline<T>(&self, fut: impl std::future::Future<Output = anyhow::Result<T>>) -> anyhow::Result<T> {
        match tokio::time::timeout(Duration::from_millis(self.deadline_ms), fut).await {
            Ok(res) => res,
            Err(_) => bail!("request exceeded deadline of {}ms", self.deadline_ms),
        }
    }

    pub async fn identity(&self) -> anyhow::Result<NodeIdentity> {
        self.with_deadline(async {
            let resp = self
                .client
                .get(self.url("/identity"))
                .send()
                .await
                .with_context(|| format!("GET /identity on {}", self.base_url))?;
            resp.json().await.context("parsing identity response")
        })
        .await
    }

    pub async fn heartbeat(&self, req: &HeartbeatRequest) -> anyhow::Result<HeartbeatResponse> {
        self.post_authed("/heartbeat", req).await
    }

    pub async fn join(&self, identity: NodeIdentity) -> anyhow::Result<()> {
        let _: Ack = self.post_authed("/join", &JoinRequest { identity }).await?;
        Ok(())
    }

    pub async fn leave(&self, node_id: NodeId, reason: impl Into<String>) -> anyhow::Result<()> {
        let _: Ack = self
            .post_authed("/leave", &LeaveRequest { node_id, reason: reason.into() })
            .await?;
        Ok(())
    }

    pub async fn gossip(&self, msg: &GossipMessage) -> anyhow::Result<GossipMessage> {
        self.post_authed("/gossip", msg).await
    }

    pub async fn submit_task(&self, req: &TaskRequest) -> anyhow::Result<TaskAcceptance> {
        self.post_authed("/task", req).await
    }

    pub async fn submit_result(&self, result: &TaskResult) -> anyhow::Result<()> {
        let _: Ack = self.post_authed("/result", result).await?;
        Ok(())
    }

    pub async fn task_status(&self, task_id: TaskId) -> anyhow::Result<CheckpointStatus> {
        self.with_deadline(async {
            let resp = self
                .client
                .get(self.url(&format!("/task/{task_id}/status")))
                .bearer_auth(&self.shared_secret)
                .send()
                .await
                .context("GET task status")?;
            self.decode(resp).await
        })
        .await
    }

    pub async fn cancel_task(&self, task_id: TaskId) -> anyhow::Result<()> {
        let _: Ack = self
            .post_authed_no_body(&format!("/task/{task_id}/cancel"))
            .await?;
        Ok(())
    }

    pub async fn submit_rfq(&self, rfq: &Rfq) -> anyhow::Result<()> {
        let _: Ack = self.post_authed("/rfq", rfq).await?;
        Ok(())
    }

    pub async fn submit_bid(&self, bid: &Bid) -> anyhow::Result<()> {
        let _: Ack = self.post_authed("/bid", bid).await?;
        Ok(())
    }

    async fn post_authed<Req: serde::Serialize, Resp: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &Req,
    ) -> anyhow::Result<Resp> {
        self.with_deadline(async {
            let resp = self
                .client
                .post(self.url(path))
                .bearer_auth(&self.shared_secret)
                .json(body)
                .send()
                .await
                .with_context(|| format!("POST {path} on {}", self.base_url))?;
            self.decode(resp).await
        })
        .await
    }

    async fn post_authed_no_body<Resp: serde::de::DeserializeOwned>(&self, path: &str) -> anyhow::Result<Resp> {
        self.with_deadline(async {
            let resp = self
                .client
                .post(self.url(path))
                .bearer_auth(&self.shared_secret)
                .send()
                .await
                .with_context(|| format!("POST {path} on {}", self.base_url))?;
            self.decode(resp).await
        })
        .await
    }

    async fn decode<Resp: serde::de::DeserializeOwned>(&self, resp: reqwest::Response) -> anyhow::Result<Resp> {
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("request failed with {status}: {body}");
        }
        resp.json().await.context("decoding response body")
    }
}
