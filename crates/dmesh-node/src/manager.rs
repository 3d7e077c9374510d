use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use dmesh_auction::AuctionGuard;
use dmesh_contracts::{load_contracts, save_contracts, ContractStore};
use dmesh_core::error::{MeshError, MeshResult};
use dmesh_core::events::MeshEvent;
use dmesh_core::types::{
    Bid, BehavioralObservation, BehavioralObservationType, BehavioralScore, CheckpointStatus,
    ContractId, ContractStatus, DelegationContract, DelegationTarget, DelegationTracker,
    Monitoring, NodeId, NodeIdentity, PeerRecord, PeerState, PermissionBoundary, PublicKeyBytes,
    Rfq, RfqId, Slo, TaskConstraints, TaskId, TaskRequest, TaskResult,
};
use dmesh_credentials::{verify_credential, VerificationPolicy};
use dmesh_crypto::KeyPair;
use dmesh_escrow::EscrowManager;
use dmesh_gossip::{GossipMessage, GossipService};
use dmesh_membership::{spawn_heartbeat_ticker, spawn_sweeper, MembershipConfig, PeerTable};
use dmesh_reputation::{BehavioralScorer, ReputationStore, SabotageDetector};
use dmesh_routing::{DelegateeRouter, RoutingDecision, TaskAnalyzer, TaskDecomposer};
use dmesh_transport::handler::MeshHandler;
use dmesh_transport::types::{HeartbeatRequest, HeartbeatResponse, JoinRequest, LeaveRequest, TaskAcceptance};
use dmesh_transport::MeshClient;
use dmesh_verify::{
    CognitiveFrictionEngine, ConsensusVerifier, FrictionConfig, FrictionDecision, FrictionInputs,
    LiabilityFirebreak, OutcomeVerifier, RedelegationConfig, RedelegationMonitor,
};

use crate::config::MeshConfig;

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}

fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

/// What `delegateTask` hands back to its caller (§4.18). Mirrors
/// `TaskAcceptance` with a `task_id` attached, since the caller needs it
/// to poll status or cancel.
#[derive(Clone, Debug)]
pub struct DelegateOutcome {
    pub accepted: bool,
    pub task_id: Option<TaskId>,
    pub reason: Option<String>,
}

/// A lightweight handle for reaching other peers over the wire, returned
/// by `getTransport()` rather than exposing `MeshClient` construction
/// details to callers.
#[derive(Clone)]
pub struct TransportHandle {
    shared_secret: String,
    deadline_ms: u64,
}

impl TransportHandle {
    pub fn client(&self, base_url: impl Into<String>) -> MeshClient {
        MeshClient::new(base_url, self.shared_secret.clone()).with_deadline_ms(self.deadline_ms)
    }
}

/// The composing root of a mesh node (§4.18): every component crate
/// wired together behind one set of locks, implementing the wire handler
/// peers talk to and the local API an operator or originator drives.
pub struct MeshManager {
    identity: NodeIdentity,
    keypair: KeyPair,
    shared_secret: String,
    request_deadline_ms: u64,
    min_endorsements: usize,
    slash_fraction: f64,
    consensus_failure_slash_fraction: f64,
    membership_cfg: MembershipConfig,
    gossip_interval_ms: u64,
    redelegation_cfg: RedelegationConfig,
    friction_cfg: FrictionConfig,
    contracts_path: PathBuf,

    peers: Arc<PeerTable>,
    gossip: GossipService,
    contracts: ContractStore,
    escrow: EscrowManager,
    reputation: ReputationStore,
    behavioral: BehavioralScorer,
    sabotage: SabotageDetector,
    decomposer: TaskDecomposer,
    router: DelegateeRouter,
    auction: AuctionGuard,
    consensus: ConsensusVerifier,
    firebreak: LiabilityFirebreak,
    friction: CognitiveFrictionEngine,
    redelegation: RedelegationMonitor,

    checkpoints: RwLock<HashMap<TaskId, CheckpointStatus>>,
    open_rfqs: RwLock<HashMap<RfqId, Rfq>>,
    events_tx: mpsc::UnboundedSender<MeshEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<MeshEvent>>>,
}

impl MeshManager {
    pub fn new(cfg: &MeshConfig, identity: NodeIdentity, keypair: KeyPair, contracts_path: PathBuf) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let self_id = identity.id;
        Self {
            identity,
            keypair,
            shared_secret: cfg.shared_secret.clone(),
            request_deadline_ms: cfg.request_deadline_ms,
            min_endorsements: cfg.min_endorsements,
            slash_fraction: cfg.slash_fraction,
            consensus_failure_slash_fraction: cfg.consensus_failure_slash_fraction,
            membership_cfg: cfg.membership_config(),
            gossip_interval_ms: cfg.gossip_interval_ms,
            redelegation_cfg: cfg.redelegation_config(),
            friction_cfg: cfg.friction_config(),
            contracts_path,

            peers: Arc::new(PeerTable::new(self_id)),
            gossip: GossipService::new(cfg.gossip_config()),
            contracts: ContractStore::new(),
            escrow: EscrowManager::new(),
            reputation: ReputationStore::new(cfg.reputation_half_life_secs),
            behavioral: BehavioralScorer::new(),
            sabotage: SabotageDetector::new(cfg.sabotage_burst_window_ms),
            decomposer: TaskDecomposer {
                max_recursion_depth: cfg.max_recursion_depth,
                max_proposals: cfg.max_proposals,
            },
            router: DelegateeRouter { score_floor: cfg.router_score_floor },
            auction: AuctionGuard::new(cfg.auction_config()),
            consensus: ConsensusVerifier::new(cfg.consensus_config()),
            firebreak: LiabilityFirebreak { base_depth: cfg.firebreak_base_depth },
            friction: CognitiveFrictionEngine::new(cfg.friction_config()),
            redelegation: RedelegationMonitor::new(cfg.redelegation_config()),

            checkpoints: RwLock::new(HashMap::new()),
            open_rfqs: RwLock::new(HashMap::new()),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        }
    }

    fn emit_event(&self, event: MeshEvent) {
        let _ = self.events_tx.send(event);
    }

    fn client_for(&self, base_url: &str) -> MeshClient {
        MeshClient::new(base_url.to_string(), self.shared_secret.clone()).with_deadline_ms(self.request_deadline_ms)
    }

    pub fn keypair(&self) -> &KeyPair {
        &self.keypair
    }

    pub async fn fund_self(&self, amount: f64) {
        self.escrow.deposit(self.peers.self_id(), amount).await;
    }

    pub async fn load_persisted_contracts(&self) -> MeshResult<()> {
        let contracts = load_contracts(&self.contracts_path).await?;
        self.contracts.load_all(contracts).await;
        Ok(())
    }

    pub async fn persist_contracts(&self) -> MeshResult<()> {
        let snapshot = self.contracts.snapshot().await;
        save_contracts(&self.contracts_path, &snapshot).await
    }

    /// Spawns every background loop this node needs: membership sweeps,
    /// heartbeats, gossip rounds, re-delegation health checks, the
    /// friction digest timer, and the local event log. Takes `Arc<Self>`
    /// so spawned tasks can outlive the caller's stack frame.
    pub async fn start(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        if let Some(mut rx) = self.events_rx.lock().await.take() {
            handles.push(tokio::spawn(async move {
                while let Some(ev) = rx.recv().await {
                    tracing::info!(event = %ev.name(), ?ev, "mesh event");
                }
            }));
        }

        handles.push(spawn_sweeper(Arc::clone(&self.peers), self.membership_cfg.clone(), self.events_tx.clone()));

        let (tick_tx, mut tick_rx) = mpsc::unbounded_channel();
        handles.push(spawn_heartbeat_ticker(self.membership_cfg.heartbeat_interval_ms, tick_tx));
        {
            let mgr = Arc::clone(&self);
            handles.push(tokio::spawn(async move {
                while tick_rx.recv().await.is_some() {
                    mgr.send_heartbeats().await;
                }
            }));
        }

        {
            let mgr = Arc::clone(&self);
            let interval_ms = self.gossip_interval_ms;
            handles.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(std::time::Duration::from_millis(interval_ms));
                loop {
                    interval.tick().await;
                    mgr.gossip_round().await;
                }
            }));
        }

        {
            let mgr = Arc::clone(&self);
            let interval_ms = self.redelegation_cfg.cooldown_ms.max(1_000);
            handles.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(std::time::Duration::from_millis(interval_ms));
                loop {
                    interval.tick().await;
                    mgr.redelegation_health_tick().await;
                }
            }));
        }

        {
            let mgr = Arc::clone(&self);
            let interval_ms = self.friction_cfg.digest_interval_ms;
            handles.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(std::time::Duration::from_millis(interval_ms));
                loop {
                    interval.tick().await;
                    mgr.drain_friction_digest().await;
                }
            }));
        }

        handles
    }

    async fn send_heartbeats(&self) {
        let self_id = self.peers.self_id();
        for peer in self.peers.alive_peers().await {
            let client = self.client_for(&peer.identity.base_url);
            let req = HeartbeatRequest { from_id: self_id, timestamp: now_secs(), peers: Vec::new() };
            let sent_at = now_ms();
            if let Ok(resp) = client.heartbeat(&req).await {
                let latency = now_ms().saturating_sub(sent_at) as f64;
                if let Some(ev) = self.peers.record_heartbeat(peer.identity.id, now_ms(), latency).await {
                    self.emit_event(ev);
                }
                for identity in resp.peers {
                    if let Some(ev) = self.peers.handle_join(identity, now_ms()).await {
                        self.emit_event(ev);
                    }
                }
            }
        }
    }

    async fn gossip_round(&self) {
        let (targets, msg) = self.gossip.round(&self.peers, self.identity.clone()).await;
        for target in targets {
            let client = self.client_for(&target.identity.base_url);
            if let Ok(response) = client.gossip(&msg).await {
                for ev in self.gossip.handle_incoming(response, &self.peers, now_ms()).await {
                    self.emit_event(ev);
                }
            }
        }
    }

    async fn redelegation_health_tick(&self) {
        let degraded: Vec<NodeId> = self
            .peers
            .all_peers()
            .await
            .into_iter()
            .filter(|p| p.state != PeerState::Alive)
            .map(|p| p.identity.id)
            .collect();
        for tracker in self.redelegation.health_tick(&degraded, now_ms()).await {
            self.try_redelegate(&tracker.task_id, tracker.peer).await;
        }
    }

    async fn drain_friction_digest(&self) {
        let drained = self.friction.drain_digest().await;
        if !drained.is_empty() {
            tracing::info!(count = drained.len(), "cognitive friction digest ready");
        }
    }

    async fn trusted_issuers(&self) -> HashSet<NodeId> {
        let mut set: HashSet<NodeId> = self.peers.all_peers().await.into_iter().map(|p| p.identity.id).collect();
        set.insert(self.peers.self_id());
        set
    }

    /// Every node id this node currently has a public key for: itself plus
    /// every known peer. Used to resolve endorser keys when verifying
    /// third-party credentials — an endorsement from a node not in this
    /// map cannot be checked and is treated as invalid.
    async fn known_public_keys(&self) -> HashMap<NodeId, PublicKeyBytes> {
        let mut map: HashMap<NodeId, PublicKeyBytes> = self
            .peers
            .all_peers()
            .await
            .into_iter()
            .filter_map(|p| p.identity.public_key.map(|pk| (p.identity.id, pk)))
            .collect();
        if let Some(pk) = self.identity.public_key {
            map.insert(self.identity.id, pk);
        }
        map
    }

    /// Admit `identity` into the membership table, validating any
    /// credentials it carries first (§4.18): issuer signature, expiry,
    /// issuer trust, and every endorsement signature, resolving each
    /// endorser's public key against this node's peer table.
    pub async fn handle_join(&self, identity: NodeIdentity) -> MeshResult<()> {
        if !identity.credentials.is_empty() {
            let trusted = self.trusted_issuers().await;
            let known_keys = self.known_public_keys().await;
            let policy = VerificationPolicy { trusted_issuers: &trusted, min_endorsements: self.min_endorsements };
            let resolve_endorser = |id: &NodeId| known_keys.get(id).copied();
            for cred in &identity.credentials {
                let issuer_pk = if cred.issuer == identity.id {
                    *identity
                        .public_key
                        .as_ref()
                        .ok_or_else(|| MeshError::CredentialInvalid("joining peer has no public key".into()))?
                } else {
                    *known_keys
                        .get(&cred.issuer)
                        .ok_or_else(|| MeshError::CredentialInvalid("issuer public key unknown".into()))?
                };
                verify_credential(cred, &issuer_pk, now_secs(), &policy, resolve_endorser)
                    .map_err(|e| MeshError::CredentialInvalid(e.to_string()))?;
            }
        }
        if let Some(ev) = self.peers.handle_join(identity, now_ms()).await {
            self.emit_event(ev);
        }
        Ok(())
    }

    /// Delegate `text` to `target_node` (or let the router pick one),
    /// running every gate in §4.18's fixed order: decomposer ->
    /// router -> firebreak -> friction -> escrow reserve -> contract
    /// create -> transport send. No side effect from an earlier gate
    /// survives a later gate's failure.
    ///
    /// `at_depth` is the chain depth this delegation would occupy: 0 for a
    /// fresh delegation originated locally, or an inbound contract's
    /// `delegation_depth + 1` when this node is forwarding a task it was
    /// itself delegated.
    pub async fn delegate_task(
        &self,
        target_node: Option<NodeId>,
        text: &str,
        session_id: Uuid,
        constraints: Option<TaskConstraints>,
        at_depth: u32,
    ) -> DelegateOutcome {
        let attrs = TaskAnalyzer::analyze(text);
        let constraints = constraints.unwrap_or_else(|| TaskConstraints {
            max_cost_usd: attrs.estimated_cost_usd,
            max_duration_ms: attrs.estimated_duration_ms,
            max_tokens: attrs.estimated_tokens,
            tool_allowlist: Vec::new(),
        });

        // Decomposer: advisory only at this single-hop call. Full fan-out
        // across a decomposition's sub-tasks is the decomposition layer's
        // own concern, not this direct delegation's.
        if self.decomposer.should_delegate(&attrs) {
            tracing::debug!(verifiability = ?self.decomposer.assess_verifiability(&attrs), "task is delegation-worthy");
        }

        let routing = match target_node {
            Some(node_id) => RoutingDecision { target: DelegationTarget::Ai, node_id: Some(node_id) },
            None => {
                let peers = self.peers.alive_peers().await;
                self.router.route(text, &attrs, &peers)
            }
        };

        let node_id = match routing.target {
            DelegationTarget::Human => {
                return DelegateOutcome { accepted: false, task_id: None, reason: Some("requires_human_review".into()) };
            }
            DelegationTarget::Ai => match routing.node_id {
                Some(id) => id,
                None => {
                    return DelegateOutcome { accepted: false, task_id: None, reason: Some("no_eligible_peer".into()) };
                }
            },
        };
        let target_peer = match self.peers.get(&node_id).await {
            Some(p) => p,
            None => return DelegateOutcome { accepted: false, task_id: None, reason: Some("unknown_peer".into()) },
        };

        if let Err(e) = self.firebreak.check(at_depth, attrs.criticality, attrs.reversibility) {
            return DelegateOutcome { accepted: false, task_id: None, reason: Some(e.to_string()) };
        }

        let friction_inputs = FrictionInputs {
            criticality: attrs.criticality,
            reversibility: attrs.reversibility,
            sabotage_flags_against_candidate: 0,
            requester_approval_density: 0.0,
        };
        match self.friction.decide(&friction_inputs, now_ms()).await {
            FrictionDecision::Proceed => {}
            FrictionDecision::RequireConfirmation => {
                tracing::info!(peer = %node_id, "delegation requires human confirmation");
            }
            FrictionDecision::Digest => {
                tracing::info!(peer = %node_id, "delegation queued into friction digest");
            }
        }

        let self_id = self.peers.self_id();
        let contract_id = ContractId::new();
        let task_id = TaskId::new();

        let reserve_event = match self.escrow.reserve(contract_id, self_id, constraints.max_cost_usd).await {
            Ok(ev) => ev,
            Err(e) => return DelegateOutcome { accepted: false, task_id: None, reason: Some(e.to_string()) },
        };
        self.emit_event(reserve_event);

        let contract = DelegationContract {
            contract_id,
            delegator: self_id,
            delegatee: node_id,
            task_id,
            task_text: text.to_string(),
            slo: Slo {
                max_duration_ms: constraints.max_duration_ms,
                max_tokens: constraints.max_tokens,
                max_cost_usd: constraints.max_cost_usd,
                min_quality_score: None,
                required_checkpoints: None,
            },
            permission_boundary: PermissionBoundary {
                tool_allowlist: constraints.tool_allowlist.clone(),
                max_permissions: constraints.tool_allowlist.len() as u32,
            },
            monitoring: Monitoring::default(),
            status: ContractStatus::Active,
            created_at: now_secs(),
            completed_at: None,
            violation_reason: None,
            original_slo: None,
            renegotiation_history: Vec::new(),
            pending_renegotiation: None,
            delegation_depth: at_depth,
        };
        let create_event = self.contracts.create(contract.clone()).await;
        self.emit_event(create_event);

        let req = TaskRequest {
            task_id,
            originator_node_id: self_id,
            task_text: text.to_string(),
            session_id,
            constraints: Some(constraints.clone()),
            contract: Some(contract),
        };

        let client = self.client_for(&target_peer.identity.base_url);
        let acceptance = match client.submit_task(&req).await {
            Ok(a) => a,
            Err(e) => {
                let _ = self.escrow.release(contract_id).await;
                let _ = self.contracts.cancel(contract_id, now_secs()).await;
                return DelegateOutcome {
                    accepted: false,
                    task_id: None,
                    reason: Some(format!("transport error: {e}")),
                };
            }
        };

        if !acceptance.accepted {
            let _ = self.escrow.release(contract_id).await;
            let _ = self.contracts.cancel(contract_id, now_secs()).await;
            return DelegateOutcome { accepted: false, task_id: None, reason: acceptance.reason };
        }

        self.redelegation
            .track(DelegationTracker {
                task_id,
                peer: node_id,
                task_text: text.to_string(),
                session_id,
                constraints,
                redelegation_count: 0,
                excluded_peers: BTreeSet::new(),
                last_redelegated_at_ms: now_ms(),
            })
            .await;

        DelegateOutcome { accepted: true, task_id: Some(task_id), reason: None }
    }

    /// Accept or reject an inbound delegation (§4.18's
    /// `onTaskRequest`): firebreak depth check against the carried
    /// contract, then a local capability match. Acceptance is synchronous;
    /// execution is assumed to happen out of band (this node only tracks
    /// the checkpoint).
    pub async fn on_task_request(&self, req: TaskRequest) -> TaskAcceptance {
        let attrs = TaskAnalyzer::analyze(&req.task_text);
        let depth = req.contract.as_ref().map(|c| c.delegation_depth).unwrap_or(0);
        if let Err(e) = self.firebreak.check(depth, attrs.criticality, attrs.reversibility) {
            return TaskAcceptance { accepted: false, reason: Some(e.to_string()) };
        }

        if !self.identity.has_capabilities(&attrs.required_capabilities) {
            return TaskAcceptance { accepted: false, reason: Some("capability_missing".into()) };
        }

        if let Some(contract) = &req.contract {
            let ev = self.contracts.create(contract.clone()).await;
            self.emit_event(ev);
        }

        self.checkpoints.write().await.insert(
            req.task_id,
            CheckpointStatus {
                progress: 0.0,
                estimated_remaining_ms: req.constraints.as_ref().map(|c| c.max_duration_ms).unwrap_or(0),
                last_activity: now_secs(),
            },
        );

        TaskAcceptance { accepted: true, reason: None }
    }

    /// Settle a completed task against its contract (§4.18's
    /// `onTaskResult`): outcome verdict, contract completion/violation,
    /// escrow release or slash, reputation update, behavioral
    /// observation, and — on violation — an attempted re-delegation.
    pub async fn on_task_result(&self, result: TaskResult) -> MeshResult<()> {
        let contract = self
            .contracts
            .by_task(result.task_id)
            .await
            .into_iter()
            .find(|c| c.status == ContractStatus::Active)
            .ok_or_else(|| MeshError::UnknownContract(result.task_id.to_string()))?;

        let verdict = OutcomeVerifier::verify(&result, &contract.slo);
        let now = now_secs();
        let event = self.contracts.complete(contract.contract_id, &result, now).await?;
        self.emit_event(event.clone());

        match event {
            MeshEvent::ContractCompleted { .. } => {
                let ev = self.escrow.release(contract.contract_id).await?;
                self.emit_event(ev);
                let ev = self.reputation.record_outcome(contract.delegatee, true, now_ms()).await;
                self.emit_event(ev);
                self.redelegation.untrack(&result.task_id).await;
                self.checkpoints.write().await.remove(&result.task_id);
            }
            MeshEvent::ContractViolated { ref reason, .. } => {
                let ev = self.escrow.slash(contract.contract_id, self.slash_fraction, reason.clone()).await?;
                self.emit_event(ev);
                let ev = self.reputation.record_outcome(contract.delegatee, false, now_ms()).await;
                self.emit_event(ev);
                self.checkpoints.write().await.remove(&result.task_id);
                self.try_redelegate(&result.task_id, contract.delegatee).await;
            }
            _ => {}
        }

        let obs_type = if verdict.passed {
            BehavioralObservationType::ProtocolFollowed
        } else {
            BehavioralObservationType::ProtocolViolated
        };
        if let Some(ev) = self
            .behavioral
            .observe(
                contract.delegatee,
                BehavioralObservation { obs_type, timestamp: now, evidence: verdict.failure_reason.clone() },
            )
            .await
        {
            self.emit_event(ev);
        }

        Ok(())
    }

    /// Apply an independently-collected consensus verdict to a contract
    /// (§4.14): the transport layer broadcasts `VERIFY` and collects
    /// peer verdicts; this just applies the agreement rule. Disagreement
    /// forces the contract violated and slashes at the consensus-failure
    /// rate rather than the ordinary SLO-violation rate.
    pub async fn apply_consensus_verdict(
        &self,
        contract_id: ContractId,
        local_verdict: bool,
        peer_verdicts: &[bool],
    ) -> MeshResult<()> {
        if let Err(e) = self.consensus.decide(local_verdict, peer_verdicts) {
            let contract = self.contracts.get(contract_id).await?;
            let ev = self.contracts.mark_violated(contract_id, e.to_string(), now_secs()).await?;
            self.emit_event(ev);
            let ev = self.escrow.slash(contract_id, self.consensus_failure_slash_fraction, e.to_string()).await?;
            self.emit_event(ev);
            let ev = self.reputation.record_outcome(contract.delegatee, false, now_ms()).await;
            self.emit_event(ev);
            return Err(e);
        }
        Ok(())
    }

    async fn try_redelegate(&self, task_id: &TaskId, previous_peer: NodeId) {
        let Some(tracker) = self.redelegation.get(task_id).await else { return };
        if !self.redelegation.is_eligible(&tracker, now_ms()) {
            tracing::info!(
                task_id = %task_id,
                count = tracker.redelegation_count,
                "re-delegation cap reached or cooldown not yet elapsed, leaving task with current peer"
            );
            return;
        }

        let attrs = TaskAnalyzer::analyze(&tracker.task_text);
        let depth = self
            .contracts
            .by_task(*task_id)
            .await
            .into_iter()
            .map(|c| c.delegation_depth)
            .max()
            .unwrap_or(0)
            + 1;
        if let Err(e) = self.firebreak.check(depth, attrs.criticality, attrs.reversibility) {
            tracing::warn!(task_id = %task_id, error = %e, "re-delegation rejected by firebreak");
            return;
        }

        self.emit_event(MeshEvent::RedelegationQueued {
            task_id: *task_id,
            previous_peer,
            attempt: tracker.redelegation_count + 1,
        });

        let candidates: Vec<PeerRecord> = self
            .peers
            .alive_peers()
            .await
            .into_iter()
            .filter(|p| !tracker.excluded_peers.contains(&p.identity.id) && p.identity.id != previous_peer)
            .collect();
        let decision = self.router.route(&tracker.task_text, &attrs, &candidates);
        let Some(new_peer_id) = decision.node_id else { return };
        let Some(new_peer) = self.peers.get(&new_peer_id).await else { return };

        let self_id = self.peers.self_id();
        let contract_id = ContractId::new();
        let reserve_event = match self.escrow.reserve(contract_id, self_id, tracker.constraints.max_cost_usd).await {
            Ok(ev) => ev,
            Err(_) => return,
        };
        self.emit_event(reserve_event);

        let contract = DelegationContract {
            contract_id,
            delegator: self_id,
            delegatee: new_peer_id,
            task_id: *task_id,
            task_text: tracker.task_text.clone(),
            slo: Slo {
                max_duration_ms: tracker.constraints.max_duration_ms,
                max_tokens: tracker.constraints.max_tokens,
                max_cost_usd: tracker.constraints.max_cost_usd,
                min_quality_score: None,
                required_checkpoints: None,
            },
            permission_boundary: PermissionBoundary {
                tool_allowlist: tracker.constraints.tool_allowlist.clone(),
                max_permissions: tracker.constraints.tool_allowlist.len() as u32,
            },
            monitoring: Monitoring::default(),
            status: ContractStatus::Active,
            created_at: now_secs(),
            completed_at: None,
            violation_reason: None,
            original_slo: None,
            renegotiation_history: Vec::new(),
            pending_renegotiation: None,
            delegation_depth: depth,
        };

        let req = TaskRequest {
            task_id: *task_id,
            originator_node_id: self_id,
            task_text: tracker.task_text.clone(),
            session_id: tracker.session_id,
            constraints: Some(tracker.constraints.clone()),
            contract: Some(contract.clone()),
        };

        let client = self.client_for(&new_peer.identity.base_url);
        match client.submit_task(&req).await {
            Ok(acc) if acc.accepted => {
                let ev = self.contracts.create(contract).await;
                self.emit_event(ev);
                self.redelegation.record_redelegation(task_id, new_peer_id, now_ms()).await;
                self.emit_event(MeshEvent::RedelegationIssued {
                    task_id: *task_id,
                    new_peer: new_peer_id,
                    attempt: tracker.redelegation_count + 1,
                });
            }
            _ => {
                let _ = self.escrow.release(contract_id).await;
            }
        }
    }

    /// Idempotent task cancellation (§4.18): cancels every active
    /// contract for `task_id`, releases its escrow, and stops tracking it
    /// for re-delegation.
    pub async fn cancel_task(&self, task_id: TaskId) -> MeshResult<()> {
        for contract in self.contracts.by_task(task_id).await {
            if contract.status == ContractStatus::Active {
                if let Some(ev) = self.contracts.cancel(contract.contract_id, now_secs()).await? {
                    self.emit_event(ev);
                    let _ = self.escrow.release(contract.contract_id).await;
                }
            }
        }
        self.redelegation.untrack(&task_id).await;
        self.checkpoints.write().await.remove(&task_id);
        Ok(())
    }

    pub async fn report_negative(&self, reporter: NodeId, target: NodeId) -> Vec<MeshEvent> {
        let events = self.sabotage.record_negative_report(reporter, target, now_ms()).await;
        for ev in &events {
            self.emit_event(ev.clone());
        }
        events
    }

    /// Positive peer feedback has no direct effect on reputation scoring
    /// (that's `on_task_result`'s job) but is the counterpoint the
    /// disproportionate-negative-reporter heuristic checks for.
    pub async fn report_positive(&self, reporter: NodeId, target: NodeId) -> Vec<MeshEvent> {
        let events = self.sabotage.record_positive_report(reporter, target, now_ms()).await;
        for ev in &events {
            self.emit_event(ev.clone());
        }
        events
    }

    pub async fn detect_front_running(&self, rfq_id: RfqId) -> Vec<MeshEvent> {
        let events = self.auction.detect_front_running(rfq_id).await;
        for ev in &events {
            self.emit_event(ev.clone());
        }
        events
    }

    pub async fn reputation_score(&self, node: NodeId) -> f64 {
        self.reputation.score(node).await
    }

    pub async fn behavioral_score(&self, node: NodeId) -> BehavioralScore {
        self.behavioral.current_score(node).await
    }

    pub async fn get_active_peers(&self) -> Vec<PeerRecord> {
        self.peers.alive_peers().await
    }

    pub fn get_identity(&self) -> NodeIdentity {
        self.identity.clone()
    }

    pub fn get_transport(&self) -> TransportHandle {
        TransportHandle { shared_secret: self.shared_secret.clone(), deadline_ms: self.request_deadline_ms }
    }
}

#[async_trait]
impl MeshHandler for MeshManager {
    fn identity(&self) -> NodeIdentity {
        self.identity.clone()
    }

    async fn heartbeat(&self, req: HeartbeatRequest) -> MeshResult<HeartbeatResponse> {
        if let Some(ev) = self.peers.record_heartbeat(req.from_id, now_ms(), 0.0).await {
            self.emit_event(ev);
        }
        Ok(HeartbeatResponse {
            ok: true,
            peers: self.peers.alive_peers().await.into_iter().map(|p| p.identity).collect(),
        })
    }

    async fn join(&self, req: JoinRequest) -> MeshResult<()> {
        self.handle_join(req.identity).await
    }

    async fn leave(&self, req: LeaveRequest) -> MeshResult<()> {
        self.peers.remove(&req.node_id).await;
        tracing::info!(peer = %req.node_id, reason = %req.reason, "peer left");
        Ok(())
    }

    async fn gossip(&self, msg: GossipMessage) -> MeshResult<GossipMessage> {
        let sender_known_versions = dmesh_gossip::known_versions(&msg);
        for ev in self.gossip.handle_incoming(msg, &self.peers, now_ms()).await {
            self.emit_event(ev);
        }
        Ok(self
            .gossip
            .respond_peers(&self.peers, self.identity.clone(), &sender_known_versions)
            .await)
    }

    async fn task_request(&self, req: TaskRequest) -> TaskAcceptance {
        self.on_task_request(req).await
    }

    async fn task_result(&self, result: TaskResult) -> MeshResult<()> {
        self.on_task_result(result).await
    }

    async fn task_status(&self, task_id: TaskId) -> MeshResult<CheckpointStatus> {
        self.checkpoints
            .read()
            .await
            .get(&task_id)
            .cloned()
            .ok_or_else(|| MeshError::UnknownContract(task_id.to_string()))
    }

    async fn task_cancel(&self, task_id: TaskId) -> MeshResult<()> {
        self.cancel_task(task_id).await
    }

    async fn rfq(&self, rfq: Rfq) -> MeshResult<()> {
        self.open_rfqs.write().await.insert(rfq.rfq_id, rfq);
        Ok(())
    }

    async fn bid(&self, bid: Bid) -> MeshResult<()> {
        let event = match bid {
            Bid::Sealed(sealed) => self.auction.commit(sealed, now_ms()).await?,
            Bid::Revealed(revealed) => self.auction.reveal(revealed).await?,
        };
        self.emit_event(event);
        Ok(())
    }
}
