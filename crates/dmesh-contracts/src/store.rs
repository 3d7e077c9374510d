use dmesh_core::error::{MeshError, MeshResult};
use dmesh_core::events::MeshEvent;
use dmesh_core::types::{
    ContractId, ContractStatus, DelegationContract, RenegotiationOutcome, RenegotiationRecord,
    RenegotiationRequest, TaskId, TaskResult, TaskResultStatus, Timestamp,
};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Owns the lifecycle of every delegation contract this node knows about:
/// creation, SLO-driven completion, renegotiation, and cancellation (§4.10).
/// The `active`/`completed`/`violated`/`cancelled` state machine is
/// enforced here — once a contract leaves `active` it never returns.
pub struct ContractStore {
    contracts: RwLock<HashMap<ContractId, DelegationContract>>,
}

impl Default for ContractStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ContractStore {
    pub fn new() -> Self {
        Self {
            contracts: RwLock::new(HashMap::new()),
        }
    }

    /// Seed the store from persisted state (e.g. at boot), bypassing the
    /// normal `create` event path.
    pub async fn load_all(&self, contracts: Vec<DelegationContract>) {
        let mut guard = self.contracts.write().await;
        for c in contracts {
            guard.insert(c.contract_id, c);
        }
    }

    pub async fn snapshot(&self) -> Vec<DelegationContract> {
        self.contracts.read().await.values().cloned().collect()
    }

    pub async fn create(&self, contract: DelegationContract) -> MeshEvent {
        let event = MeshEvent::ContractCreated {
            contract_id: contract.contract_id,
            delegator: contract.delegator,
            delegatee: contract.delegatee,
            task_id: contract.task_id,
        };
        self.contracts.write().await.insert(contract.contract_id, contract);
        event
    }

    pub async fn get(&self, id: ContractId) -> MeshResult<DelegationContract> {
        self.contracts
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| MeshError::UnknownContract(id.to_string()))
    }

    pub async fn by_task(&self, task_id: TaskId) -> Vec<DelegationContract> {
        self.contracts
            .read()
            .await
            .values()
            .filter(|c| c.task_id == task_id)
            .cloned()
            .collect()
    }

    pub async fn by_status(&self, status: ContractStatus) -> Vec<DelegationContract> {
        self.contracts
            .read()
            .await
            .values()
            .filter(|c| c.status == status)
            .cloned()
            .collect()
    }

    /// Apply the result of execution to a contract, checking SLO
    /// dimensions in a fixed priority order: task status, then duration,
    /// then tokens, then cost. Only the first violation found is
    /// reported; a contract already out of `active` is rejected rather
    /// than silently re-finalized.
    pub async fn complete(
        &self,
        id: ContractId,
        result: &TaskResult,
        now: Timestamp,
    ) -> MeshResult<MeshEvent> {
        let mut contracts = self.contracts.write().await;
        let contract = contracts
            .get_mut(&id)
            .ok_or_else(|| MeshError::UnknownContract(id.to_string()))?;

        if contract.status != ContractStatus::Active {
            return Err(MeshError::ContractNotActive(id.to_string()));
        }

        let violation = if result.status != TaskResultStatus::Completed {
            Some(format!("task {:?}", result.status).to_lowercase())
        } else if result.duration_ms > contract.slo.max_duration_ms {
            Some(format!(
                "Duration {}ms exceeded SLO {}ms",
                result.duration_ms, contract.slo.max_duration_ms
            ))
        } else if result.tokens_used > contract.slo.max_tokens {
            Some(format!(
                "Tokens {} exceeded SLO {}",
                result.tokens_used, contract.slo.max_tokens
            ))
        } else if result.cost_usd > contract.slo.max_cost_usd {
            Some(format!(
                "Cost ${:.4} exceeded SLO ${:.4}",
                result.cost_usd, contract.slo.max_cost_usd
            ))
        } else {
            None
        };

        contract.completed_at = Some(now);
        match violation {
            Some(reason) => {
                contract.status = ContractStatus::Violated;
                contract.violation_reason = Some(reason.clone());
                Ok(MeshEvent::ContractViolated {
                    contract_id: id,
                    reason,
                    at: now,
                })
            }
            None => {
                contract.status = ContractStatus::Completed;
                Ok(MeshEvent::ContractCompleted { contract_id: id, at: now })
            }
        }
    }

    /// Force a contract into `violated` status for a reason decided
    /// outside the normal result path (e.g. a transport deadline or a
    /// failed consensus quorum).
    pub async fn mark_violated(&self, id: ContractId, reason: String, now: Timestamp) -> MeshResult<MeshEvent> {
        let mut contracts = self.contracts.write().await;
        let contract = contracts
            .get_mut(&id)
            .ok_or_else(|| MeshError::UnknownContract(id.to_string()))?;
        if contract.status != ContractStatus::Active {
            return Err(MeshError::ContractNotActive(id.to_string()));
        }
        contract.status = ContractStatus::Violated;
        contract.violation_reason = Some(reason.clone());
        contract.completed_at = Some(now);
        Ok(MeshEvent::ContractViolated { contract_id: id, reason, at: now })
    }

    /// Idempotent: cancelling an already-inactive contract is a no-op
    /// that emits no event (§5's "repeated cancellation ... is a
    /// no-op").
    pub async fn cancel(&self, id: ContractId, now: Timestamp) -> MeshResult<Option<MeshEvent>> {
        let mut contracts = self.contracts.write().await;
        let contract = contracts
            .get_mut(&id)
            .ok_or_else(|| MeshError::UnknownContract(id.to_string()))?;
        if contract.status != ContractStatus::Active {
            return Ok(None);
        }
        contract.status = ContractStatus::Cancelled;
        contract.completed_at = Some(now);
        Ok(Some(MeshEvent::ContractCancelled { contract_id: id, at: now }))
    }

    /// Submit a renegotiation request. Rejected if one is already
    /// pending for this contract (§4.10: "only one pending request
    /// exists at a time").
    pub async fn request_renegotiation(
        &self,
        id: ContractId,
        request: RenegotiationRequest,
    ) -> MeshResult<()> {
        let mut contracts = self.contracts.write().await;
        let contract = contracts
            .get_mut(&id)
            .ok_or_else(|| MeshError::UnknownContract(id.to_string()))?;
        if contract.status != ContractStatus::Active {
            return Err(MeshError::ContractNotActive(id.to_string()));
        }
        if contract.pending_renegotiation.is_some() {
            return Err(MeshError::RenegotiationPending(id.to_string()));
        }
        contract.pending_renegotiation = Some(request);
        Ok(())
    }

    /// Resolve the pending renegotiation request. Accepting merges the
    /// proposed delta into the SLO, saving the pre-delta SLO once in
    /// `original_slo`. Either outcome is recorded in history.
    pub async fn resolve_renegotiation(
        &self,
        id: ContractId,
        accept: bool,
        now: Timestamp,
    ) -> MeshResult<MeshEvent> {
        let mut contracts = self.contracts.write().await;
        let contract = contracts
            .get_mut(&id)
            .ok_or_else(|| MeshError::UnknownContract(id.to_string()))?;
        let request = contract
            .pending_renegotiation
            .take()
            .ok_or_else(|| MeshError::NoPendingRenegotiation(id.to_string()))?;

        if accept {
            if contract.original_slo.is_none() {
                contract.original_slo = Some(contract.slo.clone());
            }
            contract.slo = contract.slo.apply_delta(&request.proposed_slo_delta);
        }

        let outcome = if accept {
            RenegotiationOutcome::Accepted
        } else {
            RenegotiationOutcome::Rejected
        };
        contract.renegotiation_history.push(RenegotiationRecord {
            request,
            outcome,
            decided_at: now,
        });

        Ok(MeshEvent::ContractRenegotiated {
            contract_id: id,
            accepted: accept,
            at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dmesh_core::types::{
        Monitoring, NodeId, PermissionBoundary, Slo, SloDelta, TaskId, TaskResultStatus,
    };
    use uuid::Uuid;

    fn sample_contract() -> DelegationContract {
        DelegationContract {
            contract_id: ContractId::new(),
            delegator: NodeId::new(),
            delegatee: NodeId::new(),
            task_id: TaskId::new(),
            task_text: "summarise README".into(),
            slo: Slo {
                max_duration_ms: 5_000,
                max_tokens: 1_000,
                max_cost_usd: 0.10,
                min_quality_score: None,
                required_checkpoints: None,
            },
            permission_boundary: PermissionBoundary {
                tool_allowlist: vec!["read-file".into()],
                max_permissions: 1,
            },
            monitoring: Monitoring::default(),
            status: ContractStatus::Active,
            created_at: 0,
            completed_at: None,
            violation_reason: None,
            original_slo: None,
            renegotiation_history: Vec::new(),
            pending_renegotiation: None,
            delegation_depth: 0,
        }
    }

    fn result(status: TaskResultStatus, duration_ms: u64, tokens: u64, cost: f64) -> TaskResult {
        TaskResult {
            task_id: TaskId::new(),
            peer_node_id: NodeId::new(),
            peer_session_id: Uuid::new_v4(),
            status,
            findings: Vec::new(),
            tokens_used: tokens,
            cost_usd: cost,
            duration_ms,
        }
    }

    #[tokio::test]
    async fn happy_path_completes_within_slo() {
        let store = ContractStore::new();
        let contract = sample_contract();
        let id = contract.contract_id;
        store.create(contract).await;

        let ev = store
            .complete(id, &result(TaskResultStatus::Completed, 3_000, 600, 0.04), 10)
            .await
            .unwrap();
        assert!(matches!(ev, MeshEvent::ContractCompleted { .. }));
        assert_eq!(store.get(id).await.unwrap().status, ContractStatus::Completed);
    }

    #[tokio::test]
    async fn duration_overage_reports_duration_reason_first() {
        let store = ContractStore::new();
        let contract = sample_contract();
        let id = contract.contract_id;
        store.create(contract).await;

        let ev = store
            .complete(id, &result(TaskResultStatus::Completed, 9_000, 600, 0.04), 10)
            .await
            .unwrap();
        match ev {
            MeshEvent::ContractViolated { reason, .. } => {
                assert!(reason.contains("Duration 9000ms exceeded SLO 5000ms"));
            }
            _ => panic!("expected violation"),
        }
    }

    #[tokio::test]
    async fn non_completed_status_takes_priority_over_budget_overages() {
        let store = ContractStore::new();
        let contract = sample_contract();
        let id = contract.contract_id;
        store.create(contract).await;

        let ev = store
            .complete(id, &result(TaskResultStatus::Failed, 99_000, 99_999, 99.0), 10)
            .await
            .unwrap();
        match ev {
            MeshEvent::ContractViolated { reason, .. } => assert!(reason.contains("failed")),
            _ => panic!("expected violation"),
        }
    }

    #[tokio::test]
    async fn completed_contract_rejects_a_second_completion() {
        let store = ContractStore::new();
        let contract = sample_contract();
        let id = contract.contract_id;
        store.create(contract).await;
        store
            .complete(id, &result(TaskResultStatus::Completed, 100, 10, 0.01), 10)
            .await
            .unwrap();

        let err = store
            .complete(id, &result(TaskResultStatus::Completed, 100, 10, 0.01), 20)
            .await
            .unwrap_err();
        assert!(matches!(err, MeshError::ContractNotActive(_)));
    }

    #[tokio::test]
    async fn repeated_cancel_is_idempotent_no_op() {
        let store = ContractStore::new();
        let contract = sample_contract();
        let id = contract.contract_id;
        store.create(contract).await;

        let first = store.cancel(id, 5).await.unwrap();
        assert!(first.is_some());
        let second = store.cancel(id, 10).await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn concurrent_renegotiation_requests_are_rejected() {
        let store = ContractStore::new();
        let contract = sample_contract();
        let id = contract.contract_id;
        store.create(contract).await;

        let req = RenegotiationRequest {
            request_id: Uuid::new_v4(),
            requested_by: NodeId::new(),
            proposed_slo_delta: SloDelta::default(),
            reason: "need more time".into(),
            requested_at: 0,
        };
        store.request_renegotiation(id, req.clone()).await.unwrap();
        let err = store.request_renegotiation(id, req).await.unwrap_err();
        assert!(matches!(err, MeshError::RenegotiationPending(_)));
    }

    #[tokio::test]
    async fn accepted_renegotiation_merges_delta_and_saves_original_slo() {
        let store = ContractStore::new();
        let contract = sample_contract();
        let id = contract.contract_id;
        store.create(contract).await;

        let req = RenegotiationRequest {
            request_id: Uuid::new_v4(),
            requested_by: NodeId::new(),
            proposed_slo_delta: SloDelta {
                max_duration_ms: Some(5_000),
                ..SloDelta::default()
            },
            reason: "need more time".into(),
            requested_at: 0,
        };
        store.request_renegotiation(id, req).await.unwrap();
        store.resolve_renegotiation(id, true, 10).await.unwrap();

        let updated = store.get(id).await.unwrap();
        assert_eq!(updated.slo.max_duration_ms, 10_000);
        assert_eq!(updated.original_slo.unwrap().max_duration_ms, 5_000);
        assert_eq!(updated.renegotiation_history.len(), 1);
        assert!(updated.pending_renegotiation.is_none());
    }
}
