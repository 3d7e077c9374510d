use dmesh_core::error::{MeshError, MeshResult};
use dmesh_core::types::DelegationContract;
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// Load `contracts.jsonl` (one contract per line). A line that fails to
/// parse is skipped with a warning rather than aborting the whole load —
/// a single truncated write from a prior crash should not lose every
/// other contract (§4.10).
pub async fn load_contracts(path: &Path) -> MeshResult<Vec<DelegationContract>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| MeshError::Storage(format!("reading {}: {e}", path.display())))?;

    let mut contracts = Vec::new();
    for (lineno, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<DelegationContract>(line) {
            Ok(c) => contracts.push(c),
            Err(e) => tracing::warn!(line = lineno + 1, error = %e, "skipping corrupt contract line"),
        }
    }
    Ok(contracts)
}

/// Rewrite the full contract set to `path` via a temp file + atomic
/// rename, so a crash mid-write never leaves a half-written file in
/// place (§6: "latest write wins (rewritten fully on save)").
pub async fn save_contracts(path: &Path, contracts: &[DelegationContract]) -> MeshResult<()> {
    let tmp_path = path.with_extension("jsonl.tmp");
    {
        let mut file = tokio::fs::File::create(&tmp_path)
            .await
            .map_err(|e| MeshError::Storage(format!("creating {}: {e}", tmp_path.display())))?;
        for contract in contracts {
            let line = serde_json::to_string(contract)
                .map_err(|e| MeshError::Serialization(e.to_string()))?;
            file.write_all(line.as_bytes())
                .await
                .map_err(|e| MeshError::Storage(e.to_string()))?;
            file.write_all(b"\n")
                .await
                .map_err(|e| MeshError::Storage(e.to_string()))?;
        }
        file.flush()
            .await
            .map_err(|e| MeshError::Storage(e.to_string()))?;
    }
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| MeshError::Storage(format!("renaming {} -> {}: {e}", tmp_path.display(), path.display())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dmesh_core::types::{ContractId, ContractStatus, Monitoring, NodeId, PermissionBoundary, Slo, TaskId};
    use std::time::{SystemTime, UNIX_EPOCH};

    fn scratch_path(name: &str) -> std::path::PathBuf {
        let nonce = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
        std::env::temp_dir().join(format!("dmesh-contracts-test-{name}-{nonce}.jsonl"))
    }

    fn sample() -> DelegationContract {
        DelegationContract {
            contract_id: ContractId::new(),
            delegator: NodeId::new(),
            delegatee: NodeId::new(),
            task_id: TaskId::new(),
            task_text: "do the thing".into(),
            slo: Slo {
                max_duration_ms: 1_000,
                max_tokens: 100,
                max_cost_usd: 1.0,
                min_quality_score: None,
                required_checkpoints: None,
            },
            permission_boundary: PermissionBoundary {
                tool_allowlist: vec![],
                max_permissions: 0,
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

    #[tokio::test]
    async fn round_trips_through_atomic_save_and_load() {
        let path = scratch_path("roundtrip");
        let contracts = vec![sample(), sample()];
        save_contracts(&path, &contracts).await.unwrap();

        let loaded = load_contracts(&path).await.unwrap();
        assert_eq!(loaded.len(), 2);
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn corrupt_line_is_skipped_not_fatal() {
        let path = scratch_path("corrupt");
        let good = sample();
        let mut content = serde_json::to_string(&good).unwrap();
        content.push('\n');
        content.push_str("{ not valid json\n");
        tokio::fs::write(&path, content).await.unwrap();

        let loaded = load_contracts(&path).await.unwrap();
        assert_eq!(loaded.len(), 1);
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn missing_file_loads_as_empty() {
        let path = scratch_path("missing");
        let loaded = load_contracts(&path).await.unwrap();
        assert!(loaded.is_empty());
    }
}
