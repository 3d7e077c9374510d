use dmesh_core::error::{MeshError, MeshResult};
use dmesh_core::events::MeshEvent;
use dmesh_core::types::{ContractId, EscrowAccount, NodeId};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Tracks each node's escrow balance and per-contract reservations. A
/// reservation earmarks funds against a contract without debiting the
/// account until the contract is completed (released) or violated
/// (slashed) — §4.5.
pub struct EscrowManager {
    accounts: RwLock<HashMap<NodeId, EscrowAccount>>,
    reservations: RwLock<HashMap<ContractId, (NodeId, f64)>>,
}

impl EscrowManager {
    pub fn new() -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            reservations: RwLock::new(HashMap::new()),
        }
    }

    pub async fn deposit(&self, node: NodeId, amount: f64) {
        let mut accounts = self.accounts.write().await;
        let acct = accounts.entry(node).or_default();
        acct.total_balance += amount;
    }

    pub async fn balance(&self, node: NodeId) -> EscrowAccount {
        self.accounts.read().await.get(&node).copied().unwrap_or_default()
    }

    /// Reserve `amount` of `node`'s free balance against `contract_id`.
    /// Fails with `InsufficientFunds` if free balance is too low.
    pub async fn reserve(&self, contract_id: ContractId, node: NodeId, amount: f64) -> MeshResult<MeshEvent> {
        let mut accounts = self.accounts.write().await;
        let acct = accounts.entry(node).or_default();
        let before = acct.free_balance();
        if before < amount {
            return Err(MeshError::InsufficientFunds {
                need: amount,
                have: before,
            });
        }
        acct.reserved_balance += amount;
        let after = acct.free_balance();
        self.reservations.write().await.insert(contract_id, (node, amount));

        Ok(MeshEvent::EscrowReserved {
            contract_id,
            node,
            amount,
            balance_before: before,
            balance_after: after,
        })
    }

    /// Release a reservation back to free balance without debiting the
    /// account total — used when a contract completes successfully.
    pub async fn release(&self, contract_id: ContractId) -> MeshResult<MeshEvent> {
        let (node, amount) = self
            .reservations
            .write()
            .await
            .remove(&contract_id)
            .ok_or_else(|| MeshError::NoReservation(contract_id.to_string()))?;

        let mut accounts = self.accounts.write().await;
        let acct = accounts.entry(node).or_default();
        let before = acct.free_balance();
        acct.reserved_balance -= amount;
        let after = acct.free_balance();

        Ok(MeshEvent::EscrowReleased {
            contract_id,
            node,
            amount,
            balance_before: before,
            balance_after: after,
        })
    }

    /// Debit `fraction` of the reserved amount from the node's total
    /// balance (an SLO violation or consensus failure), releasing the
    /// remainder back to free balance.
    pub async fn slash(&self, contract_id: ContractId, fraction: f64, reason: String) -> MeshResult<MeshEvent> {
        let (node, reserved) = self
            .reservations
            .write()
            .await
            .remove(&contract_id)
            .ok_or_else(|| MeshError::NoReservation(contract_id.to_string()))?;

        let slashed_amount = reserved * fraction.clamp(0.0, 1.0);
        let mut accounts = self.accounts.write().await;
        let acct = accounts.entry(node).or_default();
        let before = acct.free_balance();
        acct.reserved_balance -= reserved;
        acct.total_balance -= slashed_amount;
        let after = acct.free_balance();

        Ok(MeshEvent::EscrowSlashed {
            contract_id,
            node,
            amount: slashed_amount,
            reason,
            balance_before: before,
            balance_after: after,
        })
    }
}

impl Default for EscrowManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reserve_fails_without_sufficient_balance() {
        let mgr = EscrowManager::new();
        let node = NodeId::new();
        let contract = ContractId::new();
        let err = mgr.reserve(contract, node, 10.0).await.unwrap_err();
        assert!(matches!(err, MeshError::InsufficientFunds { .. }));
    }

    #[tokio::test]
    async fn reserve_then_release_restores_free_balance() {
        let mgr = EscrowManager::new();
        let node = NodeId::new();
        let contract = ContractId::new();
        mgr.deposit(node, 100.0).await;

        mgr.reserve(contract, node, 40.0).await.unwrap();
        assert_eq!(mgr.balance(node).await.free_balance(), 60.0);

        mgr.release(contract).await.unwrap();
        let bal = mgr.balance(node).await;
        assert_eq!(bal.free_balance(), 100.0);
        assert_eq!(bal.total_balance, 100.0);
    }

    #[tokio::test]
    async fn slash_debits_total_by_fraction_and_releases_remainder() {
        let mgr = EscrowManager::new();
        let node = NodeId::new();
        let contract = ContractId::new();
        mgr.deposit(node, 100.0).await;
        mgr.reserve(contract, node, 40.0).await.unwrap();

        mgr.slash(contract, 0.5, "SLO_VIOLATED".into()).await.unwrap();
        let bal = mgr.balance(node).await;
        assert_eq!(bal.total_balance, 80.0);
        assert_eq!(bal.reserved_balance, 0.0);
        assert_eq!(bal.free_balance(), 80.0);
    }
}
