use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{CreditLedger, LedgerEntry, LedgerError, LedgerStatus};

#[derive(Default)]
struct LedgerState {
    balances: HashMap<Uuid, i64>,
    entries: HashMap<Uuid, LedgerEntry>,
}

/// In-process ledger. A single mutex over balances and entries makes every
/// reserve/commit/refund linearizable across users and tasks.
#[derive(Default)]
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit a user's balance directly. Funding comes from the billing
    /// collaborator, which is outside the core; tests and dev setups seed
    /// balances through this.
    pub fn grant(&self, user_id: Uuid, amount: i64) {
        let mut state = self.lock_state();
        *state.balances.entry(user_id).or_insert(0) += amount;
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl CreditLedger for MemoryLedger {
    async fn reserve(
        &self,
        user_id: Uuid,
        amount: i64,
        operation_id: Uuid,
    ) -> Result<(), LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::NonPositiveAmount(amount));
        }

        let mut state = self.lock_state();
        let available = state.balances.get(&user_id).copied().unwrap_or(0);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                requested: amount,
                available,
                shortfall: amount - available,
            });
        }

        state.balances.insert(user_id, available - amount);
        state.entries.insert(
            operation_id,
            LedgerEntry {
                operation_id,
                user_id,
                amount,
                status: LedgerStatus::Reserved,
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn commit(&self, operation_id: Uuid) -> Result<(), LedgerError> {
        let mut state = self.lock_state();
        let entry = state
            .entries
            .get_mut(&operation_id)
            .ok_or(LedgerError::UnknownOperation(operation_id))?;
        if entry.status.is_terminal() {
            return Ok(());
        }
        entry.status = LedgerStatus::Committed;
        entry.updated_at = Utc::now();
        Ok(())
    }

    async fn refund(&self, operation_id: Uuid) -> Result<(), LedgerError> {
        let mut state = self.lock_state();
        let entry = state
            .entries
            .get_mut(&operation_id)
            .ok_or(LedgerError::UnknownOperation(operation_id))?;
        if entry.status.is_terminal() {
            return Ok(());
        }
        entry.status = LedgerStatus::Refunded;
        entry.updated_at = Utc::now();
        let (user_id, amount) = (entry.user_id, entry.amount);
        *state.balances.entry(user_id).or_insert(0) += amount;
        Ok(())
    }

    async fn balance(&self, user_id: Uuid) -> Result<i64, LedgerError> {
        Ok(self.lock_state().balances.get(&user_id).copied().unwrap_or(0))
    }

    async fn entry(&self, operation_id: Uuid) -> Result<Option<LedgerEntry>, LedgerError> {
        Ok(self.lock_state().entries.get(&operation_id).cloned())
    }
}
