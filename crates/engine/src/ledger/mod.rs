//! Per-user credit accounting with reserve/commit/refund semantics.
//!
//! Every reservation must reach exactly one terminal state. The dispatcher
//! reserves before issuing a paid call, commits on success, and refunds on
//! final failure; a dangling reservation is an invariant violation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

mod memory;
mod postgres;

pub use memory::MemoryLedger;
pub use postgres::PgLedger;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerStatus {
    Reserved,
    Committed,
    Refunded,
}

impl LedgerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reserved => "reserved",
            Self::Committed => "committed",
            Self::Refunded => "refunded",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "reserved" => Some(Self::Reserved),
            "committed" => Some(Self::Committed),
            "refunded" => Some(Self::Refunded),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::Refunded)
    }
}

#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub operation_id: Uuid,
    pub user_id: Uuid,
    pub amount: i64,
    pub status: LedgerStatus,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance {
        requested: i64,
        available: i64,
        shortfall: i64,
    },
    #[error("reservation amount must be positive, got {0}")]
    NonPositiveAmount(i64),
    #[error("unknown ledger operation {0}")]
    UnknownOperation(Uuid),
    #[error("invalid persisted data: {0}")]
    InvalidData(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Reserve/commit/refund must be linearizable per user: no caller may
/// observe an intermediate balance between the guard check and the debit.
#[async_trait]
pub trait CreditLedger: Send + Sync {
    /// Provisionally debit `amount` from the user's balance. Fails closed
    /// with the shortfall when the balance does not cover the request.
    async fn reserve(
        &self,
        user_id: Uuid,
        amount: i64,
        operation_id: Uuid,
    ) -> Result<(), LedgerError>;

    /// Finalize a reservation. Idempotent: a second call for the same
    /// operation (or a call after refund) is a no-op.
    async fn commit(&self, operation_id: Uuid) -> Result<(), LedgerError>;

    /// Return a reservation to the user's balance. Idempotent like
    /// [`CreditLedger::commit`].
    async fn refund(&self, operation_id: Uuid) -> Result<(), LedgerError>;

    async fn balance(&self, user_id: Uuid) -> Result<i64, LedgerError>;

    async fn entry(&self, operation_id: Uuid) -> Result<Option<LedgerEntry>, LedgerError>;
}
