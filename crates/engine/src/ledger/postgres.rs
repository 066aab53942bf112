use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::{CreditLedger, LedgerEntry, LedgerError, LedgerStatus};

/// Postgres-backed ledger. The balance debit is a single guarded UPDATE,
/// so two concurrent reservations can never both pass the balance check.
#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn entry_exists(&self, operation_id: Uuid) -> Result<bool, LedgerError> {
        let row = sqlx::query("SELECT 1 AS present FROM credit_entries WHERE operation_id = $1")
            .bind(operation_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}

#[async_trait]
impl CreditLedger for PgLedger {
    async fn reserve(
        &self,
        user_id: Uuid,
        amount: i64,
        operation_id: Uuid,
    ) -> Result<(), LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::NonPositiveAmount(amount));
        }

        let mut tx = self.pool.begin().await?;

        let debited = sqlx::query(
            "UPDATE credit_balances
             SET balance = balance - $2, updated_at = NOW()
             WHERE user_id = $1 AND balance >= $2",
        )
        .bind(user_id)
        .bind(amount)
        .execute(&mut *tx)
        .await?;

        if debited.rows_affected() == 0 {
            let available: i64 =
                sqlx::query("SELECT balance FROM credit_balances WHERE user_id = $1")
                    .bind(user_id)
                    .fetch_optional(&mut *tx)
                    .await?
                    .map(|row| row.try_get("balance"))
                    .transpose()?
                    .unwrap_or(0);
            return Err(LedgerError::InsufficientBalance {
                requested: amount,
                available,
                shortfall: amount - available,
            });
        }

        sqlx::query(
            "INSERT INTO credit_entries (operation_id, user_id, amount, status, updated_at)
             VALUES ($1, $2, $3, 'reserved', NOW())",
        )
        .bind(operation_id)
        .bind(user_id)
        .bind(amount)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn commit(&self, operation_id: Uuid) -> Result<(), LedgerError> {
        let updated = sqlx::query(
            "UPDATE credit_entries
             SET status = 'committed', updated_at = NOW()
             WHERE operation_id = $1 AND status = 'reserved'",
        )
        .bind(operation_id)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 && !self.entry_exists(operation_id).await? {
            return Err(LedgerError::UnknownOperation(operation_id));
        }
        Ok(())
    }

    async fn refund(&self, operation_id: Uuid) -> Result<(), LedgerError> {
        let mut tx = self.pool.begin().await?;

        let refunded = sqlx::query(
            "UPDATE credit_entries
             SET status = 'refunded', updated_at = NOW()
             WHERE operation_id = $1 AND status = 'reserved'
             RETURNING user_id, amount",
        )
        .bind(operation_id)
        .fetch_optional(&mut *tx)
        .await?;

        match refunded {
            Some(row) => {
                let user_id: Uuid = row.try_get("user_id")?;
                let amount: i64 = row.try_get("amount")?;
                sqlx::query(
                    "UPDATE credit_balances
                     SET balance = balance + $2, updated_at = NOW()
                     WHERE user_id = $1",
                )
                .bind(user_id)
                .bind(amount)
                .execute(&mut *tx)
                .await?;
                tx.commit().await?;
                Ok(())
            }
            None => {
                tx.rollback().await?;
                if self.entry_exists(operation_id).await? {
                    Ok(())
                } else {
                    Err(LedgerError::UnknownOperation(operation_id))
                }
            }
        }
    }

    async fn balance(&self, user_id: Uuid) -> Result<i64, LedgerError> {
        let row = sqlx::query("SELECT balance FROM credit_balances WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| row.try_get("balance"))
            .transpose()
            .map_err(LedgerError::from)
            .map(|balance| balance.unwrap_or(0))
    }

    async fn entry(&self, operation_id: Uuid) -> Result<Option<LedgerEntry>, LedgerError> {
        let row = sqlx::query(
            "SELECT operation_id, user_id, amount, status, updated_at
             FROM credit_entries
             WHERE operation_id = $1",
        )
        .bind(operation_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            let status_raw: String = row.try_get("status")?;
            let status = LedgerStatus::from_db(&status_raw).ok_or_else(|| {
                LedgerError::InvalidData(format!("unknown ledger status persisted: {status_raw}"))
            })?;
            Ok(LedgerEntry {
                operation_id: row.try_get("operation_id")?,
                user_id: row.try_get("user_id")?,
                amount: row.try_get("amount")?,
                status,
                updated_at: row.try_get("updated_at")?,
            })
        })
        .transpose()
    }
}
