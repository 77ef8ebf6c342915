use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::instrument;

use crate::models::credit::{CreditBalance, DeductOutcome};
use crate::services::ledger::{CreditLedger, LedgerError};

/// Credit balances kept in PostgreSQL.
///
/// Deductions are recorded under their idempotency key in the same
/// transaction that decrements the balance, so replaying a key is a no-op.
pub struct PgCreditLedger {
    pool: PgPool,
}

impl PgCreditLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CreditLedger for PgCreditLedger {
    #[instrument(skip(self))]
    async fn check_credits(&self, organization_id: &str) -> Result<CreditBalance, LedgerError> {
        let row = sqlx::query(
            r#"
            SELECT balance
            FROM credit_accounts
            WHERE organization_id = $1
            "#,
        )
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await?;

        let remaining = match row {
            Some(r) => r.try_get("balance")?,
            None => 0,
        };

        Ok(CreditBalance { remaining })
    }

    #[instrument(skip(self))]
    async fn deduct_credits(
        &self,
        organization_id: &str,
        quantity: i64,
        idempotency_key: &str,
    ) -> Result<DeductOutcome, LedgerError> {
        let mut tx = self.pool.begin().await?;

        let recorded = sqlx::query(
            r#"
            INSERT INTO credit_deductions (idempotency_key, organization_id, quantity)
            VALUES ($1, $2, $3)
            ON CONFLICT (idempotency_key) DO NOTHING
            "#,
        )
        .bind(idempotency_key)
        .bind(organization_id)
        .bind(quantity)
        .execute(&mut *tx)
        .await?;

        if recorded.rows_affected() == 0 {
            // Already charged under this key.
            tx.rollback().await?;
            let balance = self.check_credits(organization_id).await?;
            tracing::info!(idempotency_key, "Deduction already recorded");
            return Ok(DeductOutcome::charged(balance.remaining));
        }

        let row = sqlx::query(
            r#"
            UPDATE credit_accounts
            SET balance = balance - $2,
                updated_at = NOW()
            WHERE organization_id = $1
              AND balance >= $2
            RETURNING balance
            "#,
        )
        .bind(organization_id)
        .bind(quantity)
        .fetch_optional(&mut *tx)
        .await?;

        match row {
            Some(r) => {
                let remaining: i64 = r.try_get("balance")?;
                tx.commit().await?;
                Ok(DeductOutcome::charged(remaining))
            }
            None => {
                tx.rollback().await?;
                Ok(DeductOutcome::refused(format!(
                    "insufficient balance to deduct {} credits",
                    quantity
                )))
            }
        }
    }
}
