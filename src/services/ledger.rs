use async_trait::async_trait;

use crate::models::credit::{CreditBalance, DeductOutcome};
use crate::services::store::is_pool_unavailable;

/// Shared per-organization credit balance.
#[async_trait]
pub trait CreditLedger: Send + Sync {
    async fn check_credits(&self, organization_id: &str) -> Result<CreditBalance, LedgerError>;

    /// Charge `quantity` units. Repeating a call with the same
    /// `idempotency_key` must not charge twice.
    async fn deduct_credits(
        &self,
        organization_id: &str,
        quantity: i64,
        idempotency_key: &str,
    ) -> Result<DeductOutcome, LedgerError>;
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("Credit ledger unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        if is_pool_unavailable(&err) {
            LedgerError::Unavailable(err.to_string())
        } else {
            LedgerError::Database(err)
        }
    }
}
