use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Remaining balance for an organization.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreditBalance {
    pub remaining: i64,
}

impl CreditBalance {
    pub fn covers(&self, quantity: i64) -> bool {
        self.remaining >= quantity
    }
}

/// Outcome of a deduction attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeductOutcome {
    pub success: bool,
    pub remaining: Option<i64>,
    pub error: Option<String>,
}

impl DeductOutcome {
    pub fn charged(remaining: i64) -> Self {
        Self {
            success: true,
            remaining: Some(remaining),
            error: None,
        }
    }

    pub fn refused(error: impl Into<String>) -> Self {
        Self {
            success: false,
            remaining: None,
            error: Some(error.into()),
        }
    }
}

/// Idempotency key under which a job is charged.
pub fn job_charge_key(job_id: Uuid) -> String {
    format!("bulk-job:{}", job_id)
}
