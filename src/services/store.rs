use async_trait::async_trait;
use uuid::Uuid;

use crate::models::job::{BulkJob, JobUpdate, NewResult, ResultRecord};

/// Durable storage for jobs and their per-email results.
///
/// Reads are scoped by organization: a job owned by another organization
/// is reported exactly like a missing one.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_job(&self, job: &BulkJob) -> Result<(), StoreError>;

    /// Apply a partial update. Returns `false` when no row matched (unknown
    /// id, or `expected_status` did not hold).
    async fn update_job(&self, id: Uuid, update: &JobUpdate) -> Result<bool, StoreError>;

    async fn find_job(&self, id: Uuid, organization_id: &str)
        -> Result<Option<BulkJob>, StoreError>;

    async fn insert_result(&self, result: &NewResult) -> Result<(), StoreError>;

    /// Newest first.
    async fn list_results(
        &self,
        job_id: Uuid,
        organization_id: &str,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<ResultRecord>, StoreError>;

    async fn count_results(&self, job_id: Uuid, organization_id: &str) -> Result<i64, StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("Stored row could not be decoded: {0}")]
    Decode(String),

    #[error("Job store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if is_pool_unavailable(&err) {
            StoreError::Unavailable(err.to_string())
        } else {
            StoreError::Database(err)
        }
    }
}

/// Pool exhaustion or shutdown, as opposed to a failed statement.
pub(crate) fn is_pool_unavailable(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
    )
}
