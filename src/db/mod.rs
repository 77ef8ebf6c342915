use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use tracing::instrument;
use uuid::Uuid;

use crate::models::job::{BulkJob, JobUpdate, NewResult, ResultRecord};
use crate::services::store::{JobStore, StoreError};

pub mod activity;
pub mod ledger;
pub mod queries;

/// Initialize PostgreSQL connection pool
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .min_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}

/// PostgreSQL-backed job store.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    #[instrument(skip(self, job), fields(job_id = %job.id))]
    async fn create_job(&self, job: &BulkJob) -> Result<(), StoreError> {
        queries::create_job(&self.pool, job).await
    }

    #[instrument(skip(self, update), fields(status = ?update.status))]
    async fn update_job(&self, id: Uuid, update: &JobUpdate) -> Result<bool, StoreError> {
        queries::update_job(&self.pool, id, update).await
    }

    #[instrument(skip(self))]
    async fn find_job(
        &self,
        id: Uuid,
        organization_id: &str,
    ) -> Result<Option<BulkJob>, StoreError> {
        queries::get_job(&self.pool, id, organization_id).await
    }

    #[instrument(skip(self, result), fields(job_id = %result.job_id))]
    async fn insert_result(&self, result: &NewResult) -> Result<(), StoreError> {
        queries::insert_result(&self.pool, result).await
    }

    #[instrument(skip(self))]
    async fn list_results(
        &self,
        job_id: Uuid,
        organization_id: &str,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<ResultRecord>, StoreError> {
        queries::list_results(&self.pool, job_id, organization_id, offset, limit).await
    }

    #[instrument(skip(self))]
    async fn count_results(&self, job_id: Uuid, organization_id: &str) -> Result<i64, StoreError> {
        queries::count_results(&self.pool, job_id, organization_id).await
    }
}
