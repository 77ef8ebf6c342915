use sqlx::PgPool;
use std::sync::Arc;

use crate::db::{activity::PgActivityReporter, ledger::PgCreditLedger, PgJobStore};
use crate::services::{
    oracle::HttpVerificationClient,
    orchestrator::{BulkVerifier, OrchestratorSettings},
    queue::JobQueue,
};

/// Shared application state, built once at startup and handed to routes
/// and the worker loop.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub queue: Arc<JobQueue>,
    pub verifier: Arc<BulkVerifier>,
}

impl AppState {
    pub fn new(
        db: PgPool,
        queue: JobQueue,
        oracle: HttpVerificationClient,
        settings: OrchestratorSettings,
    ) -> Self {
        let queue = Arc::new(queue);
        let verifier = BulkVerifier::new(
            Arc::new(PgJobStore::new(db.clone())),
            Arc::new(oracle),
            Arc::new(PgCreditLedger::new(db.clone())),
            Arc::new(PgActivityReporter::new(db.clone())),
            queue.clone(),
            settings,
        );

        Self {
            db,
            queue,
            verifier: Arc::new(verifier),
        }
    }
}
