use bulk_verify::{
    app_state::AppState,
    config::AppConfig,
    db,
    services::{
        oracle::HttpVerificationClient,
        orchestrator::{JobOutcome, Settlement},
        queue::{JobQueue, QueueError},
    },
};
use std::time::Duration;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting bulk verification worker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");
    let poll_interval = Duration::from_millis(config.worker_poll_interval_ms);

    // Initialize database
    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Initialize services
    tracing::info!("Initializing services");
    let queue = JobQueue::new(&config.redis_url).expect("Failed to initialize job queue");

    if config.requeue_stranded_on_start {
        match queue.requeue_stranded().await {
            Ok(0) => {}
            Ok(count) => tracing::warn!(count, "Requeued payloads left by a previous run"),
            Err(e) => tracing::error!(error = %e, "Failed to requeue stranded payloads"),
        }
    }

    let oracle = HttpVerificationClient::new(
        &config.verifier_url,
        config.verifier_api_key.clone(),
        config.verifier_timeout(),
    )
    .expect("Failed to initialize verification client");

    let state = AppState::new(db_pool, queue, oracle, config.orchestrator_settings());

    tracing::info!(
        batch_size = config.batch_size,
        "Worker ready, starting job processing loop"
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    // Main processing loop. A job in hand is always settled before the
    // shutdown signal is observed.
    loop {
        let idle = match process_next_job(&state).await {
            Ok(true) => {
                tracing::debug!("Job processed, checking for next job");
                false
            }
            Ok(false) => {
                tracing::trace!("No jobs available, sleeping");
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "Error dequeuing job, will retry");
                true
            }
        };

        let pause = if idle { poll_interval } else { Duration::ZERO };
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Shutdown signal received, worker stopping");
                break;
            }
            _ = sleep(pause) => {}
        }
    }
}

/// Process the next job from the queue.
/// Returns Ok(true) if a job was processed, Ok(false) if no job available.
async fn process_next_job(state: &AppState) -> Result<bool, QueueError> {
    let job = match state.queue.dequeue().await? {
        Some(j) => j,
        None => return Ok(false),
    };

    tracing::info!(
        job_id = %job.job_id,
        organization_id = %job.organization_id,
        email_count = job.emails.len(),
        "Processing bulk verification job"
    );

    let outcome = match state.verifier.settle_job(&job).await {
        Settlement::Finished(outcome) => outcome,
        Settlement::Requeued { attempt, error } => {
            tracing::warn!(
                job_id = %job.job_id,
                attempt,
                error = %error,
                "Failed to record job outcome, requeued"
            );
            state.queue.complete(&job).await?;
            return Ok(true);
        }
        Settlement::Retained(error) => {
            // The payload stays on the processing list for the startup sweep.
            tracing::error!(
                job_id = %job.job_id,
                error = %error,
                "Failed to settle or requeue job"
            );
            return Ok(true);
        }
    };

    match outcome {
        JobOutcome::Completed(stats) => {
            tracing::info!(
                job_id = %job.job_id,
                total = stats.total,
                average_score = stats.average_score,
                "Job completed successfully"
            );
        }
        JobOutcome::Failed(error) => {
            tracing::warn!(job_id = %job.job_id, error = %error, "Job failed during processing");
        }
        JobOutcome::BillingFailed(error) => {
            tracing::error!(
                job_id = %job.job_id,
                error = %error,
                "Job billing needs manual reconciliation"
            );
        }
        JobOutcome::Skipped => {
            tracing::warn!(job_id = %job.job_id, "Job was not pending, dropped from queue");
        }
    }

    state.queue.complete(&job).await?;

    Ok(true)
}
