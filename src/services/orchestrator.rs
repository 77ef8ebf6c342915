use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::models::activity::{ActivityAction, ActivityEvent, RequestMeta};
use crate::models::credit::job_charge_key;
use crate::models::job::{BulkJob, JobStatus, JobUpdate, NewResult};
use crate::models::stats::JobStats;
use crate::models::verification::{
    EmailVerification, JobResultsResponse, JobStatusResponse, Pagination, VerifyOptions,
};
use crate::services::activity::ActivityReporter;
use crate::services::ledger::{CreditLedger, LedgerError};
use crate::services::oracle::{OracleError, VerificationOracle};
use crate::services::queue::{JobDispatcher, QueueError, QueuedJob};
use crate::services::stats::compute_stats;
use crate::services::store::{JobStore, StoreError};

/// Concurrent oracle calls per batch.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Admission cap on the number of emails in one job.
pub const DEFAULT_MAX_EMAILS_PER_JOB: usize = 50_000;

pub const DEFAULT_PAGE_SIZE: i64 = 100;
pub const MAX_PAGE_SIZE: i64 = 1_000;

/// Prefix of the error recorded when verification succeeded but the charge
/// did not go through. Such jobs need manual reconciliation.
pub const BILLING_FAILED_MESSAGE: &str = "Verification completed but billing failed";

/// Prefix of the error recorded when an accepted job could not be queued.
pub const SCHEDULING_FAILED_MESSAGE: &str = "Job could not be scheduled";

/// Prefix of the error recorded when the job was charged but its completed
/// status could not be written. Such jobs need manual reconciliation.
pub const FINALIZE_FAILED_MESSAGE: &str =
    "Verification completed and billed but the job could not be finalized";

/// Recorded when a redelivered job is found still marked processing.
pub const INTERRUPTED_MESSAGE: &str =
    "Job processing was interrupted before a final status was recorded";

/// Runs of one queued job before it is failed outright.
pub const MAX_DELIVERY_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub batch_size: usize,
    pub max_emails_per_job: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_emails_per_job: DEFAULT_MAX_EMAILS_PER_JOB,
        }
    }
}

/// A submission, already authenticated.
#[derive(Debug, Clone)]
pub struct SubmitJob {
    pub organization_id: String,
    pub user_id: String,
    pub emails: Vec<String>,
    pub name: Option<String>,
    pub options: VerifyOptions,
    pub request: RequestMeta,
}

/// How a single `process_job` run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed(JobStats),
    /// Oracle or store failure while processing batches.
    Failed(String),
    /// Results are stored but billing needs reconciliation: the charge
    /// failed, or it went through and the completed status did not.
    BillingFailed(String),
    /// The job was not pending when the worker picked it up.
    Skipped,
}

/// What the worker does with a queue payload once a delivery is handled.
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    /// The job reached a decision. Drop the payload.
    Finished(JobOutcome),
    /// A store write failed and a new payload with a raised attempt count
    /// was dispatched. Drop the old one.
    Requeued { attempt: u32, error: String },
    /// The job could not be settled or requeued. Keep the payload in the
    /// processing list for recovery.
    Retained(String),
}

/// Admits bulk verification jobs and drives them through their lifecycle.
pub struct BulkVerifier {
    store: Arc<dyn JobStore>,
    oracle: Arc<dyn VerificationOracle>,
    ledger: Arc<dyn CreditLedger>,
    activity: Arc<dyn ActivityReporter>,
    dispatcher: Arc<dyn JobDispatcher>,
    settings: OrchestratorSettings,
}

impl BulkVerifier {
    pub fn new(
        store: Arc<dyn JobStore>,
        oracle: Arc<dyn VerificationOracle>,
        ledger: Arc<dyn CreditLedger>,
        activity: Arc<dyn ActivityReporter>,
        dispatcher: Arc<dyn JobDispatcher>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            store,
            oracle,
            ledger,
            activity,
            dispatcher,
            settings,
        }
    }

    /// Check credits, record a pending job and hand it to the dispatcher.
    ///
    /// No job row exists when this returns an admission or ledger error.
    #[instrument(
        skip_all,
        fields(organization_id = %request.organization_id, email_count = request.emails.len())
    )]
    pub async fn submit_job(&self, request: SubmitJob) -> Result<BulkJob, JobError> {
        let email_count = request.emails.len();
        if email_count == 0 {
            metrics::counter!("bulk_jobs_rejected_total", "reason" => "empty_list").increment(1);
            return Err(JobError::EmptyEmailList);
        }
        if email_count > self.settings.max_emails_per_job {
            metrics::counter!("bulk_jobs_rejected_total", "reason" => "too_many_emails")
                .increment(1);
            return Err(JobError::TooManyEmails {
                submitted: email_count,
                max: self.settings.max_emails_per_job,
            });
        }
        let total_count = i32::try_from(email_count).map_err(|_| JobError::TooManyEmails {
            submitted: email_count,
            max: self.settings.max_emails_per_job,
        })?;

        let required = email_count as i64;
        let balance = self.ledger.check_credits(&request.organization_id).await?;
        if !balance.covers(required) {
            metrics::counter!("bulk_jobs_rejected_total", "reason" => "insufficient_credits")
                .increment(1);
            info!(
                remaining = balance.remaining,
                required, "Rejected bulk job: insufficient credits"
            );
            return Err(JobError::InsufficientCredits {
                remaining: balance.remaining,
                required,
            });
        }

        let job = BulkJob::new_pending(
            &request.organization_id,
            &request.user_id,
            request.name.as_deref(),
            total_count,
        );
        self.store.create_job(&job).await?;

        let details = serde_json::json!({
            "name": job.name,
            "emailCount": email_count,
            "options": request.options,
        });
        let queued = QueuedJob {
            job_id: job.id,
            organization_id: request.organization_id,
            user_id: request.user_id,
            emails: request.emails,
            options: request.options,
            request: request.request,
            attempt: 0,
        };

        if let Err(e) = self.dispatcher.dispatch(&queued).await {
            error!(job_id = %job.id, error = %e, "Failed to schedule bulk job");
            let update = JobUpdate::fail(
                JobStatus::Pending,
                format!("{}: {}", SCHEDULING_FAILED_MESSAGE, e),
                Utc::now(),
            );
            if let Err(store_err) = self.transition(job.id, &update).await {
                error!(job_id = %job.id, error = %store_err, "Failed to mark unscheduled job as failed");
            }
            return Err(JobError::Queue(e));
        }

        metrics::counter!("bulk_jobs_submitted_total").increment(1);
        info!(job_id = %job.id, "Bulk job accepted");

        self.report(&queued, ActivityAction::BulkJobCreated, details)
            .await;

        Ok(job)
    }

    /// Run a queued job to a terminal status.
    ///
    /// Returns `Err` only when the store rejects the claim or the terminal write.
    #[instrument(skip_all, fields(job_id = %job.job_id, email_count = job.emails.len()))]
    pub async fn process_job(&self, job: &QueuedJob) -> Result<JobOutcome, StoreError> {
        let started_at = Utc::now();
        if !self
            .transition(job.job_id, &JobUpdate::start(started_at))
            .await?
        {
            if job.attempt > 0 {
                return self.recover_redelivered(job).await;
            }
            warn!("Job is not pending, skipping");
            return Ok(JobOutcome::Skipped);
        }

        let timer = Instant::now();
        info!("Bulk job processing started");

        let results = match self.run_batches(job).await {
            Ok(results) => results,
            Err(e) => {
                let message = e.to_string();
                error!(error = %message, "Bulk job processing failed");
                self.finish_failed(job, JobStatus::Processing, &message, "processing")
                    .await?;
                return Ok(JobOutcome::Failed(message));
            }
        };

        let stats = compute_stats(&results, started_at, Utc::now());
        let quantity = job.emails.len() as i64;

        if let Err(detail) = self.charge(job, quantity).await {
            let message = format!("{}: {}", BILLING_FAILED_MESSAGE, detail);
            error!(error = %message, "Billing failed after verification");
            self.finish_failed(job, JobStatus::Processing, &message, "billing")
                .await?;
            return Ok(JobOutcome::BillingFailed(message));
        }

        let update = JobUpdate::complete(stats.clone(), stats.timing.completed_at);
        match self.transition(job.job_id, &update).await {
            Ok(true) => {}
            Ok(false) => warn!("Job left processing before it could be completed"),
            Err(e) => {
                let message = format!("{}: {}", FINALIZE_FAILED_MESSAGE, e);
                error!(error = %message, "Charged job could not be marked completed");
                self.finish_failed(job, JobStatus::Processing, &message, "finalize")
                    .await?;
                return Ok(JobOutcome::BillingFailed(message));
            }
        }

        let elapsed = timer.elapsed();
        metrics::counter!("bulk_jobs_completed_total").increment(1);
        metrics::histogram!("bulk_job_duration_seconds").record(elapsed.as_secs_f64());
        info!(
            duration_ms = elapsed.as_millis() as u64,
            deliverable = stats.deliverable,
            undeliverable = stats.undeliverable,
            average_score = stats.average_score,
            "Bulk job completed"
        );

        let details = serde_json::json!({
            "total": stats.total,
            "deliverable": stats.deliverable,
            "undeliverable": stats.undeliverable,
            "risky": stats.risky,
            "unknown": stats.unknown,
            "durationMs": stats.timing.total_duration,
            "creditsCharged": quantity,
        });
        self.report(job, ActivityAction::BulkJobCompleted, details)
            .await;

        Ok(JobOutcome::Completed(stats))
    }

    /// Handle one delivery from the queue.
    ///
    /// A store error leaves the job non-terminal, so the payload is
    /// dispatched again with its attempt count raised. The run that reaches
    /// `MAX_DELIVERY_ATTEMPTS` fails the job instead.
    #[instrument(skip_all, fields(job_id = %job.job_id, attempt = job.attempt))]
    pub async fn settle_job(&self, job: &QueuedJob) -> Settlement {
        let error = match self.process_job(job).await {
            Ok(outcome) => return Settlement::Finished(outcome),
            Err(e) => e,
        };

        let attempt = job.attempt + 1;
        if attempt >= MAX_DELIVERY_ATTEMPTS {
            let message = format!("Processing failed after {} attempts: {}", attempt, error);
            error!(error = %message, "Giving up on job");
            return match self.abandon(job, &message).await {
                Ok(true) => Settlement::Finished(JobOutcome::Failed(message)),
                Ok(false) => Settlement::Finished(JobOutcome::Skipped),
                Err(e) => {
                    error!(error = %e, "Failed to record abandoned job");
                    Settlement::Retained(e.to_string())
                }
            };
        }

        warn!(error = %error, attempt, "Store write failed, requeueing job");
        let retry = QueuedJob {
            attempt,
            ..job.clone()
        };
        match self.dispatcher.dispatch(&retry).await {
            Ok(()) => Settlement::Requeued {
                attempt,
                error: error.to_string(),
            },
            Err(e) => {
                error!(error = %e, "Failed to requeue job");
                Settlement::Retained(e.to_string())
            }
        }
    }

    /// A redelivered job whose claim did not apply. If an earlier run left
    /// it processing, nothing is running it any more.
    async fn recover_redelivered(&self, job: &QueuedJob) -> Result<JobOutcome, StoreError> {
        let current = self
            .store
            .find_job(job.job_id, &job.organization_id)
            .await?;
        if current.map(|j| j.status) != Some(JobStatus::Processing) {
            warn!("Redelivered job is not pending, skipping");
            return Ok(JobOutcome::Skipped);
        }

        warn!(attempt = job.attempt, "Redelivered job was left processing");
        if self
            .finish_failed(job, JobStatus::Processing, INTERRUPTED_MESSAGE, "interrupted")
            .await?
        {
            Ok(JobOutcome::Failed(INTERRUPTED_MESSAGE.to_string()))
        } else {
            Ok(JobOutcome::Skipped)
        }
    }

    /// Fail a job from whichever non-terminal status it is in.
    async fn abandon(&self, job: &QueuedJob, message: &str) -> Result<bool, StoreError> {
        for from in [JobStatus::Pending, JobStatus::Processing] {
            if self.finish_failed(job, from, message, "store").await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Verify every email in fixed-size batches, persisting results and
    /// progress after each batch.
    async fn run_batches(&self, job: &QueuedJob) -> Result<Vec<EmailVerification>, ProcessError> {
        let batch_size = self.settings.batch_size.max(1);
        let mut verified = Vec::with_capacity(job.emails.len());

        for batch in job.emails.chunks(batch_size) {
            let checks = batch
                .iter()
                .map(|email| self.oracle.verify(email, &job.options));
            let outcomes = join_all(checks)
                .await
                .into_iter()
                .collect::<Result<Vec<_>, _>>()?;

            for (email, verification) in batch.iter().zip(outcomes) {
                let row = NewResult {
                    job_id: job.job_id,
                    organization_id: job.organization_id.clone(),
                    user_id: job.user_id.clone(),
                    email: email.clone(),
                    state: verification.state,
                    score: verification.score,
                    reason: verification.reason.clone(),
                    result: serde_json::to_value(&verification)?,
                    created_at: Utc::now(),
                };
                self.store.insert_result(&row).await?;
                verified.push(verification);
            }

            let processed = i32::try_from(verified.len()).unwrap_or(i32::MAX);
            self.store
                .update_job(job.job_id, &JobUpdate::progress(processed))
                .await?;
            metrics::counter!("bulk_emails_verified_total").increment(batch.len() as u64);
            debug!(processed, total = job.emails.len(), "Batch persisted");
        }

        Ok(verified)
    }

    async fn charge(&self, job: &QueuedJob, quantity: i64) -> Result<(), String> {
        let key = job_charge_key(job.job_id);
        match self
            .ledger
            .deduct_credits(&job.organization_id, quantity, &key)
            .await
        {
            Ok(outcome) if outcome.success => {
                debug!(quantity, remaining = ?outcome.remaining, "Credits deducted");
                Ok(())
            }
            Ok(outcome) => Err(outcome
                .error
                .unwrap_or_else(|| "deduction refused".to_string())),
            Err(e) => Err(e.to_string()),
        }
    }

    /// Returns `false` when the job was not in `from`.
    async fn finish_failed(
        &self,
        job: &QueuedJob,
        from: JobStatus,
        message: &str,
        reason: &'static str,
    ) -> Result<bool, StoreError> {
        let update = JobUpdate::fail(from, message, Utc::now());
        if !self.transition(job.job_id, &update).await? {
            return Ok(false);
        }

        metrics::counter!("bulk_jobs_failed_total", "reason" => reason).increment(1);

        let details = serde_json::json!({
            "error": message,
            "reason": reason,
            "emailCount": job.emails.len(),
        });
        self.report(job, ActivityAction::BulkJobFailed, details)
            .await;
        Ok(true)
    }

    /// Status-changing write guarded by the lifecycle state machine.
    async fn transition(&self, job_id: Uuid, update: &JobUpdate) -> Result<bool, StoreError> {
        if let (Some(from), Some(to)) = (update.expected_status, update.status) {
            if !from.can_transition_to(to) {
                warn!(%job_id, %from, %to, "Refusing invalid status transition");
                return Ok(false);
            }
        }
        self.store.update_job(job_id, update).await
    }

    async fn report(&self, job: &QueuedJob, action: ActivityAction, details: serde_json::Value) {
        let event = ActivityEvent {
            organization_id: job.organization_id.clone(),
            user_id: job.user_id.clone(),
            action,
            job_id: job.job_id,
            details,
            request: job.request.clone(),
        };
        if let Err(e) = self.activity.log(&event).await {
            warn!(job_id = %job.job_id, action = %action, error = %e, "Failed to record activity");
        }
    }

    pub async fn get_job_status(
        &self,
        job_id: Uuid,
        organization_id: &str,
    ) -> Result<JobStatusResponse, JobError> {
        let job = self
            .store
            .find_job(job_id, organization_id)
            .await?
            .ok_or(JobError::NotFound)?;
        Ok(JobStatusResponse::from(&job))
    }

    /// One page of results, newest first. Only completed jobs serve results.
    pub async fn get_job_results(
        &self,
        job_id: Uuid,
        organization_id: &str,
        page: i64,
        limit: i64,
    ) -> Result<JobResultsResponse, JobError> {
        if page < 1 {
            return Err(JobError::InvalidPage("page must be at least 1".to_string()));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&limit) {
            return Err(JobError::InvalidPage(format!(
                "limit must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }

        let job = self
            .store
            .find_job(job_id, organization_id)
            .await?
            .ok_or(JobError::NotFound)?;
        if job.status != JobStatus::Completed {
            return Err(JobError::NotCompleted { status: job.status });
        }

        let total = self.store.count_results(job_id, organization_id).await?;
        let pagination = Pagination::new(page, limit, total);
        let results = self
            .store
            .list_results(job_id, organization_id, pagination.offset(), limit)
            .await?;

        Ok(JobResultsResponse {
            job_id,
            results,
            stats: job.stats,
            pagination,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Email list must not be empty")]
    EmptyEmailList,

    #[error("Too many emails: {submitted} submitted, at most {max} allowed per job")]
    TooManyEmails { submitted: usize, max: usize },

    #[error("Insufficient credits: {remaining} remaining, {required} required")]
    InsufficientCredits { remaining: i64, required: i64 },

    #[error("Job not found")]
    NotFound,

    #[error("Job is {status}; results are only available once the job is completed")]
    NotCompleted { status: JobStatus },

    #[error("Invalid pagination: {0}")]
    InvalidPage(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Failure inside the batch loop.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Verification failed: {0}")]
    Oracle(#[from] OracleError),

    #[error("Failed to persist progress: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to encode verification result: {0}")]
    Encode(#[from] serde_json::Error),
}
