//! In-memory collaborators for driving the orchestrator without Postgres,
//! Redis or the verification service.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use bulk_verify::models::activity::{ActivityAction, ActivityEvent};
use bulk_verify::models::credit::{CreditBalance, DeductOutcome};
use bulk_verify::models::job::{BulkJob, JobStatus, JobUpdate, NewResult, ResultRecord};
use bulk_verify::models::verification::{
    DeliveryState, EmailVerification, VerificationChecks, VerifyOptions,
};
use bulk_verify::services::activity::{ActivityError, ActivityReporter};
use bulk_verify::services::ledger::{CreditLedger, LedgerError};
use bulk_verify::services::oracle::{OracleError, VerificationOracle};
use bulk_verify::services::orchestrator::{
    BulkVerifier, JobOutcome, OrchestratorSettings, Settlement, SubmitJob,
};
use bulk_verify::services::queue::{JobDispatcher, QueueError, QueuedJob};
use bulk_verify::services::store::{JobStore, StoreError};

pub const ORG: &str = "org_acme";
pub const USER: &str = "user_1";

// ---------------------------------------------------------------------------
// Job store
// ---------------------------------------------------------------------------

struct StoredResult {
    seq: u64,
    job_id: Uuid,
    organization_id: String,
    record: ResultRecord,
}

#[derive(Default)]
struct StoreState {
    jobs: HashMap<Uuid, BulkJob>,
    results: Vec<StoredResult>,
    updates: Vec<(Uuid, JobUpdate)>,
    next_seq: u64,
}

/// Job store that mirrors the Postgres semantics: conditional status
/// writes, monotonic progress and organization-scoped reads.
#[derive(Default)]
pub struct MemoryJobStore {
    state: Mutex<StoreState>,
    fail_result_inserts: AtomicBool,
    failing_statuses: Mutex<Vec<JobStatus>>,
}

impl MemoryJobStore {
    pub fn fail_result_inserts(&self) {
        self.fail_result_inserts.store(true, Ordering::SeqCst);
    }

    /// Writes moving a job into any of `statuses` error out until `heal`.
    pub fn fail_status_writes(&self, statuses: &[JobStatus]) {
        self.failing_statuses.lock().unwrap().extend_from_slice(statuses);
    }

    pub fn heal(&self) {
        self.failing_statuses.lock().unwrap().clear();
        self.fail_result_inserts.store(false, Ordering::SeqCst);
    }

    pub fn job(&self, id: Uuid) -> Option<BulkJob> {
        self.state.lock().unwrap().jobs.get(&id).cloned()
    }

    pub fn jobs(&self) -> Vec<BulkJob> {
        self.state.lock().unwrap().jobs.values().cloned().collect()
    }

    pub fn insert_job(&self, job: BulkJob) {
        self.state.lock().unwrap().jobs.insert(job.id, job);
    }

    pub fn result_emails(&self, job_id: Uuid) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .results
            .iter()
            .filter(|r| r.job_id == job_id)
            .map(|r| r.record.email.clone())
            .collect()
    }

    /// Every `processed_count` written for a job, in write order.
    pub fn progress_history(&self, job_id: Uuid) -> Vec<i32> {
        self.state
            .lock()
            .unwrap()
            .updates
            .iter()
            .filter(|(id, u)| *id == job_id && u.status.is_none())
            .filter_map(|(_, u)| u.processed_count)
            .collect()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create_job(&self, job: &BulkJob) -> Result<(), StoreError> {
        self.state.lock().unwrap().jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn update_job(&self, id: Uuid, update: &JobUpdate) -> Result<bool, StoreError> {
        if let Some(status) = update.status {
            if self.failing_statuses.lock().unwrap().contains(&status) {
                return Err(StoreError::Unavailable("connection pool timed out".to_string()));
            }
        }
        let mut state = self.state.lock().unwrap();
        let Some(job) = state.jobs.get_mut(&id) else {
            return Ok(false);
        };
        if let Some(expected) = update.expected_status {
            if job.status != expected {
                return Ok(false);
            }
        }

        if let Some(status) = update.status {
            job.status = status;
        }
        if let Some(processed) = update.processed_count {
            job.processed_count = job.processed_count.max(processed);
        }
        if let Some(stats) = &update.stats {
            job.stats = Some(stats.clone());
        }
        if let Some(message) = &update.error_message {
            job.error_message = Some(message.clone());
        }
        if let Some(at) = update.started_at {
            job.started_at = Some(at);
        }
        if let Some(at) = update.completed_at {
            job.completed_at = Some(at);
        }
        state.updates.push((id, update.clone()));
        Ok(true)
    }

    async fn find_job(
        &self,
        id: Uuid,
        organization_id: &str,
    ) -> Result<Option<BulkJob>, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .jobs
            .get(&id)
            .filter(|job| job.organization_id == organization_id)
            .cloned())
    }

    async fn insert_result(&self, result: &NewResult) -> Result<(), StoreError> {
        if self.fail_result_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("result table offline".to_string()));
        }
        let mut state = self.state.lock().unwrap();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.results.push(StoredResult {
            seq,
            job_id: result.job_id,
            organization_id: result.organization_id.clone(),
            record: ResultRecord {
                id: Uuid::new_v4(),
                email: result.email.clone(),
                state: result.state,
                score: result.score,
                reason: result.reason.clone(),
                result: result.result.clone(),
                created_at: result.created_at,
            },
        });
        Ok(())
    }

    async fn list_results(
        &self,
        job_id: Uuid,
        organization_id: &str,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<ResultRecord>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut rows: Vec<&StoredResult> = state
            .results
            .iter()
            .filter(|r| r.job_id == job_id && r.organization_id == organization_id)
            .collect();
        rows.sort_by(|a, b| {
            b.record
                .created_at
                .cmp(&a.record.created_at)
                .then(b.seq.cmp(&a.seq))
        });
        Ok(rows
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .map(|r| r.record.clone())
            .collect())
    }

    async fn count_results(&self, job_id: Uuid, organization_id: &str) -> Result<i64, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .results
            .iter()
            .filter(|r| r.job_id == job_id && r.organization_id == organization_id)
            .count() as i64)
    }
}

// ---------------------------------------------------------------------------
// Verification oracle
// ---------------------------------------------------------------------------

/// Oracle with per-address verdicts. Unscripted addresses come back
/// deliverable with a score of 95.
#[derive(Default)]
pub struct ScriptedOracle {
    verdicts: Mutex<HashMap<String, EmailVerification>>,
    failing: Mutex<HashSet<String>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedOracle {
    pub fn script(&self, verification: EmailVerification) {
        self.verdicts
            .lock()
            .unwrap()
            .insert(verification.email.clone(), verification);
    }

    pub fn fail_on(&self, email: &str) {
        self.failing.lock().unwrap().insert(email.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Largest number of verifications observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VerificationOracle for ScriptedOracle {
    async fn verify(
        &self,
        email: &str,
        _options: &VerifyOptions,
    ) -> Result<EmailVerification, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.lock().unwrap().contains(email) {
            return Err(OracleError::Unavailable(format!(
                "verification service timed out for {}",
                email
            )));
        }
        Ok(self
            .verdicts
            .lock()
            .unwrap()
            .get(email)
            .cloned()
            .unwrap_or_else(|| verdict(email, DeliveryState::Deliverable, 95)))
    }
}

/// A verification with all checks passing except what the caller flips.
pub fn verdict(email: &str, state: DeliveryState, score: i32) -> EmailVerification {
    let mut checks = VerificationChecks::default();
    checks.syntax.valid = true;
    checks.dns.valid = true;
    checks.smtp.valid = state == DeliveryState::Deliverable;
    EmailVerification {
        email: email.to_string(),
        state,
        score,
        reason: state.to_string(),
        checks,
    }
}

// ---------------------------------------------------------------------------
// Credit ledger
// ---------------------------------------------------------------------------

pub struct MemoryLedger {
    balance: Mutex<i64>,
    charges: Mutex<HashMap<String, i64>>,
    unavailable: AtomicBool,
}

impl MemoryLedger {
    pub fn with_balance(balance: i64) -> Self {
        Self {
            balance: Mutex::new(balance),
            charges: Mutex::new(HashMap::new()),
            unavailable: AtomicBool::new(false),
        }
    }

    pub fn go_offline(&self) {
        self.unavailable.store(true, Ordering::SeqCst);
    }

    pub fn set_balance(&self, balance: i64) {
        *self.balance.lock().unwrap() = balance;
    }

    pub fn balance(&self) -> i64 {
        *self.balance.lock().unwrap()
    }

    pub fn charges(&self) -> HashMap<String, i64> {
        self.charges.lock().unwrap().clone()
    }
}

#[async_trait]
impl CreditLedger for MemoryLedger {
    async fn check_credits(&self, _organization_id: &str) -> Result<CreditBalance, LedgerError> {
        Ok(CreditBalance {
            remaining: self.balance(),
        })
    }

    async fn deduct_credits(
        &self,
        _organization_id: &str,
        quantity: i64,
        idempotency_key: &str,
    ) -> Result<DeductOutcome, LedgerError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("billing service down".to_string()));
        }
        let mut balance = self.balance.lock().unwrap();
        let mut charges = self.charges.lock().unwrap();
        if charges.contains_key(idempotency_key) {
            return Ok(DeductOutcome::charged(*balance));
        }
        if *balance < quantity {
            return Ok(DeductOutcome::refused(format!(
                "insufficient balance to deduct {} credits",
                quantity
            )));
        }
        *balance -= quantity;
        charges.insert(idempotency_key.to_string(), quantity);
        Ok(DeductOutcome::charged(*balance))
    }
}

// ---------------------------------------------------------------------------
// Activity log and dispatcher
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingActivity {
    events: Mutex<Vec<ActivityEvent>>,
    broken: AtomicBool,
}

impl RecordingActivity {
    pub fn break_sink(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }

    pub fn actions(&self) -> Vec<ActivityAction> {
        self.events.lock().unwrap().iter().map(|e| e.action).collect()
    }

    pub fn events(&self) -> Vec<ActivityEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl ActivityReporter for RecordingActivity {
    async fn log(&self, event: &ActivityEvent) -> Result<(), ActivityError> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(ActivityError::Unavailable("audit sink offline".to_string()));
        }
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingDispatcher {
    jobs: Mutex<Vec<QueuedJob>>,
    broken: AtomicBool,
}

impl RecordingDispatcher {
    pub fn break_queue(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }

    pub fn dispatched(&self) -> Vec<QueuedJob> {
        self.jobs.lock().unwrap().clone()
    }

    /// The latest payload dispatched for a job.
    pub fn take(&self, job_id: Uuid) -> Option<QueuedJob> {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|j| j.job_id == job_id)
            .cloned()
    }
}

#[async_trait]
impl JobDispatcher for RecordingDispatcher {
    async fn dispatch(&self, job: &QueuedJob) -> Result<(), QueueError> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(QueueError::Unavailable("redis connection refused".to_string()));
        }
        self.jobs.lock().unwrap().push(job.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub store: Arc<MemoryJobStore>,
    pub oracle: Arc<ScriptedOracle>,
    pub ledger: Arc<MemoryLedger>,
    pub activity: Arc<RecordingActivity>,
    pub dispatcher: Arc<RecordingDispatcher>,
    pub verifier: Arc<BulkVerifier>,
}

impl Harness {
    pub fn with_balance(balance: i64) -> Self {
        Self::with_settings(balance, OrchestratorSettings::default())
    }

    pub fn with_settings(balance: i64, settings: OrchestratorSettings) -> Self {
        let store = Arc::new(MemoryJobStore::default());
        let oracle = Arc::new(ScriptedOracle::default());
        let ledger = Arc::new(MemoryLedger::with_balance(balance));
        let activity = Arc::new(RecordingActivity::default());
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let verifier = Arc::new(BulkVerifier::new(
            store.clone(),
            oracle.clone(),
            ledger.clone(),
            activity.clone(),
            dispatcher.clone(),
            settings,
        ));
        Self {
            store,
            oracle,
            ledger,
            activity,
            dispatcher,
            verifier,
        }
    }

    /// Submit under the default organization and return the accepted job.
    pub async fn submit(&self, emails: &[&str]) -> BulkJob {
        self.verifier
            .submit_job(submission(ORG, emails))
            .await
            .expect("submission should be accepted")
    }

    /// Run the worker side for a previously dispatched job.
    pub async fn process(&self, job_id: Uuid) -> JobOutcome {
        let queued = self
            .dispatcher
            .take(job_id)
            .expect("job should have been dispatched");
        self.verifier
            .process_job(&queued)
            .await
            .expect("store should accept writes")
    }

    /// Deliver the latest payload for a job the way the worker does.
    pub async fn settle(&self, job_id: Uuid) -> Settlement {
        let queued = self
            .dispatcher
            .take(job_id)
            .expect("job should have been dispatched");
        self.verifier.settle_job(&queued).await
    }

    pub async fn submit_and_process(&self, emails: &[&str]) -> (BulkJob, JobOutcome) {
        let job = self.submit(emails).await;
        let outcome = self.process(job.id).await;
        (job, outcome)
    }
}

pub fn submission(organization_id: &str, emails: &[&str]) -> SubmitJob {
    SubmitJob {
        organization_id: organization_id.to_string(),
        user_id: USER.to_string(),
        emails: emails.iter().map(|e| e.to_string()).collect(),
        name: None,
        options: VerifyOptions::default(),
        request: Default::default(),
    }
}

/// `count` distinct addresses of the form `user{n}@example.com`.
pub fn numbered_emails(count: usize) -> Vec<String> {
    (0..count).map(|n| format!("user{}@example.com", n)).collect()
}

pub fn as_refs(emails: &[String]) -> Vec<&str> {
    emails.iter().map(String::as_str).collect()
}

pub fn is_non_increasing(times: &[DateTime<Utc>]) -> bool {
    times.windows(2).all(|w| w[0] >= w[1])
}
