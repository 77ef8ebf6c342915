use serde::Deserialize;
use std::time::Duration;

use crate::services::orchestrator::{
    OrchestratorSettings, DEFAULT_BATCH_SIZE, DEFAULT_MAX_EMAILS_PER_JOB,
};

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string for job queue
    pub redis_url: String,

    /// Base URL of the email verification service
    pub verifier_url: String,

    /// Bearer token for the verification service
    #[serde(default)]
    pub verifier_api_key: Option<String>,

    /// Per-request timeout for verification calls, in seconds
    #[serde(default = "default_verifier_timeout_secs")]
    pub verifier_timeout_secs: u64,

    /// Emails verified concurrently per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Largest email list accepted in one job
    #[serde(default = "default_max_emails_per_job")]
    pub max_emails_per_job: usize,

    /// Request body limit in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Worker sleep between polls of an empty queue, in milliseconds
    #[serde(default = "default_worker_poll_interval_ms")]
    pub worker_poll_interval_ms: u64,

    /// Requeue payloads left on the processing list when the worker starts.
    /// Disable when more than one worker consumes the queue.
    #[serde(default = "default_requeue_stranded_on_start")]
    pub requeue_stranded_on_start: bool,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_verifier_timeout_secs() -> u64 {
    30
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_max_emails_per_job() -> usize {
    DEFAULT_MAX_EMAILS_PER_JOB
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_worker_poll_interval_ms() -> u64 {
    1000
}

fn default_requeue_stranded_on_start() -> bool {
    true
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            batch_size: self.batch_size.max(1),
            max_emails_per_job: self.max_emails_per_job,
        }
    }

    pub fn verifier_timeout(&self) -> Duration {
        Duration::from_secs(self.verifier_timeout_secs)
    }
}
