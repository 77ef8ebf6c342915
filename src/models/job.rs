use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::models::stats::JobStats;
use crate::models::verification::DeliveryState;

/// Lifecycle status of a bulk verification job.
///
/// `Pending` and `Processing` are the only non-terminal states.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Allowed transitions: pending -> processing, pending -> failed (the job
    /// could not be scheduled), processing -> completed | failed.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Pending, JobStatus::Failed)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }
}

/// A bulk verification job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BulkJob {
    pub id: Uuid,
    pub organization_id: String,
    pub user_id: String,
    pub name: String,
    pub status: JobStatus,
    pub total_count: i32,
    pub processed_count: i32,
    pub stats: Option<JobStats>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl BulkJob {
    pub fn new_pending(
        organization_id: &str,
        user_id: &str,
        name: Option<&str>,
        total_count: i32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id: organization_id.to_string(),
            user_id: user_id.to_string(),
            name: name
                .map(str::to_string)
                .unwrap_or_else(|| default_job_name(total_count)),
            status: JobStatus::Pending,
            total_count,
            processed_count: 0,
            stats: None,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Percentage of processed items, rounded. Zero for an empty job.
    pub fn progress(&self) -> i32 {
        if self.total_count <= 0 {
            return 0;
        }
        ((self.processed_count as f64 / self.total_count as f64) * 100.0).round() as i32
    }
}

pub fn default_job_name(total_count: i32) -> String {
    format!("Bulk verification ({} emails)", total_count)
}

/// Partial update applied to a job row. `None` leaves a column untouched.
///
/// When `expected_status` is set the update only applies if the row is
/// currently in that status.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub processed_count: Option<i32>,
    pub stats: Option<JobStats>,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub expected_status: Option<JobStatus>,
}

impl JobUpdate {
    pub fn start(started_at: DateTime<Utc>) -> Self {
        Self {
            status: Some(JobStatus::Processing),
            started_at: Some(started_at),
            expected_status: Some(JobStatus::Pending),
            ..Default::default()
        }
    }

    pub fn progress(processed_count: i32) -> Self {
        Self {
            processed_count: Some(processed_count),
            ..Default::default()
        }
    }

    pub fn complete(stats: JobStats, completed_at: DateTime<Utc>) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            stats: Some(stats),
            completed_at: Some(completed_at),
            expected_status: Some(JobStatus::Processing),
            ..Default::default()
        }
    }

    pub fn fail(from: JobStatus, message: impl Into<String>, completed_at: DateTime<Utc>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            error_message: Some(message.into()),
            completed_at: Some(completed_at),
            expected_status: Some(from),
            ..Default::default()
        }
    }
}

/// A per-email result about to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct NewResult {
    pub job_id: Uuid,
    pub organization_id: String,
    pub user_id: String,
    pub email: String,
    pub state: DeliveryState,
    pub score: i32,
    pub reason: String,
    pub result: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// A persisted per-email result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    pub id: Uuid,
    pub email: String,
    pub state: DeliveryState,
    pub score: i32,
    pub reason: String,
    pub result: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
