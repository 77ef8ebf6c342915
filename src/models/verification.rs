use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::models::job::{BulkJob, JobStatus, ResultRecord};
use crate::models::stats::JobStats;

/// Delivery verdict returned by the verification oracle for one address.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeliveryState {
    Deliverable,
    Undeliverable,
    Risky,
    Unknown,
}

/// Per-run switches forwarded to the verification oracle.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOptions {
    #[serde(default)]
    pub skip_disposable: bool,
    #[serde(default)]
    pub skip_role: bool,
    #[serde(default)]
    pub skip_typo: bool,
}

/// Result of verifying a single email address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmailVerification {
    pub email: String,
    pub state: DeliveryState,
    pub score: i32,
    pub reason: String,
    pub checks: VerificationChecks,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct VerificationChecks {
    pub syntax: SyntaxCheck,
    pub dns: DnsCheck,
    pub smtp: SmtpCheck,
    pub disposable: DisposableCheck,
    pub role: RoleCheck,
    pub free_provider: FreeProviderCheck,
    pub typo: TypoCheck,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SyntaxCheck {
    pub valid: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DnsCheck {
    pub valid: bool,
    pub mx_records: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SmtpCheck {
    pub valid: bool,
    pub catch_all: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DisposableCheck {
    pub is_disposable: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RoleCheck {
    pub is_role: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct FreeProviderCheck {
    pub is_free: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct TypoCheck {
    pub has_typo: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// Request body for submitting a bulk verification job.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobRequest {
    #[garde(length(min = 1), inner(length(min = 1, max = 320)))]
    pub emails: Vec<String>,

    #[garde(length(min = 1, max = 200))]
    pub name: Option<String>,

    #[serde(default)]
    #[garde(skip)]
    pub options: VerifyOptions,
}

/// Response after a job has been accepted.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub email_count: usize,
    pub message: String,
}

/// Response for querying job status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub id: Uuid,
    pub name: String,
    pub status: JobStatus,
    pub total_count: i32,
    pub processed_count: i32,
    pub progress: i32,
    pub stats: Option<JobStats>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl From<&BulkJob> for JobStatusResponse {
    fn from(job: &BulkJob) -> Self {
        Self {
            id: job.id,
            name: job.name.clone(),
            status: job.status,
            total_count: job.total_count,
            processed_count: job.processed_count,
            progress: job.progress(),
            stats: job.stats.clone(),
            created_at: job.created_at,
            completed_at: job.completed_at,
            error_message: job.error_message.clone(),
        }
    }
}

/// Query string for the results listing.
#[derive(Debug, Default, Deserialize)]
pub struct ResultsQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
}

impl Pagination {
    pub fn new(page: i64, limit: i64, total: i64) -> Self {
        let total_pages = if limit > 0 { (total + limit - 1) / limit } else { 0 };
        Self {
            page,
            limit,
            total,
            total_pages,
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }
}

/// One page of results for a completed job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobResultsResponse {
    pub job_id: Uuid,
    pub results: Vec<ResultRecord>,
    pub stats: Option<JobStats>,
    pub pagination: Pagination,
}
