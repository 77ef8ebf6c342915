use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Audit actions emitted over a job's lifecycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActivityAction {
    BulkJobCreated,
    BulkJobCompleted,
    BulkJobFailed,
}

/// Caller metadata captured at submission for the audit trail.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RequestMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// A single audit record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityEvent {
    pub organization_id: String,
    pub user_id: String,
    pub action: ActivityAction,
    pub job_id: Uuid,
    pub details: serde_json::Value,
    pub request: RequestMeta,
}
