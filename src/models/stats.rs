use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Summary statistics for a completed job, stored on the job row.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobStats {
    pub total: u64,
    pub processed: u64,
    pub deliverable: u64,
    pub undeliverable: u64,
    pub risky: u64,
    pub unknown: u64,
    pub breakdown: StatsBreakdown,
    pub average_score: i64,
    pub score_distribution: ScoreDistribution,
    pub timing: StatsTiming,
}

/// Independent tallies; one result may contribute to several.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatsBreakdown {
    pub disposable: u64,
    pub role_based: u64,
    pub free_provider: u64,
    pub catch_all: u64,
    pub syntax_errors: u64,
    pub dns_errors: u64,
    pub typos_detected: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScoreDistribution {
    /// score >= 90
    pub excellent: u64,
    /// 70 <= score < 90
    pub good: u64,
    /// 50 <= score < 70
    pub fair: u64,
    /// score < 50
    pub poor: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatsTiming {
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// Milliseconds.
    pub total_duration: i64,
    /// Milliseconds per item.
    pub average_duration: i64,
}
