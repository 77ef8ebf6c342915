use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::job::{BulkJob, JobStatus, JobUpdate, NewResult, ResultRecord};
use crate::models::stats::JobStats;
use crate::models::verification::DeliveryState;
use crate::services::store::StoreError;

const JOB_COLUMNS: &str = r#"
    id, organization_id, user_id, name, status, total_count, processed_count,
    stats, error_message, created_at, started_at, completed_at
"#;

/// Insert a new bulk job
pub async fn create_job(pool: &PgPool, job: &BulkJob) -> Result<(), StoreError> {
    let stats = job
        .stats
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .map_err(|e| StoreError::Decode(e.to_string()))?;

    sqlx::query(
        r#"
        INSERT INTO bulk_jobs
            (id, organization_id, user_id, name, status, total_count, processed_count,
             stats, error_message, created_at, started_at, completed_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(job.id)
    .bind(&job.organization_id)
    .bind(&job.user_id)
    .bind(&job.name)
    .bind(job.status.as_str())
    .bind(job.total_count)
    .bind(job.processed_count)
    .bind(stats)
    .bind(&job.error_message)
    .bind(job.created_at)
    .bind(job.started_at)
    .bind(job.completed_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Get a job by ID, scoped to its owning organization
pub async fn get_job(
    pool: &PgPool,
    job_id: Uuid,
    organization_id: &str,
) -> Result<Option<BulkJob>, StoreError> {
    let query = format!(
        "SELECT {} FROM bulk_jobs WHERE id = $1 AND organization_id = $2",
        JOB_COLUMNS
    );
    let row = sqlx::query(&query)
        .bind(job_id)
        .bind(organization_id)
        .fetch_optional(pool)
        .await?;

    row.map(|r| job_from_row(&r)).transpose()
}

/// Apply a partial update. Unset fields keep their stored value and
/// processed_count never moves backwards.
pub async fn update_job(
    pool: &PgPool,
    job_id: Uuid,
    update: &JobUpdate,
) -> Result<bool, StoreError> {
    let stats = update
        .stats
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .map_err(|e| StoreError::Decode(e.to_string()))?;

    let result = sqlx::query(
        r#"
        UPDATE bulk_jobs
        SET status = COALESCE($2, status),
            processed_count = GREATEST(processed_count, COALESCE($3, processed_count)),
            stats = COALESCE($4, stats),
            error_message = COALESCE($5, error_message),
            started_at = COALESCE($6, started_at),
            completed_at = COALESCE($7, completed_at),
            updated_at = NOW()
        WHERE id = $1
          AND ($8::text IS NULL OR status = $8)
        "#,
    )
    .bind(job_id)
    .bind(update.status.map(|s| s.as_str()))
    .bind(update.processed_count)
    .bind(stats)
    .bind(&update.error_message)
    .bind(update.started_at)
    .bind(update.completed_at)
    .bind(update.expected_status.map(|s| s.as_str()))
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Append one per-email result
pub async fn insert_result(pool: &PgPool, result: &NewResult) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO bulk_job_results
            (id, job_id, organization_id, user_id, email, state, score, reason, result, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(result.job_id)
    .bind(&result.organization_id)
    .bind(&result.user_id)
    .bind(&result.email)
    .bind(result.state.to_string())
    .bind(result.score)
    .bind(&result.reason)
    .bind(&result.result)
    .bind(result.created_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Page through a job's results, newest first
pub async fn list_results(
    pool: &PgPool,
    job_id: Uuid,
    organization_id: &str,
    offset: i64,
    limit: i64,
) -> Result<Vec<ResultRecord>, StoreError> {
    let rows = sqlx::query(
        r#"
        SELECT id, email, state, score, reason, result, created_at
        FROM bulk_job_results
        WHERE job_id = $1 AND organization_id = $2
        ORDER BY created_at DESC, id DESC
        OFFSET $3
        LIMIT $4
        "#,
    )
    .bind(job_id)
    .bind(organization_id)
    .bind(offset)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|r| -> Result<ResultRecord, StoreError> {
            let state: String = r.try_get("state")?;
            Ok(ResultRecord {
                id: r.try_get("id")?,
                email: r.try_get("email")?,
                state: state
                    .parse::<DeliveryState>()
                    .map_err(|_| StoreError::Decode(format!("unknown delivery state '{}'", state)))?,
                score: r.try_get("score")?,
                reason: r.try_get("reason")?,
                result: r.try_get("result")?,
                created_at: r.try_get("created_at")?,
            })
        })
        .collect()
}

/// Count a job's stored results
pub async fn count_results(
    pool: &PgPool,
    job_id: Uuid,
    organization_id: &str,
) -> Result<i64, StoreError> {
    let row = sqlx::query(
        r#"
        SELECT COUNT(*) AS total
        FROM bulk_job_results
        WHERE job_id = $1 AND organization_id = $2
        "#,
    )
    .bind(job_id)
    .bind(organization_id)
    .fetch_one(pool)
    .await?;

    Ok(row.try_get("total")?)
}

fn job_from_row(r: &PgRow) -> Result<BulkJob, StoreError> {
    let status_str: String = r.try_get("status")?;
    let status = status_str
        .parse::<JobStatus>()
        .map_err(|_| StoreError::Decode(format!("unknown job status '{}'", status_str)))?;

    let stats: Option<serde_json::Value> = r.try_get("stats")?;
    let stats = stats
        .map(serde_json::from_value::<JobStats>)
        .transpose()
        .map_err(|e| StoreError::Decode(e.to_string()))?;

    Ok(BulkJob {
        id: r.try_get("id")?,
        organization_id: r.try_get("organization_id")?,
        user_id: r.try_get("user_id")?,
        name: r.try_get("name")?,
        status,
        total_count: r.try_get("total_count")?,
        processed_count: r.try_get("processed_count")?,
        stats,
        error_message: r.try_get("error_message")?,
        created_at: r.try_get("created_at")?,
        started_at: r.try_get("started_at")?,
        completed_at: r.try_get("completed_at")?,
    })
}
