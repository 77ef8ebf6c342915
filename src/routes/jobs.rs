use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use garde::Validate;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::verification::{
    JobResultsResponse, JobStatusResponse, ResultsQuery, SubmitJobRequest, SubmitJobResponse,
};
use crate::routes::auth::{AuthContext, ClientMeta};
use crate::routes::error::ApiResult;
use crate::services::orchestrator::{BulkVerifier, SubmitJob, DEFAULT_PAGE_SIZE};

/// Bulk job endpoints, bound to the orchestrator.
pub fn router(verifier: Arc<BulkVerifier>) -> Router {
    Router::new()
        .route("/api/v1/jobs", post(submit_job))
        .route("/api/v1/jobs/{job_id}", get(get_job_status))
        .route("/api/v1/jobs/{job_id}/results", get(get_job_results))
        .with_state(verifier)
}

/// POST /api/v1/jobs: Submit a list of emails for bulk verification.
pub async fn submit_job(
    State(verifier): State<Arc<BulkVerifier>>,
    auth: AuthContext,
    ClientMeta(request_meta): ClientMeta,
    Json(request): Json<SubmitJobRequest>,
) -> ApiResult<(StatusCode, Json<SubmitJobResponse>)> {
    request.validate()?;

    let email_count = request.emails.len();
    let job = verifier
        .submit_job(SubmitJob {
            organization_id: auth.organization_id,
            user_id: auth.user_id,
            emails: request.emails,
            name: request.name,
            options: request.options,
            request: request_meta,
        })
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitJobResponse {
            job_id: job.id,
            status: job.status,
            email_count,
            message: format!(
                "Verification of {} emails started. Poll /api/v1/jobs/{} for progress.",
                email_count, job.id
            ),
        }),
    ))
}

/// GET /api/v1/jobs/{job_id}: Job status and progress.
pub async fn get_job_status(
    State(verifier): State<Arc<BulkVerifier>>,
    auth: AuthContext,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<JobStatusResponse>> {
    let status = verifier
        .get_job_status(job_id, &auth.organization_id)
        .await?;
    Ok(Json(status))
}

/// GET /api/v1/jobs/{job_id}/results: Paginated results of a completed job.
pub async fn get_job_results(
    State(verifier): State<Arc<BulkVerifier>>,
    auth: AuthContext,
    Path(job_id): Path<Uuid>,
    Query(query): Query<ResultsQuery>,
) -> ApiResult<Json<JobResultsResponse>> {
    let page = query.page.unwrap_or(1);
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);

    let results = verifier
        .get_job_results(job_id, &auth.organization_id, page, limit)
        .await?;
    Ok(Json(results))
}
