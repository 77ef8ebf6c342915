use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::activity::ActivityEvent;
use crate::services::activity::{ActivityError, ActivityReporter};

/// Append-only audit log table.
pub struct PgActivityReporter {
    pool: PgPool,
}

impl PgActivityReporter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActivityReporter for PgActivityReporter {
    async fn log(&self, event: &ActivityEvent) -> Result<(), ActivityError> {
        sqlx::query(
            r#"
            INSERT INTO activity_logs
                (id, organization_id, user_id, action, resource_type, resource_id,
                 details, ip_address, user_agent)
            VALUES ($1, $2, $3, $4, 'bulk_job', $5, $6, $7, $8)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&event.organization_id)
        .bind(&event.user_id)
        .bind(event.action.to_string())
        .bind(event.job_id)
        .bind(&event.details)
        .bind(&event.request.ip_address)
        .bind(&event.request.user_agent)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
