use async_trait::async_trait;

use crate::models::activity::ActivityEvent;
use crate::services::store::is_pool_unavailable;

/// Best-effort audit log. Callers discard the error.
#[async_trait]
pub trait ActivityReporter: Send + Sync {
    async fn log(&self, event: &ActivityEvent) -> Result<(), ActivityError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ActivityError {
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("Activity log unavailable: {0}")]
    Unavailable(String),
}


impl From<sqlx::Error> for ActivityError {
    fn from(err: sqlx::Error) -> Self {
        if is_pool_unavailable(&err) {
            ActivityError::Unavailable(err.to_string())
        } else {
            ActivityError::Database(err)
        }
    }
}
