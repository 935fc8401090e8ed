use chrono::{DateTime, Utc};
use sqlx::{PgPool, Pool, Postgres};

use indexer_core::error::AppError;
use indexer_core::traits::{MAIN_TASK_RECORD_NAME, ThrottleStore};

/// PostgreSQL-backed throttle records, one row per `(mode, name)`.
#[derive(Clone)]
pub struct PgThrottleStore {
    pool: Pool<Postgres>,
    mode: String,
}

impl PgThrottleStore {
    pub fn new(pool: PgPool, mode: impl Into<String>) -> Self {
        Self {
            pool,
            mode: mode.into(),
        }
    }

    /// Timestamp of record `name`, or `None` if it was never set.
    pub async fn get(&self, name: &str) -> Result<Option<DateTime<Utc>>, AppError> {
        let row: Option<(DateTime<Utc>,)> =
            sqlx::query_as("SELECT timestamp FROM indexer_throttle WHERE mode = $1 AND name = $2")
                .bind(&self.mode)
                .bind(name)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.map(|r| r.0))
    }

    /// Set record `name` to this process's clock, the clock readers compare it against.
    pub async fn touch(&self, name: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO indexer_throttle (mode, name, timestamp)
            VALUES ($1, $2, $3)
            ON CONFLICT (mode, name) DO UPDATE SET timestamp = EXCLUDED.timestamp
            "#,
        )
        .bind(&self.mode)
        .bind(name)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        tracing::debug!(mode = %self.mode, name, "Throttle record updated");
        Ok(())
    }
}

impl ThrottleStore for PgThrottleStore {
    async fn get_last_main_task_time(&self) -> Result<Option<DateTime<Utc>>, AppError> {
        self.get(MAIN_TASK_RECORD_NAME).await
    }

    async fn set_last_main_task_time(&self) -> Result<(), AppError> {
        self.touch(MAIN_TASK_RECORD_NAME).await
    }
}
