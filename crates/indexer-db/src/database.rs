use indexer_core::AppError;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::config::DatabaseConfig;
use crate::task_repository::PgTaskQueue;
use crate::throttle_repository::PgThrottleStore;

/// Owns the connection pool, runs migrations and hands out stores scoped to
/// one indexer mode.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to connect: {e}")))?;

        tracing::debug!(max_connections = config.max_connections, "Connected to task store");
        Ok(Self { pool })
    }

    /// Wrap an existing pool (useful for testing).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run all pending migrations.
    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Task and failed-task queues of `mode`.
    pub fn task_queue(&self, mode: &str) -> PgTaskQueue {
        PgTaskQueue::new(self.pool.clone(), mode)
    }

    /// Throttle records of `mode`.
    pub fn throttle_store(&self, mode: &str) -> PgThrottleStore {
        PgThrottleStore::new(self.pool.clone(), mode)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
