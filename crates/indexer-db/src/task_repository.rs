use chrono::{DateTime, Utc};
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

use indexer_core::error::AppError;
use indexer_core::models::Item;
use indexer_core::task::{Task, TaskKind, TaskType};
use indexer_core::task_queue::{QueueName, TaskQueue};

/// PostgreSQL-backed task queues using `SELECT FOR UPDATE SKIP LOCKED`.
///
/// Rows are scoped by `mode`, so several indexers can share one table.
#[derive(Clone)]
pub struct PgTaskQueue {
    pool: Pool<Postgres>,
    mode: String,
}

impl PgTaskQueue {
    pub fn new(pool: PgPool, mode: impl Into<String>) -> Self {
        Self {
            pool,
            mode: mode.into(),
        }
    }

    pub fn mode(&self) -> &str {
        &self.mode
    }

    /// Oldest `limit` entries of `queue` in poll order, without removing them.
    pub async fn peek(&self, queue: QueueName, limit: u32) -> Result<Vec<Task>, AppError> {
        let rows = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT * FROM indexer_tasks
            WHERE mode = $1 AND queue = $2
            ORDER BY update_time ASC, seq ASC
            LIMIT $3
            "#,
        )
        .bind(&self.mode)
        .bind(queue.as_str())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        rows.into_iter().map(Task::try_from).collect()
    }

    async fn offer(&self, queue: QueueName, task: &Task) -> Result<(), AppError> {
        let (page_no, item) = match &task.kind {
            TaskKind::Main { page_no } => (page_no.map(to_column).transpose()?, None),
            TaskKind::Sub { item } => (None, Some(serde_json::to_value(item)?)),
        };
        let retry_count = to_column(task.retry_count)?;

        sqlx::query(
            r#"
            INSERT INTO indexer_tasks
                (mode, queue, identity_key, task_id, task_type, page_no, item, retry_count, created_at, update_time)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, clock_timestamp())
            ON CONFLICT (mode, queue, identity_key) DO UPDATE
            SET task_id = EXCLUDED.task_id,
                task_type = EXCLUDED.task_type,
                page_no = EXCLUDED.page_no,
                item = EXCLUDED.item,
                retry_count = EXCLUDED.retry_count,
                created_at = EXCLUDED.created_at,
                update_time = EXCLUDED.update_time
            "#,
        )
        .bind(&self.mode)
        .bind(queue.as_str())
        .bind(task.key().to_string())
        .bind(task.id)
        .bind(task.task_type().as_str())
        .bind(page_no)
        .bind(item)
        .bind(retry_count)
        .bind(task.timestamp)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        tracing::debug!(task_id = %task.id, key = %task.key(), queue = %queue, "Task offered");
        Ok(())
    }

    async fn poll(&self, queue: QueueName) -> Result<Option<Task>, AppError> {
        let row = sqlx::query_as::<_, TaskRow>(
            r#"
            DELETE FROM indexer_tasks
            WHERE seq = (
                SELECT seq FROM indexer_tasks
                WHERE mode = $1 AND queue = $2
                ORDER BY update_time ASC, seq ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(&self.mode)
        .bind(queue.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        row.map(Task::try_from).transpose()
    }

    async fn exists(&self, queue: QueueName) -> Result<bool, AppError> {
        let row: (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM indexer_tasks WHERE mode = $1 AND queue = $2)",
        )
        .bind(&self.mode)
        .bind(queue.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.0)
    }
}

/// Narrow a task counter to its `INTEGER` column.
fn to_column(value: u32) -> Result<i32, AppError> {
    i32::try_from(value)
        .map_err(|_| AppError::ParseError(format!("{value} does not fit an INTEGER column")))
}

/// Widen an `INTEGER` column back to a task counter.
fn from_column(value: i32) -> Result<u32, AppError> {
    u32::try_from(value).map_err(|_| AppError::ParseError(format!("negative counter {value}")))
}

// -- Internal row type for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct TaskRow {
    task_id: Uuid,
    task_type: String,
    page_no: Option<i32>,
    item: Option<serde_json::Value>,
    retry_count: i32,
    created_at: DateTime<Utc>,
    update_time: DateTime<Utc>,
}

impl TryFrom<TaskRow> for Task {
    type Error = AppError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let task_type: TaskType = row.task_type.parse().map_err(AppError::ParseError)?;
        let kind = match task_type {
            TaskType::Main => TaskKind::Main {
                page_no: row.page_no.map(from_column).transpose()?,
            },
            TaskType::Sub => {
                let item = row.item.ok_or_else(|| {
                    AppError::ParseError(format!("SUB task {} has no item", row.task_id))
                })?;
                TaskKind::Sub {
                    item: serde_json::from_value::<Item>(item)?,
                }
            }
        };

        Ok(Task {
            id: row.task_id,
            kind,
            timestamp: row.created_at,
            retry_count: from_column(row.retry_count)?,
            update_time: Some(row.update_time),
        })
    }
}

impl TaskQueue for PgTaskQueue {
    async fn offer_task(&self, task: &Task) -> Result<(), AppError> {
        self.offer(QueueName::Task, task).await
    }

    async fn poll_task(&self) -> Result<Option<Task>, AppError> {
        self.poll(QueueName::Task).await
    }

    async fn offer_failed_task(&self, task: &Task) -> Result<(), AppError> {
        self.offer(QueueName::Failed, task).await
    }

    async fn poll_failed_task(&self) -> Result<Option<Task>, AppError> {
        let mut task = self.poll(QueueName::Failed).await?;
        if let Some(task) = task.as_mut() {
            task.retry_count += 1;
        }
        Ok(task)
    }

    async fn has_task(&self) -> Result<bool, AppError> {
        self.exists(QueueName::Task).await
    }

    async fn has_failed_task(&self) -> Result<bool, AppError> {
        self.exists(QueueName::Failed).await
    }

    async fn len(&self, queue: QueueName) -> Result<u64, AppError> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM indexer_tasks WHERE mode = $1 AND queue = $2")
                .bind(&self.mode)
                .bind(queue.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        u64::try_from(row.0)
            .map_err(|_| AppError::DatabaseError(format!("negative count {}", row.0)))
    }
}
