use std::fmt;
use std::future::Future;

use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::task::Task;

/// The two queues every task store keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueName {
    /// Fresh work offered by the orchestrator or a scraper.
    Task,
    /// Work that needs another attempt.
    Failed,
}

impl QueueName {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::Task => "task",
            QueueName::Failed => "failed_task",
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Durable store for pending and failed scrape tasks.
///
/// Both queues are ordered by `update_time` ascending. Offering a task whose
/// [`TaskKey`](crate::task::TaskKey) is already present in the same queue
/// replaces the old entry atomically and stamps a fresh `update_time`.
///
/// Polling must be an atomic take: several orchestrator processes may share
/// one store, and a task must be handed to at most one of them.
pub trait TaskQueue: Send + Sync + Clone {
    fn offer_task(&self, task: &Task) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Remove and return the oldest pending task, or `None` if the queue is empty.
    fn poll_task(&self) -> impl Future<Output = Result<Option<Task>, AppError>> + Send;

    fn offer_failed_task(&self, task: &Task)
    -> impl Future<Output = Result<(), AppError>> + Send;

    /// Remove and return the oldest failed task with its `retry_count`
    /// incremented by one, or `None` if the failed queue is empty.
    fn poll_failed_task(&self) -> impl Future<Output = Result<Option<Task>, AppError>> + Send;

    /// Cheap, possibly approximate emptiness check. A hint only.
    fn has_task(&self) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Cheap, possibly approximate emptiness check. A hint only.
    fn has_failed_task(&self) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Number of entries currently held in `queue`.
    fn len(&self, queue: QueueName) -> impl Future<Output = Result<u64, AppError>> + Send;
}

/// Stamp a task for insertion into a queue.
pub fn stamp_for_offer(task: &Task, now: DateTime<Utc>) -> Task {
    let mut stamped = task.clone();
    stamped.update_time = Some(now);
    stamped
}
