//! Process-local implementations of the store contracts.
//!
//! Useful for single-process deployments without a database and as the
//! backing stores in tests. Entries live in `Arc<Mutex<_>>`, so clones share
//! the same queues.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::models::Item;
use crate::task::Task;
use crate::task_queue::{QueueName, TaskQueue, stamp_for_offer};
use crate::traits::{ItemStore, ThrottleStore};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, AppError> {
    mutex
        .lock()
        .map_err(|_| AppError::Generic("in-memory store lock poisoned".into()))
}

// ---------------------------------------------------------------------------
// MemoryTaskQueue
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Queues {
    /// Each queue is kept in `update_time` order: offers append, polls take the front.
    tasks: Vec<Task>,
    failed: Vec<Task>,
}

impl Queues {
    fn get_mut(&mut self, queue: QueueName) -> &mut Vec<Task> {
        match queue {
            QueueName::Task => &mut self.tasks,
            QueueName::Failed => &mut self.failed,
        }
    }

    fn offer(&mut self, queue: QueueName, task: &Task) {
        let entries = self.get_mut(queue);
        let key = task.key();
        entries.retain(|queued| queued.key() != key);
        entries.push(stamp_for_offer(task, Utc::now()));
    }

    fn poll(&mut self, queue: QueueName) -> Option<Task> {
        let entries = self.get_mut(queue);
        if entries.is_empty() {
            None
        } else {
            Some(entries.remove(0))
        }
    }
}

/// In-memory task queue with the same replace-on-offer and atomic-poll
/// semantics as the database-backed one.
#[derive(Debug, Clone, Default)]
pub struct MemoryTaskQueue {
    queues: Arc<Mutex<Queues>>,
}

impl MemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a queue, oldest first.
    pub fn snapshot(&self, queue: QueueName) -> Vec<Task> {
        match self.queues.lock() {
            Ok(mut queues) => queues.get_mut(queue).clone(),
            Err(_) => Vec::new(),
        }
    }
}

impl TaskQueue for MemoryTaskQueue {
    async fn offer_task(&self, task: &Task) -> Result<(), AppError> {
        lock(&self.queues)?.offer(QueueName::Task, task);
        tracing::debug!(task_id = %task.id, key = %task.key(), "Task offered");
        Ok(())
    }

    async fn poll_task(&self) -> Result<Option<Task>, AppError> {
        Ok(lock(&self.queues)?.poll(QueueName::Task))
    }

    async fn offer_failed_task(&self, task: &Task) -> Result<(), AppError> {
        lock(&self.queues)?.offer(QueueName::Failed, task);
        tracing::debug!(task_id = %task.id, key = %task.key(), "Failed task offered");
        Ok(())
    }

    async fn poll_failed_task(&self) -> Result<Option<Task>, AppError> {
        let task = lock(&self.queues)?.poll(QueueName::Failed);
        Ok(task.map(|mut task| {
            task.retry_count += 1;
            task
        }))
    }

    async fn has_task(&self) -> Result<bool, AppError> {
        Ok(!lock(&self.queues)?.tasks.is_empty())
    }

    async fn has_failed_task(&self) -> Result<bool, AppError> {
        Ok(!lock(&self.queues)?.failed.is_empty())
    }

    async fn len(&self, queue: QueueName) -> Result<u64, AppError> {
        Ok(lock(&self.queues)?.get_mut(queue).len() as u64)
    }
}

// ---------------------------------------------------------------------------
// MemoryThrottleStore
// ---------------------------------------------------------------------------

/// In-memory throttle store. Does not survive restarts.
#[derive(Debug, Clone, Default)]
pub struct MemoryThrottleStore {
    last_main_task_time: Arc<Mutex<Option<DateTime<Utc>>>>,
}

impl MemoryThrottleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a last full-crawl time.
    pub fn with_last_main_task_time(time: DateTime<Utc>) -> Self {
        Self {
            last_main_task_time: Arc::new(Mutex::new(Some(time))),
        }
    }
}

impl ThrottleStore for MemoryThrottleStore {
    async fn get_last_main_task_time(&self) -> Result<Option<DateTime<Utc>>, AppError> {
        Ok(*lock(&self.last_main_task_time)?)
    }

    async fn set_last_main_task_time(&self) -> Result<(), AppError> {
        *lock(&self.last_main_task_time)? = Some(Utc::now());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryItemStore
// ---------------------------------------------------------------------------

/// In-memory item store keyed by item URI.
#[derive(Debug, Clone, Default)]
pub struct MemoryItemStore {
    items: Arc<Mutex<HashMap<String, Item>>>,
}

impl MemoryItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, uri: &str) -> Option<Item> {
        self.items.lock().ok()?.get(uri).cloned()
    }

    pub fn len(&self) -> usize {
        self.items.lock().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ItemStore for MemoryItemStore {
    async fn put_item(&self, item: &Item) -> Result<(), AppError> {
        lock(&self.items)?.insert(item.uri.clone(), item.clone());
        Ok(())
    }

    async fn filter_unseen(&self, items: Vec<Item>) -> Result<Vec<Item>, AppError> {
        let stored = lock(&self.items)?;
        Ok(items
            .into_iter()
            .filter(|item| !stored.contains_key(&item.uri))
            .collect())
    }
}
