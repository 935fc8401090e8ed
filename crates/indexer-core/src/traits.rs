use std::future::Future;

use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::models::Item;
use crate::task::{Task, TaskStatus};

/// Record name of the periodic full crawl in the throttle store.
pub const MAIN_TASK_RECORD_NAME: &str = "MainTask";

/// Durable last-run timestamps for periodic activities.
///
/// Survives process restarts, so a freshly started indexer knows whether a
/// full crawl is overdue.
pub trait ThrottleStore: Send + Sync + Clone {
    /// Last time a full crawl was started, or `None` if it never ran.
    fn get_last_main_task_time(
        &self,
    ) -> impl Future<Output = Result<Option<DateTime<Utc>>, AppError>> + Send;

    /// Record that a full crawl starts now.
    fn set_last_main_task_time(&self) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Performs the site-specific work behind a task.
///
/// For a successful MAIN task the scraper has already offered the SUB tasks
/// it discovered, plus a continuation MAIN task when more pages remain.
/// `Fail` on a SUB task abandons the item for good.
pub trait Scraper: Send + Sync {
    /// Acquire scraper-owned resources (browser session, HTTP client, ...).
    fn start(&self) -> impl Future<Output = Result<(), AppError>> + Send {
        async { Ok(()) }
    }

    /// Release what [`Scraper::start`] acquired.
    fn end(&self) -> impl Future<Output = Result<(), AppError>> + Send {
        async { Ok(()) }
    }

    fn execute_task(&self, task: &Task)
    -> impl Future<Output = Result<TaskStatus, AppError>> + Send;
}

/// Persists fully scraped items and answers "have we seen this before".
pub trait ItemStore: Send + Sync + Clone {
    fn put_item(&self, item: &Item) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Return the items whose `uri` is not stored yet, preserving order.
    fn filter_unseen(
        &self,
        items: Vec<Item>,
    ) -> impl Future<Output = Result<Vec<Item>, AppError>> + Send;
}

/// A no-op ItemStore for use when persistence is not needed.
#[derive(Debug, Clone)]
pub struct NullItemStore;

impl ItemStore for NullItemStore {
    async fn put_item(&self, _item: &Item) -> Result<(), AppError> {
        Ok(())
    }

    async fn filter_unseen(&self, items: Vec<Item>) -> Result<Vec<Item>, AppError> {
        Ok(items)
    }
}
