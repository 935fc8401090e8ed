//! Generic MAIN/SUB task handling for paginated listing sites.
//!
//! Site scrapers only implement [`ListingSource`]: fetch one listing page,
//! fetch one detail page. [`ListingScraper`] turns that into the task
//! protocol the orchestra expects: SUB fan-out, pagination, dedup against
//! the item store, and error classification. A 404 abandons the item and
//! transient errors ([`AppError::is_retryable`]) ask for a retry.

use std::future::Future;

use crate::error::AppError;
use crate::models::Item;
use crate::task::{Task, TaskKind, TaskStatus};
use crate::task_queue::TaskQueue;
use crate::traits::{ItemStore, Scraper};

/// One scraped listing page.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingPage {
    pub items: Vec<Item>,
    /// The site shows a link to a following page.
    pub has_next: bool,
}

/// Result of fetching an item's detail page.
#[derive(Debug, Clone, PartialEq)]
pub enum DetailOutcome {
    /// The item with its fields filled in.
    Found(Item),
    /// The site answered 404. The item will never be available.
    Gone,
    /// Any other non-success answer.
    Unavailable,
}

/// Site-specific page fetching.
pub trait ListingSource: Send + Sync {
    fn start(&self) -> impl Future<Output = Result<(), AppError>> + Send {
        async { Ok(()) }
    }

    fn end(&self) -> impl Future<Output = Result<(), AppError>> + Send {
        async { Ok(()) }
    }

    /// Scrape listing page `page_no` (1-based). `None` when the page could
    /// not be loaded this time.
    fn fetch_listing(
        &self,
        page_no: u32,
    ) -> impl Future<Output = Result<Option<ListingPage>, AppError>> + Send;

    fn fetch_detail(&self, item: &Item)
    -> impl Future<Output = Result<DetailOutcome, AppError>> + Send;
}

/// [`Scraper`] implementation on top of a [`ListingSource`].
pub struct ListingScraper<L, Q, S>
where
    L: ListingSource,
    Q: TaskQueue,
    S: ItemStore,
{
    source: L,
    queue: Q,
    store: S,
    max_page_no: u32,
}

impl<L, Q, S> ListingScraper<L, Q, S>
where
    L: ListingSource,
    Q: TaskQueue,
    S: ItemStore,
{
    pub fn new(source: L, queue: Q, store: S, max_page_no: u32) -> Self {
        Self {
            source,
            queue,
            store,
            max_page_no,
        }
    }

    async fn execute_main(&self, page_no: u32) -> Result<TaskStatus, AppError> {
        let page = match self.source.fetch_listing(page_no).await {
            Ok(Some(page)) => page,
            Ok(None) => return Ok(TaskStatus::NeedRetry),
            Err(e) if e.is_retryable() => {
                tracing::warn!(page_no, error = %e, "Listing page unavailable");
                return Ok(TaskStatus::NeedRetry);
            }
            Err(e) => return Err(e),
        };

        let listed = page.items.len();
        let new_items = self.store.filter_unseen(page.items).await?;
        // Once a page contains known items, older pages are known too.
        let has_next = page.has_next && !new_items.is_empty() && new_items.len() == listed;

        tracing::info!(
            page_no,
            listed,
            new = new_items.len(),
            has_next,
            "Listing page scraped"
        );

        for item in new_items {
            self.queue.offer_task(&Task::sub(item)).await?;
        }
        if has_next && page_no < self.max_page_no {
            self.queue.offer_task(&Task::main_page(page_no + 1)).await?;
        }
        Ok(TaskStatus::Success)
    }

    async fn execute_sub(&self, item: &Item) -> Result<TaskStatus, AppError> {
        let outcome = match self.source.fetch_detail(item).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_not_found() => DetailOutcome::Gone,
            Err(e) if e.is_retryable() => {
                tracing::warn!(uri = %item.uri, error = %e, "Detail page unavailable");
                DetailOutcome::Unavailable
            }
            Err(e) => return Err(e),
        };

        match outcome {
            DetailOutcome::Found(detail) => {
                self.store.put_item(&detail).await?;
                Ok(TaskStatus::Success)
            }
            DetailOutcome::Gone => {
                tracing::info!(uri = %item.uri, "Item gone, abandoning");
                Ok(TaskStatus::Fail)
            }
            DetailOutcome::Unavailable => Ok(TaskStatus::NeedRetry),
        }
    }
}

impl<L, Q, S> Scraper for ListingScraper<L, Q, S>
where
    L: ListingSource,
    Q: TaskQueue,
    S: ItemStore,
{
    async fn start(&self) -> Result<(), AppError> {
        self.source.start().await
    }

    async fn end(&self) -> Result<(), AppError> {
        self.source.end().await
    }

    async fn execute_task(&self, task: &Task) -> Result<TaskStatus, AppError> {
        match &task.kind {
            TaskKind::Main { page_no } => self.execute_main(page_no.unwrap_or(1)).await,
            TaskKind::Sub { item } => self.execute_sub(item).await,
        }
    }
}
