//! Test utilities: mock implementations of the core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use crate::error::AppError;
use crate::listing::{DetailOutcome, ListingPage, ListingSource};
use crate::memory::MemoryTaskQueue;
use crate::models::Item;
use crate::orchestra::{OrchestraEvent, OrchestraReporter};
use crate::task::{Task, TaskStatus};
use crate::task_queue::{QueueName, TaskQueue};
use crate::traits::Scraper;

// ---------------------------------------------------------------------------
// MockScraper
// ---------------------------------------------------------------------------

/// Mock scraper that answers every task of a type with a fixed outcome and
/// records what it executed and when.
#[derive(Clone)]
pub struct MockScraper {
    main_status: TaskStatus,
    sub_status: TaskStatus,
    sub_error: bool,
    executions: Arc<Mutex<Vec<(Task, Instant)>>>,
}

impl MockScraper {
    pub fn succeeding() -> Self {
        Self {
            main_status: TaskStatus::Success,
            sub_status: TaskStatus::Success,
            sub_error: false,
            executions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_main_status(mut self, status: TaskStatus) -> Self {
        self.main_status = status;
        self
    }

    pub fn with_sub_status(mut self, status: TaskStatus) -> Self {
        self.sub_status = status;
        self
    }

    /// SUB tasks fail with an error instead of a status.
    pub fn with_sub_error(mut self) -> Self {
        self.sub_error = true;
        self
    }

    pub fn executions(&self) -> Vec<Task> {
        self.executions
            .lock()
            .unwrap()
            .iter()
            .map(|(task, _)| task.clone())
            .collect()
    }

    pub fn execution_times(&self) -> Vec<Instant> {
        self.executions
            .lock()
            .unwrap()
            .iter()
            .map(|(_, at)| *at)
            .collect()
    }

    pub fn execution_count(&self) -> usize {
        self.executions.lock().unwrap().len()
    }

    /// Number of executions of the SUB task for `uri`.
    pub fn executions_of(&self, uri: &str) -> usize {
        self.executions
            .lock()
            .unwrap()
            .iter()
            .filter(|(task, _)| task.item().is_some_and(|item| item.uri == uri))
            .count()
    }
}

impl Scraper for MockScraper {
    async fn execute_task(&self, task: &Task) -> Result<TaskStatus, AppError> {
        self.executions
            .lock()
            .unwrap()
            .push((task.clone(), Instant::now()));

        if task.is_main() {
            return Ok(self.main_status);
        }
        if self.sub_error {
            return Err(AppError::NetworkError("connection reset".into()));
        }
        Ok(self.sub_status)
    }
}

// ---------------------------------------------------------------------------
// SlowScraper
// ---------------------------------------------------------------------------

/// Scraper whose executions take a fixed time. Records how many executions
/// overlapped and when each one started.
#[derive(Clone)]
pub struct SlowScraper {
    duration: Duration,
    running: Arc<AtomicUsize>,
    max_running: Arc<AtomicUsize>,
    started: Arc<Mutex<Vec<Instant>>>,
}

impl SlowScraper {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            running: Arc::new(AtomicUsize::new(0)),
            max_running: Arc::new(AtomicUsize::new(0)),
            started: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    pub fn start_times(&self) -> Vec<Instant> {
        self.started.lock().unwrap().clone()
    }
}

impl Scraper for SlowScraper {
    async fn execute_task(&self, _task: &Task) -> Result<TaskStatus, AppError> {
        self.started.lock().unwrap().push(Instant::now());
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(running, Ordering::SeqCst);
        tokio::time::sleep(self.duration).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(TaskStatus::Success)
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Mock orchestra reporter that records event labels.
#[derive(Default)]
pub struct MockReporter {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, label: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.as_str() == label)
            .count()
    }
}

impl OrchestraReporter for MockReporter {
    fn report(&self, event: OrchestraEvent<'_>) {
        let label = match &event {
            OrchestraEvent::Started => "Started",
            OrchestraEvent::TaskPicked { .. } => "TaskPicked",
            OrchestraEvent::TaskFinished { .. } => "TaskFinished",
            OrchestraEvent::TaskRequeued { .. } => "TaskRequeued",
            OrchestraEvent::TaskDropped { .. } => "TaskDropped",
            OrchestraEvent::ScrapeError { .. } => "ScrapeError",
            OrchestraEvent::MainTaskForced { .. } => "MainTaskForced",
            OrchestraEvent::StaleMainTaskRun { .. } => "StaleMainTaskRun",
            OrchestraEvent::StoreError { .. } => "StoreError",
            OrchestraEvent::Stopped => "Stopped",
        };
        self.events.lock().unwrap().push(label.to_string());
    }
}

// ---------------------------------------------------------------------------
// FailingTaskQueue
// ---------------------------------------------------------------------------

/// Task queue whose backing store is unreachable.
#[derive(Debug, Clone)]
pub struct FailingTaskQueue;

fn unreachable_store() -> AppError {
    AppError::DatabaseError("connection refused".into())
}

impl TaskQueue for FailingTaskQueue {
    async fn offer_task(&self, _task: &Task) -> Result<(), AppError> {
        Err(unreachable_store())
    }

    async fn poll_task(&self) -> Result<Option<Task>, AppError> {
        Err(unreachable_store())
    }

    async fn offer_failed_task(&self, _task: &Task) -> Result<(), AppError> {
        Err(unreachable_store())
    }

    async fn poll_failed_task(&self) -> Result<Option<Task>, AppError> {
        Err(unreachable_store())
    }

    async fn has_task(&self) -> Result<bool, AppError> {
        Err(unreachable_store())
    }

    async fn has_failed_task(&self) -> Result<bool, AppError> {
        Err(unreachable_store())
    }

    async fn len(&self, _queue: QueueName) -> Result<u64, AppError> {
        Err(unreachable_store())
    }
}

// ---------------------------------------------------------------------------
// RejectingFailedQueue
// ---------------------------------------------------------------------------

/// In-memory queue whose failed queue refuses every offer.
#[derive(Debug, Clone, Default)]
pub struct RejectingFailedQueue {
    pub inner: MemoryTaskQueue,
}

impl TaskQueue for RejectingFailedQueue {
    async fn offer_task(&self, task: &Task) -> Result<(), AppError> {
        self.inner.offer_task(task).await
    }

    async fn poll_task(&self) -> Result<Option<Task>, AppError> {
        self.inner.poll_task().await
    }

    async fn offer_failed_task(&self, _task: &Task) -> Result<(), AppError> {
        Err(unreachable_store())
    }

    async fn poll_failed_task(&self) -> Result<Option<Task>, AppError> {
        self.inner.poll_failed_task().await
    }

    async fn has_task(&self) -> Result<bool, AppError> {
        self.inner.has_task().await
    }

    async fn has_failed_task(&self) -> Result<bool, AppError> {
        self.inner.has_failed_task().await
    }

    async fn len(&self, queue: QueueName) -> Result<u64, AppError> {
        self.inner.len(queue).await
    }
}

// ---------------------------------------------------------------------------
// MockListingSource
// ---------------------------------------------------------------------------

/// Listing source serving canned pages and detail outcomes.
#[derive(Clone, Default)]
pub struct MockListingSource {
    /// Page number -> page. Missing pages are reported as unavailable.
    pages: Arc<Mutex<HashMap<u32, ListingPage>>>,
    /// URI -> detail outcome. Missing URIs resolve as `Found`.
    details: Arc<Mutex<HashMap<String, DetailOutcome>>>,
    detail_error: Arc<Mutex<Option<AppError>>>,
    listing_error: Arc<Mutex<Option<AppError>>>,
    pub fetched_pages: Arc<Mutex<Vec<u32>>>,
}

impl MockListingSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, page_no: u32, uris: &[&str], has_next: bool) -> Self {
        let page = ListingPage {
            items: uris.iter().map(|uri| Item::new(*uri)).collect(),
            has_next,
        };
        self.pages.lock().unwrap().insert(page_no, page);
        self
    }

    pub fn with_detail(self, uri: &str, outcome: DetailOutcome) -> Self {
        self.details
            .lock()
            .unwrap()
            .insert(uri.to_string(), outcome);
        self
    }

    pub fn with_detail_error(self, error: AppError) -> Self {
        *self.detail_error.lock().unwrap() = Some(error);
        self
    }

    /// The next listing fetch fails with `error`.
    pub fn with_listing_error(self, error: AppError) -> Self {
        *self.listing_error.lock().unwrap() = Some(error);
        self
    }
}

impl ListingSource for MockListingSource {
    async fn fetch_listing(&self, page_no: u32) -> Result<Option<ListingPage>, AppError> {
        self.fetched_pages.lock().unwrap().push(page_no);
        if let Some(e) = self.listing_error.lock().unwrap().take() {
            return Err(e);
        }
        Ok(self.pages.lock().unwrap().get(&page_no).cloned())
    }

    async fn fetch_detail(&self, item: &Item) -> Result<DetailOutcome, AppError> {
        if let Some(e) = self.detail_error.lock().unwrap().take() {
            return Err(e);
        }
        let outcome = self.details.lock().unwrap().get(&item.uri).cloned();
        Ok(outcome.unwrap_or_else(|| DetailOutcome::Found(item.clone().with_title("detail"))))
    }
}
