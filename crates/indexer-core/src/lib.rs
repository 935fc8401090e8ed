pub mod config;
pub mod error;
pub mod listing;
pub mod memory;
pub mod models;
pub mod orchestra;
pub mod task;
pub mod task_queue;
pub mod timing;
pub mod traits;

#[cfg(test)]
mod testutil;

pub use config::OrchestraConfig;
pub use error::AppError;
pub use listing::{DetailOutcome, ListingPage, ListingScraper, ListingSource};
pub use memory::{MemoryItemStore, MemoryTaskQueue, MemoryThrottleStore};
pub use models::Item;
pub use orchestra::{OrchestraEvent, OrchestraReporter, TaskOrchestra, TracingOrchestraReporter};
pub use task::{Task, TaskKey, TaskKind, TaskStatus, TaskType};
pub use task_queue::{QueueName, TaskQueue};
pub use traits::{ItemStore, NullItemStore, Scraper, ThrottleStore};
