use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Item;

/// Kind of work a task represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    /// Scan a listing page for new items.
    Main,
    /// Fetch the detail page of one discovered item.
    Sub,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Main => "main",
            TaskType::Sub => "sub",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "main" => Ok(TaskType::Main),
            "sub" => Ok(TaskType::Sub),
            _ => Err(format!("Unknown task type: {}", s)),
        }
    }
}

/// Outcome reported by a scraper for one task execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Success,
    /// Permanent failure. The task is abandoned.
    Fail,
    /// Transient failure. The task goes to the failed queue.
    NeedRetry,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Success => "success",
            TaskStatus::Fail => "fail",
            TaskStatus::NeedRetry => "need_retry",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Type-specific payload of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TaskKind {
    /// `page_no` of `None` means the first page.
    Main { page_no: Option<u32> },
    Sub { item: Item },
}

/// Queue identity of a task. Offering a task whose key is already queued
/// replaces the queued entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskKey {
    Main(u32),
    Sub(String),
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKey::Main(page_no) => write!(f, "main:{page_no}"),
            TaskKey::Sub(uri) => write!(f, "sub:{uri}"),
        }
    }
}

/// A unit of scrape work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    #[serde(flatten)]
    pub kind: TaskKind,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Number of times this task was polled back out of the failed queue.
    #[serde(default)]
    pub retry_count: u32,
    /// Last time the task was offered to a queue. Set by the queue store.
    #[serde(default)]
    pub update_time: Option<DateTime<Utc>>,
}

impl Task {
    fn with_kind(kind: TaskKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            timestamp: Utc::now(),
            retry_count: 0,
            update_time: None,
        }
    }

    /// A MAIN task for the first listing page.
    pub fn main() -> Self {
        Self::with_kind(TaskKind::Main { page_no: None })
    }

    /// A MAIN task for a specific listing page (1-based).
    pub fn main_page(page_no: u32) -> Self {
        Self::with_kind(TaskKind::Main {
            page_no: Some(page_no),
        })
    }

    pub fn sub(item: Item) -> Self {
        Self::with_kind(TaskKind::Sub { item })
    }

    pub fn task_type(&self) -> TaskType {
        match self.kind {
            TaskKind::Main { .. } => TaskType::Main,
            TaskKind::Sub { .. } => TaskType::Sub,
        }
    }

    pub fn is_main(&self) -> bool {
        self.task_type() == TaskType::Main
    }

    /// Listing page number for MAIN tasks, defaulting to 1.
    pub fn page_no(&self) -> Option<u32> {
        match &self.kind {
            TaskKind::Main { page_no } => Some(page_no.unwrap_or(1)),
            TaskKind::Sub { .. } => None,
        }
    }

    pub fn item(&self) -> Option<&Item> {
        match &self.kind {
            TaskKind::Main { .. } => None,
            TaskKind::Sub { item } => Some(item),
        }
    }

    pub fn key(&self) -> TaskKey {
        match &self.kind {
            TaskKind::Main { page_no } => TaskKey::Main(page_no.unwrap_or(1)),
            TaskKind::Sub { item } => TaskKey::Sub(item.uri.clone()),
        }
    }

    /// True if both tasks share the same queue identity.
    pub fn is_same_task(&self, other: &Task) -> bool {
        self.key() == other.key()
    }
}
