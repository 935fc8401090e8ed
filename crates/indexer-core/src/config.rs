use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;
use crate::timing::TaskTiming;

/// Scheduling and retry settings for the task orchestra.
#[derive(Debug, Clone)]
pub struct OrchestraConfig {
    /// Floor of the spacing between two task executions.
    pub min_interval: Duration,
    /// Longest allowed gap between two successful full crawls.
    pub min_check_interval: Duration,
    /// A failed task polled with a higher retry count is dropped.
    pub max_retry_count: u32,
    /// Deepest listing page a crawl follows. Read by scrapers, not the orchestra.
    pub max_page_no: u32,
    pub timing: TaskTiming,
}

impl Default for OrchestraConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(10),
            min_check_interval: Duration::from_secs(15 * 60),
            max_retry_count: 5,
            max_page_no: 5,
            timing: TaskTiming::Jittered,
        }
    }
}

impl OrchestraConfig {
    /// Read configuration from environment variables.
    ///
    /// - `MIN_INTERVAL` (milliseconds, defaults to 10000)
    /// - `MIN_CHECK_INTERVAL` (milliseconds, defaults to 900000)
    /// - `MAX_RETRY_COUNT` (defaults to 5)
    /// - `MAX_PAGE_NO` (defaults to 5)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`OrchestraConfig::from_env`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let min_interval = match lookup("MIN_INTERVAL") {
            None => defaults.min_interval,
            Some(raw) => Duration::from_millis(parse_positive::<u64>("MIN_INTERVAL", &raw)?),
        };
        let min_check_interval = match lookup("MIN_CHECK_INTERVAL") {
            None => defaults.min_check_interval,
            Some(raw) => {
                Duration::from_millis(parse_positive::<u64>("MIN_CHECK_INTERVAL", &raw)?)
            }
        };
        let max_retry_count = match lookup("MAX_RETRY_COUNT") {
            None => defaults.max_retry_count,
            Some(raw) => raw.trim().parse().map_err(|_| {
                AppError::ConfigError(format!(
                    "Invalid MAX_RETRY_COUNT '{raw}': must be a non-negative integer"
                ))
            })?,
        };
        let max_page_no = match lookup("MAX_PAGE_NO") {
            None => defaults.max_page_no,
            Some(raw) => parse_positive::<u32>("MAX_PAGE_NO", &raw)?,
        };

        Ok(Self {
            min_interval,
            min_check_interval,
            max_retry_count,
            max_page_no,
            timing: defaults.timing,
        })
    }

    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    pub fn with_min_check_interval(mut self, interval: Duration) -> Self {
        self.min_check_interval = interval;
        self
    }

    pub fn with_max_retry_count(mut self, count: u32) -> Self {
        self.max_retry_count = count;
        self
    }

    pub fn with_max_page_no(mut self, page_no: u32) -> Self {
        self.max_page_no = page_no;
        self
    }

    pub fn with_timing(mut self, timing: TaskTiming) -> Self {
        self.timing = timing;
        self
    }
}

fn parse_positive<T>(name: &str, raw: &str) -> Result<T, AppError>
where
    T: FromStr + PartialOrd + From<u8>,
{
    let parsed: T = raw.trim().parse().map_err(|_| {
        AppError::ConfigError(format!("Invalid {name} '{raw}': must be a positive integer"))
    })?;
    if parsed < T::from(1) {
        return Err(AppError::ConfigError(format!("{name} must be at least 1")));
    }
    Ok(parsed)
}
