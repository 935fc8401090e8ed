//! Randomised spacing between task executions.
//!
//! Scraped sites see requests at irregular intervals between the configured
//! floor and twice the floor.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use indexer_core::timing::TaskTiming;
//!
//! let timing = TaskTiming::Jittered;
//! let interval = timing.next_interval(Duration::from_secs(10));
//! assert!(interval >= Duration::from_secs(10));
//! assert!(interval <= Duration::from_secs(20));
//! ```

use std::time::Duration;

use rand::Rng;

/// Strategy for turning the configured minimum interval into an actual delay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TaskTiming {
    /// `floor + uniform[0, floor]`.
    #[default]
    Jittered,
    /// Exactly `floor`. For tests and replay.
    Fixed,
}

impl TaskTiming {
    /// Compute the delay before the next execution.
    pub fn next_interval(&self, floor: Duration) -> Duration {
        match self {
            TaskTiming::Fixed => floor,
            TaskTiming::Jittered => floor + Duration::from_millis(rand_jitter_ms(floor)),
        }
    }
}

fn rand_jitter_ms(max: Duration) -> u64 {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return 0;
    }
    rand::thread_rng().gen_range(0..=max_ms)
}
