//! The task orchestra: a single-worker scheduler over a [`TaskQueue`].
//!
//! One loop owns the scheduler state and waits on two deadlines:
//!
//! ```text
//! pick tick ──> main queue ──(empty)──> failed queue ──(empty/dropped)──> force MAIN
//!     ^                                                                       |
//!     +------------------ jittered interval / time until next crawl ---------+
//!
//! watchdog ──> throttle store overdue? ──> run MAIN inline ──> every interval
//! ```
//!
//! Only one task executes at a time, also across `stop`/`start` cycles: a new
//! loop waits for the previous one to finish its execution. Consecutive
//! executions start at least `min_interval` apart.

use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use crate::config::OrchestraConfig;
use crate::error::AppError;
use crate::task::{Task, TaskStatus};
use crate::task_queue::{QueueName, TaskQueue};
use crate::traits::{Scraper, ThrottleStore};

/// Why the orchestra queued a MAIN task on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForceReason {
    /// No MAIN task succeeded within `min_check_interval`.
    Stale,
    /// Both queues were empty.
    QueueEmpty,
}

/// Events emitted by the orchestra for monitoring/logging.
#[derive(Debug, Clone)]
pub enum OrchestraEvent<'a> {
    Started,
    TaskPicked {
        task: &'a Task,
        queue: QueueName,
    },
    TaskFinished {
        task: &'a Task,
        status: TaskStatus,
    },
    TaskRequeued {
        task: &'a Task,
    },
    TaskDropped {
        task: &'a Task,
        max_retry_count: u32,
    },
    ScrapeError {
        task: &'a Task,
        error: &'a AppError,
    },
    MainTaskForced {
        reason: ForceReason,
    },
    StaleMainTaskRun {
        last_main_task_time: Option<DateTime<Utc>>,
    },
    StoreError {
        operation: &'static str,
        error: &'a AppError,
    },
    Stopped,
}

/// Trait for receiving orchestra events (decoupled logging/error reporting).
pub trait OrchestraReporter: Send + Sync {
    fn report(&self, event: OrchestraEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingOrchestraReporter;

impl OrchestraReporter for TracingOrchestraReporter {
    fn report(&self, event: OrchestraEvent<'_>) {
        match event {
            OrchestraEvent::Started => {
                tracing::info!("Task orchestra started");
            }
            OrchestraEvent::TaskPicked { task, queue } => {
                tracing::debug!(
                    task_id = %task.id,
                    key = %task.key(),
                    %queue,
                    retry_count = task.retry_count,
                    "Task picked"
                );
            }
            OrchestraEvent::TaskFinished { task, status } => {
                tracing::info!(task_id = %task.id, key = %task.key(), %status, "Task executed");
            }
            OrchestraEvent::TaskRequeued { task } => {
                tracing::info!(
                    task_id = %task.id,
                    retry_count = task.retry_count,
                    "Task offered to failed queue"
                );
            }
            OrchestraEvent::TaskDropped {
                task,
                max_retry_count,
            } => {
                tracing::warn!(
                    task_id = %task.id,
                    key = %task.key(),
                    retry_count = task.retry_count,
                    max_retry_count,
                    "Retry budget exhausted, task dropped"
                );
            }
            OrchestraEvent::ScrapeError { task, error } => {
                tracing::error!(
                    task_id = %task.id,
                    key = %task.key(),
                    %error,
                    retryable = error.is_retryable(),
                    "Scraper failed, task will be retried"
                );
            }
            OrchestraEvent::MainTaskForced { reason } => {
                tracing::info!(?reason, "Main task queued");
            }
            OrchestraEvent::StaleMainTaskRun {
                last_main_task_time,
            } => {
                tracing::info!(?last_main_task_time, "Full crawl overdue, running main task");
            }
            OrchestraEvent::StoreError { operation, error } => {
                tracing::error!(%operation, %error, "Store operation failed");
            }
            OrchestraEvent::Stopped => {
                tracing::info!("Task orchestra stopped");
            }
        }
    }
}

/// Scheduler bookkeeping. Held by the active run loop and kept across restarts.
#[derive(Debug, Default)]
struct SchedulerState {
    /// Last successful MAIN task completion.
    last_main_task_exe_time: Option<Instant>,
    /// Start of the last task execution of any kind.
    last_exe_time: Option<Instant>,
}

impl SchedulerState {
    /// Time left before another execution may start `gap` after the last one.
    fn spacing_remaining(&self, gap: Duration, now: Instant) -> Option<Duration> {
        let ready_at = self.last_exe_time? + gap;
        (now < ready_at).then(|| ready_at - now)
    }

    fn since_last_main(&self, now: Instant) -> Option<Duration> {
        self.last_main_task_exe_time
            .map(|last| now.saturating_duration_since(last))
    }

    fn is_main_task_stale(&self, now: Instant, max_age: Duration) -> bool {
        self.since_last_main(now).is_none_or(|age| age > max_age)
    }
}

/// Scheduler that drives a [`Scraper`] from a [`TaskQueue`].
pub struct TaskOrchestra<Q, T>
where
    Q: TaskQueue,
    T: ThrottleStore,
{
    queue: Q,
    throttle: T,
    config: OrchestraConfig,
    state: Mutex<SchedulerState>,
    cancel_token: StdMutex<Option<CancellationToken>>,
}

impl<Q, T> TaskOrchestra<Q, T>
where
    Q: TaskQueue,
    T: ThrottleStore,
{
    pub fn new(queue: Q, throttle: T, config: OrchestraConfig) -> Self {
        Self {
            queue,
            throttle,
            config,
            state: Mutex::new(SchedulerState::default()),
            cancel_token: StdMutex::new(None),
        }
    }

    pub fn config(&self) -> &OrchestraConfig {
        &self.config
    }

    pub fn task_queue(&self) -> &Q {
        &self.queue
    }

    /// Offer a task to the pending queue.
    pub async fn queue(&self, task: &Task) -> Result<(), AppError> {
        self.queue.offer_task(task).await
    }

    /// Spawn the run loop on the current tokio runtime.
    ///
    /// A previous run started through this method is cancelled first, and the
    /// new loop only starts once the previous one has returned. The returned
    /// handle resolves when the loop stops, with an error if the task queue
    /// became unreachable.
    pub fn start<S, R>(
        self: &Arc<Self>,
        scraper: Arc<S>,
        reporter: Arc<R>,
    ) -> JoinHandle<Result<(), AppError>>
    where
        Q: 'static,
        T: 'static,
        S: Scraper + 'static,
        R: OrchestraReporter + 'static,
    {
        let token = CancellationToken::new();
        let previous = self
            .cancel_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(token.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }

        let orchestra = Arc::clone(self);
        tokio::spawn(async move {
            orchestra
                .run(scraper.as_ref(), reporter.as_ref(), token)
                .await
        })
    }

    /// Cancel pending timers of the loop spawned by [`TaskOrchestra::start`].
    ///
    /// A task already executing runs to completion. Calling this more than
    /// once, or without a prior `start`, does nothing.
    pub fn stop(&self) {
        let token = self
            .cancel_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(token) = token {
            token.cancel();
        }
    }

    /// Run the scheduler loop until cancellation.
    ///
    /// Waits for any other running loop of this orchestra to return first.
    pub async fn run<S, R>(
        &self,
        scraper: &S,
        reporter: &R,
        cancel_token: CancellationToken,
    ) -> Result<(), AppError>
    where
        S: Scraper,
        R: OrchestraReporter,
    {
        let mut state = self.state.lock().await;
        if cancel_token.is_cancelled() {
            return Ok(());
        }
        reporter.report(OrchestraEvent::Started);

        let check_interval = self.config.timing.next_interval(self.config.min_interval);
        let mut next_check = Instant::now();
        let mut next_pick = Instant::now();

        let result = loop {
            if cancel_token.is_cancelled() {
                break Ok(());
            }

            tokio::select! {
                biased;
                () = cancel_token.cancelled() => break Ok(()),
                () = sleep_until(next_check) => {
                    if let Err(e) = self
                        .check_main_task(scraper, reporter, &mut state, check_interval)
                        .await
                    {
                        reporter.report(OrchestraEvent::StoreError {
                            operation: "check_main_task",
                            error: &e,
                        });
                        break Err(e);
                    }
                    next_check = Instant::now() + check_interval;
                }
                () = sleep_until(next_pick) => {
                    match self.tick(scraper, reporter, &mut state).await {
                        Ok(delay) => next_pick = Instant::now() + delay,
                        Err(e) => {
                            reporter.report(OrchestraEvent::StoreError {
                                operation: "tick",
                                error: &e,
                            });
                            break Err(e);
                        }
                    }
                }
            }
        };

        reporter.report(OrchestraEvent::Stopped);
        result
    }

    /// One decision cycle. Returns the delay until the next cycle.
    async fn tick<S, R>(
        &self,
        scraper: &S,
        reporter: &R,
        state: &mut SchedulerState,
    ) -> Result<Duration, AppError>
    where
        S: Scraper,
        R: OrchestraReporter,
    {
        if let Some(wait) = state.spacing_remaining(self.config.min_interval, Instant::now()) {
            return Ok(wait);
        }

        let interval = self.config.timing.next_interval(self.config.min_interval);

        let mut executed = self.pick_task(scraper, reporter, state).await?;
        if !executed {
            executed = self.pick_failed_task(scraper, reporter, state).await?;
        }

        let now = Instant::now();
        if state.is_main_task_stale(now, self.config.min_check_interval) {
            reporter.report(OrchestraEvent::MainTaskForced {
                reason: ForceReason::Stale,
            });
            self.queue(&Task::main()).await?;
            return Ok(interval);
        }

        if executed {
            return Ok(interval);
        }

        reporter.report(OrchestraEvent::MainTaskForced {
            reason: ForceReason::QueueEmpty,
        });
        self.queue(&Task::main()).await?;
        let offset = state.since_last_main(now).unwrap_or_default();
        Ok(self
            .config
            .min_check_interval
            .saturating_sub(offset)
            .max(interval))
    }

    /// Execute one task from the pending queue. Returns false if it was empty.
    async fn pick_task<S, R>(
        &self,
        scraper: &S,
        reporter: &R,
        state: &mut SchedulerState,
    ) -> Result<bool, AppError>
    where
        S: Scraper,
        R: OrchestraReporter,
    {
        if !self.queue.has_task().await? {
            return Ok(false);
        }
        let Some(task) = self.queue.poll_task().await? else {
            return Ok(false);
        };

        reporter.report(OrchestraEvent::TaskPicked {
            task: &task,
            queue: QueueName::Task,
        });
        let status = self.execute(scraper, reporter, &task, state).await;
        self.settle(reporter, &task, status, state).await?;
        Ok(true)
    }

    /// Execute one task from the failed queue.
    ///
    /// Returns false if the queue was empty or the polled task was dropped
    /// for exceeding the retry budget.
    async fn pick_failed_task<S, R>(
        &self,
        scraper: &S,
        reporter: &R,
        state: &mut SchedulerState,
    ) -> Result<bool, AppError>
    where
        S: Scraper,
        R: OrchestraReporter,
    {
        if !self.queue.has_failed_task().await? {
            return Ok(false);
        }
        let Some(task) = self.queue.poll_failed_task().await? else {
            return Ok(false);
        };

        if task.retry_count > self.config.max_retry_count {
            reporter.report(OrchestraEvent::TaskDropped {
                task: &task,
                max_retry_count: self.config.max_retry_count,
            });
            return Ok(false);
        }

        reporter.report(OrchestraEvent::TaskPicked {
            task: &task,
            queue: QueueName::Failed,
        });
        let status = self.execute(scraper, reporter, &task, state).await;
        self.settle(reporter, &task, status, state).await?;
        Ok(true)
    }

    /// Run the full crawl inline if the durable throttle record says it is overdue.
    ///
    /// Throttle store failures skip the round. Failing to requeue the task
    /// afterwards is an error.
    async fn check_main_task<S, R>(
        &self,
        scraper: &S,
        reporter: &R,
        state: &mut SchedulerState,
        interval: Duration,
    ) -> Result<(), AppError>
    where
        S: Scraper,
        R: OrchestraReporter,
    {
        let last_main_task_time = match self.throttle.get_last_main_task_time().await {
            Ok(time) => time,
            Err(e) => {
                reporter.report(OrchestraEvent::StoreError {
                    operation: "get_last_main_task_time",
                    error: &e,
                });
                return Ok(());
            }
        };

        let overdue = match last_main_task_time {
            None => true,
            Some(last) => (Utc::now() - last)
                .to_std()
                .is_ok_and(|elapsed| elapsed >= self.config.min_check_interval),
        };
        if !overdue || state.spacing_remaining(interval, Instant::now()).is_some() {
            return Ok(());
        }

        if let Err(e) = self.throttle.set_last_main_task_time().await {
            reporter.report(OrchestraEvent::StoreError {
                operation: "set_last_main_task_time",
                error: &e,
            });
            return Ok(());
        }

        reporter.report(OrchestraEvent::StaleMainTaskRun {
            last_main_task_time,
        });
        let task = Task::main();
        let status = self.execute(scraper, reporter, &task, state).await;
        self.settle(reporter, &task, status, state).await
    }

    async fn execute<S, R>(
        &self,
        scraper: &S,
        reporter: &R,
        task: &Task,
        state: &mut SchedulerState,
    ) -> TaskStatus
    where
        S: Scraper,
        R: OrchestraReporter,
    {
        state.last_exe_time = Some(Instant::now());

        let status = match scraper.execute_task(task).await {
            Ok(status) => status,
            Err(error) => {
                reporter.report(OrchestraEvent::ScrapeError {
                    task,
                    error: &error,
                });
                TaskStatus::NeedRetry
            }
        };

        reporter.report(OrchestraEvent::TaskFinished { task, status });
        status
    }

    /// Apply the outcome of an execution to the queues and scheduler state.
    ///
    /// The task has already left its queue, so a failed requeue is returned
    /// rather than swallowed.
    async fn settle<R>(
        &self,
        reporter: &R,
        task: &Task,
        status: TaskStatus,
        state: &mut SchedulerState,
    ) -> Result<(), AppError>
    where
        R: OrchestraReporter,
    {
        match status {
            TaskStatus::NeedRetry => {
                self.queue.offer_failed_task(task).await?;
                reporter.report(OrchestraEvent::TaskRequeued { task });
            }
            TaskStatus::Success if task.is_main() => {
                state.last_main_task_exe_time = Some(Instant::now());
            }
            TaskStatus::Success | TaskStatus::Fail => {}
        }
        Ok(())
    }
}
