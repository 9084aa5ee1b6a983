use thiserror::Error;

use crate::cron::CronError;
use crate::tasks::TaskStatus;

/// Errors returned by task operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// No task with the given ID exists in the store.
    #[error("Task not found: {id}")]
    TaskNotFound { id: u32 },

    /// The cron expression was rejected; nothing was changed.
    #[error("Invalid cron for task {id}: {source}")]
    InvalidCron {
        id: u32,
        #[source]
        source: CronError,
    },

    /// The operation does not apply to the task's current status.
    #[error("Task {id} is {status}: {reason}")]
    InvalidTransition {
        id: u32,
        status: TaskStatus,
        reason: &'static str,
    },

    /// A run of this task is still in flight.
    #[error("Task {id} is already running")]
    AlreadyRunning { id: u32 },

    /// The clock task has shut down, so one-shot jobs cannot be submitted.
    #[error("Scheduler clock is not running")]
    ClockStopped,
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
