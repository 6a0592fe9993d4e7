//! Scheduler error types.

/// Errors building or running the scheduler.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// A cron expression did not parse; fatal at build time.
    #[error("invalid schedule {expression:?} for {name}: {reason}")]
    ScheduleInvalid {
        name: String,
        expression: String,
        reason: String,
    },
}

/// Result type for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;
