use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur while operating the job queue.
///
/// Validation failures are raised synchronously before any SQL executes;
/// storage errors are propagated unchanged from the executor.
#[derive(Error, Debug)]
pub enum QueueError {
    /// An error occurred while executing an SQL plan
    #[error("error occured while query: {0}")]
    Sql(#[from] sqlx::Error),

    /// An error occurred while serializing the job payload
    #[error("error while serializing payload: {0}")]
    Json(#[from] serde_json::Error),

    /// A caller-supplied argument or option failed validation
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A state transition matched no row for the given job id
    #[error("could not {operation} job {id}: no matching job")]
    JobNotFound {
        /// The operation that found nothing to update
        operation: &'static str,
        /// The id that matched no row
        id: Uuid,
    },

    /// A subscriber's handler returned an error or panicked
    #[error("job handler failed: {0}")]
    Handler(String),
}

/// A Result type alias for QueueError.
pub type Result<T> = core::result::Result<T, QueueError>;
