use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use getset::Getters;
use serde_json::Value;
use uuid::Uuid;

/// Lifecycle states of a persisted job.
///
/// Transitions: `created → active → {completed, cancelled, expired}`;
/// `expired → active` and `retry → active` on re-fetch. `completed` and
/// `cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    /// Persisted, waiting for its `start_after` to pass
    Created,
    /// Claimed by a worker, visibility window running
    Active,
    /// Finished successfully
    Completed,
    /// Visibility window elapsed without completion
    Expired,
    /// Cancelled by a caller
    Cancelled,
    /// Released for another attempt
    Retry,
}

impl JobState {
    /// The literal stored in the `state` column and embedded in plan text.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Created => "created",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Expired => "expired",
            JobState::Cancelled => "cancelled",
            JobState::Retry => "retry",
        }
    }
}

impl Display for JobState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A claimed job as handed to workers and emitted on the `job` event.
///
/// The fetch plan returns the row's id, payload and claim timestamp; the
/// queue name is attached by the manager since the plan does not echo it.
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub")]
pub struct Job {
    /// Unique job id
    id: Uuid,
    /// The queue/channel key the job was published under
    name: String,
    /// The JSON payload of the job
    data: Value,
    /// When the row was claimed by the store
    started_at: Option<DateTime<Utc>>,
}

impl Job {
    pub(crate) fn new(
        id: Uuid,
        name: String,
        data: Value,
        started_at: Option<DateTime<Utc>>,
    ) -> Self {
        Job {
            id,
            name,
            data,
            started_at,
        }
    }
}
