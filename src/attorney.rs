use std::time::Duration;

use crate::errors::{QueueError, Result};
use crate::options::{PublishOptions, SubscribeOptions};

const DEFAULT_EXPIRE_IN: &str = "15 minutes";
const MIN_CHECK_INTERVAL_MS: u64 = 100;

/// Normalized insert arguments derived from `PublishOptions`.
#[derive(Debug, Clone)]
pub(crate) struct InsertArgs {
    pub(crate) retry_limit: i32,
    pub(crate) start_in: String,
    pub(crate) expire_in: String,
    pub(crate) singleton_key: Option<String>,
    pub(crate) singleton_seconds: Option<i32>,
    pub(crate) singleton_next_slot: bool,
}

pub(crate) fn check_publish_args(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(QueueError::InvalidArgument(
            "job name is required on publish".to_string(),
        ));
    }

    Ok(())
}

/// Coerces the two interval forms to one duration. The seconds form wins
/// when both are present; invalid values fail before any worker exists.
pub(crate) fn apply_new_job_check_interval(
    options: &SubscribeOptions,
    fallback: Duration,
) -> Result<Duration> {
    if let Some(ms) = options.new_job_check_interval {
        if ms < MIN_CHECK_INTERVAL_MS {
            return Err(QueueError::InvalidArgument(format!(
                "newJobCheckInterval must be at least {MIN_CHECK_INTERVAL_MS}ms"
            )));
        }
    }

    if let Some(seconds) = options.new_job_check_interval_seconds {
        if seconds < 1 {
            return Err(QueueError::InvalidArgument(
                "newJobCheckIntervalSeconds must be at least every second".to_string(),
            ));
        }

        return Ok(Duration::from_secs(seconds));
    }

    Ok(options
        .new_job_check_interval
        .map(Duration::from_millis)
        .unwrap_or(fallback))
}

pub(crate) fn apply_team_size(options: &SubscribeOptions) -> Result<usize> {
    match options.team_size {
        Some(0) => Err(QueueError::InvalidArgument(
            "teamSize must be at least 1".to_string(),
        )),
        Some(size) => Ok(size),
        None => Ok(1),
    }
}

/// Derives the insert plan arguments: defaults, interval rendering, and the
/// singleton window collapsed to seconds (first unit set wins, smallest
/// first).
pub(crate) fn plan_insert(options: PublishOptions) -> Result<InsertArgs> {
    let retry_limit = options.retry_limit.unwrap_or(0);
    if retry_limit < 0 {
        return Err(QueueError::InvalidArgument(
            "retryLimit must be non-negative".to_string(),
        ));
    }

    let singleton_seconds = options
        .singleton_seconds
        .or(options.singleton_minutes.map(|m| m * 60))
        .or(options.singleton_hours.map(|h| h * 3600))
        .or(options.singleton_days.map(|d| d * 86400));

    if let Some(seconds) = singleton_seconds {
        if seconds < 1 {
            return Err(QueueError::InvalidArgument(
                "singleton window must be at least one second".to_string(),
            ));
        }
    }

    Ok(InsertArgs {
        retry_limit,
        start_in: options.start_in.unwrap_or_default().as_interval(),
        expire_in: options
            .expire_in
            .unwrap_or_else(|| DEFAULT_EXPIRE_IN.to_string()),
        singleton_key: options.singleton_key,
        singleton_seconds,
        singleton_next_slot: options.singleton_next_slot,
    })
}
