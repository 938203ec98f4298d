use std::time::Duration;

use derive_builder::Builder;
use getset::{Getters, Setters};
use serde_json::Value;

use crate::ids::IdKind;

/// When a published job becomes fetchable, relative to now.
///
/// Accepted as a non-negative number of seconds or as interval text the
/// store can parse (`"30 seconds"`, `"2 hours"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartIn {
    Seconds(u64),
    Interval(String),
}

impl Default for StartIn {
    fn default() -> Self {
        StartIn::Seconds(0)
    }
}

impl StartIn {
    /// The interval text bound into the insert plan.
    pub(crate) fn as_interval(&self) -> String {
        match self {
            StartIn::Seconds(seconds) => seconds.to_string(),
            StartIn::Interval(interval) => interval.clone(),
        }
    }
}

impl From<u64> for StartIn {
    fn from(seconds: u64) -> Self {
        StartIn::Seconds(seconds)
    }
}

impl From<&str> for StartIn {
    fn from(interval: &str) -> Self {
        StartIn::Interval(interval.to_string())
    }
}

/// Options accepted by `publish`.
///
/// All fields are optional; the attorney fills in defaults and derives the
/// singleton window before the insert plan runs.
///
/// ```
/// use foreman::PublishOptions;
///
/// let options = PublishOptions::builder()
///     .retry_limit(2)
///     .expire_in("30 seconds")
///     .singleton_key("tenant-7")
///     .singleton_minutes(5)
///     .build();
/// ```
#[derive(Getters, Setters, Debug, Default, Clone, Builder)]
#[getset(get = "pub", set = "pub")]
#[builder(
    build_fn(private, name = "build_internal"),
    setter(strip_option),
    default,
    pattern = "owned"
)]
pub struct PublishOptions {
    /// Delay before the job becomes fetchable; default immediate.
    #[builder(setter(into))]
    pub start_in: Option<StartIn>,

    /// Visibility window for an active job; default "15 minutes".
    #[builder(setter(into))]
    pub expire_in: Option<String>,

    /// How many times an expired job may be re-claimed; default 0.
    pub retry_limit: Option<i32>,

    /// Correlation key enforcing at-most-one non-terminal job per
    /// (name, key), or per time bucket when a singleton window is set.
    #[builder(setter(into))]
    pub singleton_key: Option<String>,

    /// Throttle bucket width in seconds.
    pub singleton_seconds: Option<i32>,

    /// Throttle bucket width in minutes; ignored when seconds is set.
    pub singleton_minutes: Option<i32>,

    /// Throttle bucket width in hours; ignored when a smaller unit is set.
    pub singleton_hours: Option<i32>,

    /// Throttle bucket width in days; ignored when a smaller unit is set.
    pub singleton_days: Option<i32>,

    /// On singleton conflict, place the duplicate in the next bucket
    /// instead of suppressing it.
    pub singleton_next_slot: bool,
}

impl PublishOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> PublishOptionsBuilder {
        PublishOptionsBuilder::default()
    }
}

impl PublishOptionsBuilder {
    pub fn build(self) -> PublishOptions {
        self.build_internal()
            .expect("There is a default value for all fields")
    }
}

/// The single-argument publish form: name, payload and options in one value.
#[derive(Getters, Debug, Clone, Builder)]
#[getset(get = "pub")]
#[builder(build_fn(private, name = "build_internal"), pattern = "owned")]
pub struct PublishRequest {
    /// The queue/channel key
    #[builder(setter(into))]
    pub name: String,

    /// The JSON payload
    pub data: Value,

    /// Publish options; defaults apply when omitted
    #[builder(default)]
    pub options: PublishOptions,
}

impl PublishRequest {
    pub fn builder() -> PublishRequestBuilder {
        PublishRequestBuilder::default()
    }
}

impl PublishRequestBuilder {
    pub fn build(self) -> PublishRequest {
        self.build_internal()
            .expect("name and data are required to build a PublishRequest")
    }
}

/// Options accepted by `subscribe`.
#[derive(Getters, Setters, Debug, Default, Clone, Builder)]
#[getset(get = "pub", set = "pub")]
#[builder(
    build_fn(private, name = "build_internal"),
    setter(strip_option),
    default,
    pattern = "owned"
)]
pub struct SubscribeOptions {
    /// Number of polling workers for this subscription; default 1.
    pub team_size: Option<usize>,

    /// Poll interval in milliseconds; at least 100.
    pub new_job_check_interval: Option<u64>,

    /// Poll interval in seconds; at least 1. Wins over the millisecond form.
    pub new_job_check_interval_seconds: Option<u64>,
}

impl SubscribeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> SubscribeOptionsBuilder {
        SubscribeOptionsBuilder::default()
    }
}

impl SubscribeOptionsBuilder {
    pub fn build(self) -> SubscribeOptions {
        self.build_internal()
            .expect("There is a default value for all fields")
    }
}

/// Manager-wide configuration.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Schema the plans are keyed by
    pub(crate) schema: String,
    /// How often the expiration monitor sweeps
    pub(crate) expire_check_interval: Duration,
    /// Default worker poll interval when a subscription sets none
    pub(crate) new_job_check_interval: Duration,
    /// UUID variant for generated job ids
    pub(crate) uuid: IdKind,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        ManagerConfig {
            schema: "foreman".to_string(),
            expire_check_interval: Duration::from_secs(60),
            new_job_check_interval: Duration::from_millis(1000),
            uuid: IdKind::default(),
        }
    }
}

impl ManagerConfig {
    pub fn schema(mut self, value: &str) -> Self {
        self.schema = value.to_string();
        self
    }

    pub fn expire_check_interval(mut self, value: Duration) -> Self {
        self.expire_check_interval = value;
        self
    }

    pub fn new_job_check_interval(mut self, value: Duration) -> Self {
        self.new_job_check_interval = value;
        self
    }

    pub fn uuid(mut self, value: IdKind) -> Self {
        self.uuid = value;
        self
    }
}
