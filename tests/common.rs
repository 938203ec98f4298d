#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use foreman::{
    IdKind, JobRow, JobState, Manager, ManagerConfig, Plans, QueueError, SqlExecutor, SqlOutcome,
    SqlParam,
};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::sync::OnceCell;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

pub const TEST_SCHEMA: &str = "foreman_test";

/// One persisted row, as the store would hold it.
#[derive(Debug, Clone)]
pub struct StoredJob {
    pub id: Uuid,
    pub name: String,
    pub data: Value,
    pub state: JobState,
    pub retry_limit: i32,
    pub retry_count: i32,
    pub start_after: DateTime<Utc>,
    pub expire_in: Duration,
    pub singleton_key: Option<String>,
    pub singleton_on: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// In-memory stand-in for the storage backend.
///
/// Recognizes the prepared plan texts by equality and applies the same row
/// semantics the real store would: atomic single-row claims, partial
/// singleton uniqueness, monotonic expiration.
pub struct MemoryStore {
    plans: Plans,
    jobs: Mutex<Vec<StoredJob>>,
    inject_failures: AtomicU32,
}

impl MemoryStore {
    pub fn new(schema: &str) -> Self {
        MemoryStore {
            plans: Plans::new(schema),
            jobs: Mutex::new(Vec::new()),
            inject_failures: AtomicU32::new(0),
        }
    }

    /// Make the next `count` executor calls fail with a storage error.
    pub fn fail_next_calls(&self, count: u32) {
        self.inject_failures.store(count, Ordering::SeqCst);
    }

    pub async fn job(&self, id: Uuid) -> StoredJob {
        self.jobs
            .lock()
            .await
            .iter()
            .find(|job| job.id == id)
            .cloned()
            .expect("job should exist in the store")
    }

    pub async fn jobs_named(&self, name: &str) -> Vec<StoredJob> {
        self.jobs
            .lock()
            .await
            .iter()
            .filter(|job| job.name == name)
            .cloned()
            .collect()
    }

    pub async fn state_of(&self, id: Uuid) -> JobState {
        self.job(id).await.state
    }

    /// Backdate an active job's claim so the next sweep sees it as overdue.
    pub async fn age_claim(&self, id: Uuid, by: Duration) {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .iter_mut()
            .find(|job| job.id == id)
            .expect("job should exist in the store");
        job.started_at = job.started_at.map(|at| at - by);
    }

    async fn insert(&self, params: &[SqlParam]) -> SqlOutcome {
        let id = as_uuid(&params[0]);
        let name = as_text(&params[1]).to_string();
        let retry_limit = as_int(&params[2]);
        let start_in = parse_interval(as_text(&params[3]));
        let expire_in = parse_interval(as_text(&params[4]));
        let data = as_json(&params[5]);
        let singleton_key = as_maybe_text(&params[6]);
        let singleton_seconds = as_maybe_int(&params[7]);
        let singleton_offset = as_int(&params[8]);

        let now = Utc::now();
        let singleton_on = singleton_seconds.map(|seconds| {
            let seconds = i64::from(seconds);
            let bucket = seconds * ((now.timestamp() + i64::from(singleton_offset)) / seconds);
            Utc.timestamp_opt(bucket, 0).unwrap()
        });

        let mut jobs = self.jobs.lock().await;

        let conflict = jobs.iter().any(|existing| {
            if existing.name != name || existing.singleton_key != singleton_key {
                return false;
            }
            match singleton_on {
                // Bucketed uniqueness holds regardless of state, exactly
                // like the store's index over (name, key, bucket).
                Some(bucket) => existing.singleton_on == Some(bucket),
                None => {
                    singleton_key.is_some()
                        && existing.singleton_on.is_none()
                        && !matches!(existing.state, JobState::Completed | JobState::Cancelled)
                }
            }
        });

        if conflict {
            return SqlOutcome::default();
        }

        jobs.push(StoredJob {
            id,
            name,
            data,
            state: JobState::Created,
            retry_limit,
            retry_count: 0,
            start_after: now + start_in,
            expire_in,
            singleton_key,
            singleton_on,
            created_at: now,
            started_at: None,
            completed_at: None,
        });

        SqlOutcome {
            row_count: 1,
            rows: Vec::new(),
        }
    }

    async fn fetch_next(&self, params: &[SqlParam]) -> SqlOutcome {
        let name = as_text(&params[0]);
        let now = Utc::now();

        let mut jobs = self.jobs.lock().await;
        let eligible = jobs.iter_mut().find(|job| {
            job.name == name
                && matches!(
                    job.state,
                    JobState::Created | JobState::Retry | JobState::Expired
                )
                && job.start_after <= now
        });

        match eligible {
            None => SqlOutcome::default(),
            Some(job) => {
                if matches!(job.state, JobState::Retry | JobState::Expired) {
                    job.retry_count += 1;
                }
                job.state = JobState::Active;
                job.started_at = Some(now);

                SqlOutcome {
                    row_count: 1,
                    rows: vec![JobRow {
                        id: job.id,
                        data: job.data.clone(),
                        started_at: job.started_at,
                    }],
                }
            }
        }
    }

    async fn expire(&self) -> SqlOutcome {
        let now = Utc::now();
        let mut count = 0;

        let mut jobs = self.jobs.lock().await;
        for job in jobs.iter_mut() {
            let overdue = job.state == JobState::Active
                && job
                    .started_at
                    .map(|started| started + job.expire_in < now)
                    .unwrap_or(false);

            if overdue {
                job.state = JobState::Expired;
                count += 1;
            }
        }

        SqlOutcome {
            row_count: count,
            rows: Vec::new(),
        }
    }

    async fn complete(&self, params: &[SqlParam]) -> SqlOutcome {
        let id = as_uuid(&params[0]);
        let now = Utc::now();

        let mut jobs = self.jobs.lock().await;
        let updated = jobs
            .iter_mut()
            .find(|job| job.id == id && job.state == JobState::Active)
            .map(|job| {
                job.state = JobState::Completed;
                job.completed_at = Some(now);
            });

        SqlOutcome {
            row_count: u64::from(updated.is_some()),
            rows: Vec::new(),
        }
    }

    async fn cancel(&self, params: &[SqlParam]) -> SqlOutcome {
        let id = as_uuid(&params[0]);
        let now = Utc::now();

        let mut jobs = self.jobs.lock().await;
        let updated = jobs
            .iter_mut()
            .find(|job| {
                job.id == id
                    && matches!(
                        job.state,
                        JobState::Created | JobState::Retry | JobState::Active | JobState::Expired
                    )
            })
            .map(|job| {
                job.state = JobState::Cancelled;
                job.completed_at = Some(now);
            });

        SqlOutcome {
            row_count: u64::from(updated.is_some()),
            rows: Vec::new(),
        }
    }
}

#[async_trait]
impl SqlExecutor for MemoryStore {
    async fn execute_sql(&self, plan: &str, params: &[SqlParam]) -> foreman::Result<SqlOutcome> {
        let pending = self.inject_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.inject_failures.store(pending - 1, Ordering::SeqCst);
            return Err(QueueError::Sql(sqlx::Error::Protocol(
                "injected executor failure".to_string(),
            )));
        }

        if plan == self.plans.insert_job() {
            Ok(self.insert(params).await)
        } else if plan == self.plans.fetch_next_job() {
            Ok(self.fetch_next(params).await)
        } else if plan == self.plans.expire_job() {
            Ok(self.expire().await)
        } else if plan == self.plans.complete_job() {
            Ok(self.complete(params).await)
        } else if plan == self.plans.cancel_job() {
            Ok(self.cancel(params).await)
        } else {
            panic!("unrecognized plan: {plan}");
        }
    }
}

fn as_uuid(param: &SqlParam) -> Uuid {
    match param {
        SqlParam::Uuid(value) => *value,
        other => panic!("expected uuid param, got {other:?}"),
    }
}

fn as_text(param: &SqlParam) -> &str {
    match param {
        SqlParam::Text(value) => value,
        other => panic!("expected text param, got {other:?}"),
    }
}

fn as_maybe_text(param: &SqlParam) -> Option<String> {
    match param {
        SqlParam::MaybeText(value) => value.clone(),
        other => panic!("expected nullable text param, got {other:?}"),
    }
}

fn as_int(param: &SqlParam) -> i32 {
    match param {
        SqlParam::Int(value) => *value,
        other => panic!("expected int param, got {other:?}"),
    }
}

fn as_maybe_int(param: &SqlParam) -> Option<i32> {
    match param {
        SqlParam::MaybeInt(value) => *value,
        other => panic!("expected nullable int param, got {other:?}"),
    }
}

fn as_json(param: &SqlParam) -> Value {
    match param {
        SqlParam::Json(value) => value.clone(),
        other => panic!("expected json param, got {other:?}"),
    }
}

/// Parses the interval text the plans bind: a bare number of seconds, or
/// `"<n> <unit>"` for the units the tests use.
fn parse_interval(text: &str) -> Duration {
    if let Ok(seconds) = text.parse::<i64>() {
        return Duration::seconds(seconds);
    }

    let (amount, unit) = text
        .split_once(' ')
        .unwrap_or_else(|| panic!("unparseable interval: {text}"));
    let amount: i64 = amount
        .parse()
        .unwrap_or_else(|_| panic!("unparseable interval amount: {text}"));

    match unit.trim_end_matches('s') {
        "millisecond" => Duration::milliseconds(amount),
        "second" => Duration::seconds(amount),
        "minute" => Duration::minutes(amount),
        "hour" => Duration::hours(amount),
        "day" => Duration::days(amount),
        other => panic!("unsupported interval unit: {other}"),
    }
}

/// Manager wired to an in-memory store, with fast background timers.
pub struct TestQueue {
    pub manager: Manager,
    pub store: Arc<MemoryStore>,
}

pub fn test_queue() -> TestQueue {
    let store = Arc::new(MemoryStore::new(TEST_SCHEMA));
    let config = ManagerConfig::default()
        .schema(TEST_SCHEMA)
        .expire_check_interval(StdDuration::from_millis(100))
        .new_job_check_interval(StdDuration::from_millis(100))
        .uuid(IdKind::V4);

    TestQueue {
        manager: Manager::new(store.clone(), config),
        store,
    }
}

/// Polls `probe` until it returns true or the deadline passes.
pub async fn wait_for<F, Fut>(what: &str, probe: F)
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + StdDuration::from_secs(5);

    while !probe().await {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(StdDuration::from_millis(25)).await;
    }
}

pub async fn enable_logs() {
    static ONCE: OnceCell<()> = OnceCell::const_new();

    ONCE.get_or_init(|| async {
        let fmt_layer = tracing_subscriber::fmt::layer();
        let filter_layer = EnvFilter::try_new("debug").unwrap();

        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .init();
    })
    .await;
}
