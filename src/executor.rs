use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use serde_json::Value;
use sqlx::{Either, FromRow, PgPool};
use uuid::Uuid;

use crate::errors::Result;

/// One row returned by a job-selecting plan.
#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    /// Unique job id
    pub id: Uuid,
    /// The JSON payload of the job
    pub data: Value,
    /// When the row was claimed by the store
    pub started_at: Option<DateTime<Utc>>,
}

/// The outcome of executing one plan: affected-row count for modifying
/// plans, decoded rows for selecting plans.
#[derive(Debug, Default)]
pub struct SqlOutcome {
    /// Number of rows the statement touched
    pub row_count: u64,
    /// Result set, when the plan returns rows
    pub rows: Vec<JobRow>,
}

/// A positional plan parameter.
///
/// Plans bind a fixed set of shapes; optional variants bind SQL nulls.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Uuid(Uuid),
    Text(String),
    MaybeText(Option<String>),
    Int(i32),
    MaybeInt(Option<i32>),
    Json(Value),
}

/// The storage seam the manager runs plans through.
///
/// Implementations must be safe for concurrent use; all serialization of
/// access to a single job row is delegated to the store's row locking.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Execute a prepared plan with positional parameters.
    async fn execute_sql(&self, plan: &str, params: &[SqlParam]) -> Result<SqlOutcome>;
}

/// The production executor: runs plans on a PostgreSQL pool.
#[derive(Clone)]
pub struct PgExecutor {
    pool: PgPool,
}

impl PgExecutor {
    pub fn new(pool: PgPool) -> Self {
        PgExecutor { pool }
    }
}

#[async_trait]
impl SqlExecutor for PgExecutor {
    async fn execute_sql(&self, plan: &str, params: &[SqlParam]) -> Result<SqlOutcome> {
        let mut query = sqlx::query(plan);

        for param in params {
            query = match param {
                SqlParam::Uuid(value) => query.bind(*value),
                SqlParam::Text(value) => query.bind(value.clone()),
                SqlParam::MaybeText(value) => query.bind(value.clone()),
                SqlParam::Int(value) => query.bind(*value),
                SqlParam::MaybeInt(value) => query.bind(*value),
                SqlParam::Json(value) => query.bind(value.clone()),
            };
        }

        // A single statement stream carries both the affected count and any
        // returned rows, so modifying and selecting plans share one path.
        let mut results = query.fetch_many(&self.pool);
        let mut outcome = SqlOutcome::default();

        while let Some(step) = results.try_next().await? {
            match step {
                Either::Left(done) => outcome.row_count += done.rows_affected(),
                Either::Right(row) => outcome.rows.push(JobRow::from_row(&row)?),
            }
        }

        Ok(outcome)
    }
}
