//! Durable PostgreSQL-backed job queue.
//!
//! Jobs are persisted through an opaque [`SqlExecutor`], claimed with
//! row-level locking, dispatched to long-lived polling workers, released
//! back to the queue when their visibility window elapses, and optionally
//! throttled to one instance per time bucket (singleton jobs).
//!
//! ```no_run
//! use std::sync::Arc;
//! use foreman::{Manager, ManagerConfig, PgExecutor, PublishOptions};
//!
//! # async fn example() -> foreman::Result<()> {
//! # let pool = sqlx::PgPool::connect("postgres://localhost/jobs").await?;
//! let manager = Manager::new(Arc::new(PgExecutor::new(pool)), ManagerConfig::default());
//!
//! // Expiration sweeps run in the background until `stop`.
//! manager.monitor();
//!
//! manager
//!     .publish(
//!         "email",
//!         serde_json::json!({ "to": "a@example.org" }),
//!         PublishOptions::builder().expire_in("1 minute").build(),
//!     )
//!     .await?;
//!
//! manager
//!     .subscribe("email", |job, handle| async move {
//!         // ... deliver the email ...
//!         handle.complete().await.map_err(|e| e.to_string())?;
//!         Ok::<_, String>(())
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod attorney;
pub mod errors;
pub mod events;
pub mod executor;
pub mod ids;
pub mod job;
pub mod manager;
pub mod options;
pub mod plans;
mod worker;

pub use errors::{QueueError, Result};
pub use events::QueueEvent;
pub use executor::{JobRow, PgExecutor, SqlExecutor, SqlOutcome, SqlParam};
pub use ids::{IdFactory, IdKind};
pub use job::{Job, JobState};
pub use manager::{JobHandle, Manager};
pub use options::{
    ManagerConfig, PublishOptions, PublishOptionsBuilder, PublishRequest, PublishRequestBuilder,
    StartIn, SubscribeOptions, SubscribeOptionsBuilder,
};
pub use plans::Plans;
