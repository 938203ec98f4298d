use std::fmt::Debug;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::attorney::{self, InsertArgs};
use crate::errors::{QueueError, Result};
use crate::events::{EventBus, QueueEvent};
use crate::executor::{SqlExecutor, SqlParam};
use crate::ids::IdFactory;
use crate::job::Job;
use crate::options::{ManagerConfig, PublishOptions, PublishRequest, SubscribeOptions};
use crate::plans::Plans;
use crate::worker::{ErrorSink, Fetcher, Responder, Worker, WorkerConfig};

/// The queue coordinator.
///
/// Owns the executor handle, the worker registry and the expiration
/// monitor for the lifetime of the process. Cheap to clone; all clones
/// share one registry and one event surface.
///
/// ```no_run
/// use std::sync::Arc;
/// use foreman::{Manager, ManagerConfig, PgExecutor, PublishOptions};
///
/// # async fn example(pool: sqlx::PgPool) -> foreman::Result<()> {
/// let manager = Manager::new(
///     Arc::new(PgExecutor::new(pool)),
///     ManagerConfig::default().schema("foreman"),
/// );
/// manager.monitor();
///
/// let job_id = manager
///     .publish("email", serde_json::json!({ "to": "a" }), PublishOptions::default())
///     .await?;
/// println!("published {job_id:?}");
///
/// manager
///     .subscribe("email", |job, handle| async move {
///         println!("sending {:?}", job.data());
///         handle.complete().await.map_err(|e| e.to_string())?;
///         Ok::<_, String>(())
///     })
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Manager {
    inner: Arc<ManagerInner>,
}

pub(crate) struct ManagerInner {
    config: ManagerConfig,
    executor: Arc<dyn SqlExecutor>,
    plans: Plans,
    ids: IdFactory,
    events: EventBus,
    workers: Mutex<Vec<Worker>>,
    stopped: AtomicBool,
    monitor_stop: CancellationToken,
}

impl Manager {
    pub fn new(executor: Arc<dyn SqlExecutor>, config: ManagerConfig) -> Self {
        let plans = Plans::new(&config.schema);
        let ids = IdFactory::new(config.uuid);

        Manager {
            inner: Arc::new(ManagerInner {
                config,
                executor,
                plans,
                ids,
                events: EventBus::new(),
                workers: Mutex::new(Vec::new()),
                stopped: AtomicBool::new(false),
                monitor_stop: CancellationToken::new(),
            }),
        }
    }

    /// A receiver for `job`, `expired` and `error` events.
    pub fn events(&self) -> broadcast::Receiver<QueueEvent> {
        self.inner.events.subscribe()
    }

    /// Persists a job under `name`.
    ///
    /// Returns the new id, or `None` when a singleton window suppressed
    /// the insert. With `singleton_next_slot`, a suppressed publish is
    /// retried once into the next bucket, measured from now.
    pub async fn publish(
        &self,
        name: &str,
        data: impl Serialize,
        options: PublishOptions,
    ) -> Result<Option<Uuid>> {
        attorney::check_publish_args(name)?;
        let data = serde_json::to_value(data)?;
        let args = attorney::plan_insert(options)?;

        self.inner.insert_job(name, &data, args).await
    }

    /// The single-argument publish form; identical after unpacking.
    pub async fn publish_request(&self, request: PublishRequest) -> Result<Option<Uuid>> {
        let PublishRequest {
            name,
            data,
            options,
        } = request;

        attorney::check_publish_args(&name)?;
        let args = attorney::plan_insert(options)?;

        self.inner.insert_job(&name, &data, args).await
    }

    /// Subscribes a single worker with default options.
    pub async fn subscribe<H, Fut, E>(&self, name: &str, handler: H) -> Result<()>
    where
        H: Fn(Job, JobHandle) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
        E: Debug + Send + 'static,
    {
        self.subscribe_with_options(name, SubscribeOptions::default(), handler)
            .await
    }

    /// Spawns `team_size` polling workers for `name`, each dispatching
    /// claimed jobs to `handler` on its own scheduler tick.
    ///
    /// The handler receives the job and a [`JobHandle`]; handler errors and
    /// panics are emitted on the `error` event and never kill the worker.
    pub async fn subscribe_with_options<H, Fut, E>(
        &self,
        name: &str,
        options: SubscribeOptions,
        handler: H,
    ) -> Result<()>
    where
        H: Fn(Job, JobHandle) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
        E: Debug + Send + 'static,
    {
        if name.is_empty() {
            return Err(QueueError::InvalidArgument(
                "queue name is required on subscribe".to_string(),
            ));
        }

        let team_size = attorney::apply_team_size(&options)?;
        let interval = attorney::apply_new_job_check_interval(
            &options,
            self.inner.config.new_job_check_interval,
        )?;

        info!(name, team_size, "subscribing workers");

        let handler = Arc::new(handler);
        let mut workers = self.inner.workers.lock().await;

        for _ in 0..team_size {
            let fetcher: Fetcher = {
                let inner = self.inner.clone();
                let name = name.to_string();
                Box::new(move || {
                    let inner = inner.clone();
                    let name = name.clone();
                    Box::pin(async move { inner.fetch(&name).await })
                })
            };

            let responder = self.inner.responder(handler.clone());

            let error: ErrorSink = {
                let inner = self.inner.clone();
                Box::new(move |e| inner.emit_error(e))
            };

            workers.push(Worker::spawn(
                name,
                WorkerConfig {
                    interval,
                    fetcher,
                    responder,
                    error,
                },
            ));
        }

        Ok(())
    }

    /// Atomically claims one eligible job for `name`, or `None`.
    pub async fn fetch(&self, name: &str) -> Result<Option<Job>> {
        self.inner.fetch(name).await
    }

    /// Marks an active job completed. Errs with `JobNotFound` when the id
    /// matches no active row (including a second completion).
    pub async fn complete(&self, id: Uuid) -> Result<Uuid> {
        self.inner.complete(id).await
    }

    /// Cancels a job that has not finished yet.
    pub async fn cancel(&self, id: Uuid) -> Result<Uuid> {
        self.inner.cancel(id).await
    }

    /// Starts the expiration monitor: an immediate sweep, then one sweep
    /// every `expire_check_interval`.
    ///
    /// Non-zero sweeps emit `expired(count)`; sweep failures emit `error`
    /// and the monitor re-arms. `stop` cancels the timer.
    pub fn monitor(&self) {
        let inner = self.inner.clone();

        tokio::spawn(async move {
            debug!("expiration monitor started");

            loop {
                if inner.stopped.load(Ordering::SeqCst) {
                    break;
                }

                match inner.expire().await {
                    Ok(0) => {}
                    Ok(count) => {
                        warn!(count, "released expired jobs");
                        inner.events.emit(QueueEvent::Expired(count));
                    }
                    Err(e) => inner.emit_error(e),
                }

                tokio::select! {
                    _ = inner.monitor_stop.cancelled() => break,
                    _ = tokio::time::sleep(inner.config.expire_check_interval) => {}
                }
            }

            debug!("expiration monitor stopped");
        });
    }

    /// Stops every subscribed worker and clears the registry.
    pub async fn close(&self) {
        let workers = {
            let mut guard = self.inner.workers.lock().await;
            std::mem::take(&mut *guard)
        };

        for worker in &workers {
            debug!(worker_id = worker.worker_id(), "stopping worker");
            worker.stop();
        }
    }

    /// Closes all workers and cancels the expiration monitor. Idempotent.
    pub async fn stop(&self) {
        self.close().await;
        self.inner.stopped.store(true, Ordering::SeqCst);
        self.inner.monitor_stop.cancel();
        info!("queue stopped");
    }
}

impl ManagerInner {
    async fn insert_job(
        &self,
        name: &str,
        data: &Value,
        mut args: InsertArgs,
    ) -> Result<Option<Uuid>> {
        let mut singleton_offset = 0;

        loop {
            let id = self.ids.next();
            let params = [
                SqlParam::Uuid(id),
                SqlParam::Text(name.to_string()),
                SqlParam::Int(args.retry_limit),
                SqlParam::Text(args.start_in.clone()),
                SqlParam::Text(args.expire_in.clone()),
                SqlParam::Json(data.clone()),
                SqlParam::MaybeText(args.singleton_key.clone()),
                SqlParam::MaybeInt(args.singleton_seconds),
                SqlParam::Int(singleton_offset),
            ];

            let outcome = self
                .executor
                .execute_sql(self.plans.insert_job(), &params)
                .await?;

            if outcome.row_count == 1 {
                debug!(job_id = %id, name, "job published");
                return Ok(Some(id));
            }

            let Some(seconds) = args.singleton_seconds else {
                return Ok(None);
            };
            if !args.singleton_next_slot {
                return Ok(None);
            }

            // Current bucket is occupied: one retry into the next slot,
            // measured from now rather than from the occupied slot.
            args.singleton_next_slot = false;
            args.start_in = seconds.to_string();
            singleton_offset = seconds;
            debug!(name, seconds, "singleton slot occupied, retrying at next boundary");
        }
    }

    pub(crate) async fn fetch(&self, name: &str) -> Result<Option<Job>> {
        let outcome = self
            .executor
            .execute_sql(
                self.plans.fetch_next_job(),
                &[SqlParam::Text(name.to_string())],
            )
            .await?;

        let Some(row) = outcome.rows.into_iter().next() else {
            return Ok(None);
        };

        debug!(job_id = %row.id, name, "job claimed");

        // The plan does not echo the queue name; attach it here.
        Ok(Some(Job::new(
            row.id,
            name.to_string(),
            row.data,
            row.started_at,
        )))
    }

    pub(crate) async fn complete(&self, id: Uuid) -> Result<Uuid> {
        self.transition("complete", self.plans.complete_job(), id)
            .await
    }

    pub(crate) async fn cancel(&self, id: Uuid) -> Result<Uuid> {
        self.transition("cancel", self.plans.cancel_job(), id).await
    }

    async fn transition(&self, operation: &'static str, plan: &str, id: Uuid) -> Result<Uuid> {
        let outcome = self.executor.execute_sql(plan, &[SqlParam::Uuid(id)]).await?;

        if outcome.row_count != 1 {
            return Err(QueueError::JobNotFound { operation, id });
        }

        debug!(job_id = %id, operation, "job released");
        Ok(id)
    }

    async fn expire(&self) -> Result<u64> {
        let outcome = self.executor.execute_sql(self.plans.expire_job(), &[]).await?;

        Ok(outcome.row_count)
    }

    fn emit_error(&self, error: QueueError) {
        tracing::error!(error = %error, "queue error");
        self.events.emit(QueueEvent::Error(Arc::new(error)));
    }

    /// Builds the worker responder: emits the `job` event, then defers the
    /// user handler to its own task so it cannot stall the fetch loop.
    fn responder<H, Fut, E>(self: &Arc<Self>, handler: Arc<H>) -> Responder
    where
        H: Fn(Job, JobHandle) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
        E: Debug + Send + 'static,
    {
        let inner = self.clone();

        Box::new(move |job: Job| {
            inner.events.emit(QueueEvent::Job(job.clone()));

            let handle = JobHandle {
                id: *job.id(),
                inner: inner.clone(),
            };
            let handler_fut = handler(job, handle);

            let events = inner.clone();
            tokio::spawn(async move {
                // The nested spawn turns a handler panic into a JoinError
                // instead of tearing down the dispatch task.
                match tokio::spawn(handler_fut).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => events.emit_error(QueueError::Handler(format!("{e:?}"))),
                    Err(join_error) => {
                        events.emit_error(QueueError::Handler(join_error.to_string()))
                    }
                }
            });
        })
    }
}

/// Completion handle passed to subscription handlers.
///
/// Bound to one job id; the typed stand-in for a completion callback.
#[derive(Clone)]
pub struct JobHandle {
    id: Uuid,
    inner: Arc<ManagerInner>,
}

impl JobHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Marks the job completed; errs with `JobNotFound` if it already
    /// finished.
    pub async fn complete(&self) -> Result<Uuid> {
        self.inner.complete(self.id).await
    }

    /// Cancels the job instead of completing it.
    pub async fn cancel(&self) -> Result<Uuid> {
        self.inner.cancel(self.id).await
    }
}
