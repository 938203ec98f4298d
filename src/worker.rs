use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use rand::RngCore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::errors::{QueueError, Result};
use crate::job::Job;

pub(crate) type Fetcher =
    Box<dyn Fn() -> Pin<Box<dyn Future<Output = Result<Option<Job>>> + Send>> + Send + Sync>;
pub(crate) type Responder = Box<dyn Fn(Job) + Send + Sync>;
pub(crate) type ErrorSink = Box<dyn Fn(QueueError) + Send + Sync>;

pub(crate) struct WorkerConfig {
    pub(crate) interval: Duration,
    pub(crate) fetcher: Fetcher,
    pub(crate) responder: Responder,
    pub(crate) error: ErrorSink,
}

/// One long-lived polling loop.
///
/// Fetches are strictly sequential; between fetches the loop sleeps for
/// `interval`. Stopping cancels an armed sleep and prevents any further
/// fetch, but an in-flight fetch runs to completion first.
pub(crate) struct Worker {
    worker_id: String,
    stop: CancellationToken,
}

impl Worker {
    pub(crate) fn spawn(name: &str, config: WorkerConfig) -> Self {
        let mut random_bytes = [0u8; 4];
        rand::thread_rng().fill_bytes(&mut random_bytes);
        let worker_id = format!("{}_{}", name, hex::encode(random_bytes));

        let stop = CancellationToken::new();
        tokio::spawn(poll_loop(worker_id.clone(), config, stop.clone()));

        Worker { worker_id, stop }
    }

    pub(crate) fn stop(&self) {
        self.stop.cancel();
    }

    pub(crate) fn worker_id(&self) -> &str {
        &self.worker_id
    }
}

async fn poll_loop(worker_id: String, config: WorkerConfig, stop: CancellationToken) {
    debug!(worker_id, "worker started");

    loop {
        if stop.is_cancelled() {
            break;
        }

        // The fetch is awaited plainly: a stop during the round trip lets
        // the store call finish, and the continuation observes the token.
        match (config.fetcher)().await {
            Err(e) => (config.error)(e),
            Ok(None) => trace!(worker_id, "no job available"),
            Ok(Some(job)) => (config.responder)(job),
        }

        tokio::select! {
            _ = stop.cancelled() => break,
            _ = tokio::time::sleep(config.interval) => {}
        }
    }

    debug!(worker_id, "worker stopped");
}
