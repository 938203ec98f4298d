use std::sync::Arc;

use tokio::sync::broadcast;

use crate::errors::QueueError;
use crate::job::Job;

/// Events the queue emits to observers.
#[derive(Debug, Clone)]
pub enum QueueEvent {
    /// A job was dispatched to a subscriber
    Job(Job),
    /// An expiration sweep released this many overdue jobs
    Expired(u64),
    /// An asynchronous failure: sweep error, worker fetch error, or a
    /// handler error. Synchronous call failures are returned to the
    /// caller instead.
    Error(Arc<QueueError>),
}

/// Fan-out surface for `QueueEvent`.
///
/// Emission never blocks and never fails; events sent while no receiver
/// is subscribed are dropped, and a lagging receiver loses the oldest
/// events first.
#[derive(Debug, Clone)]
pub(crate) struct EventBus {
    sender: broadcast::Sender<QueueEvent>,
}

const EVENT_CAPACITY: usize = 128;

impl EventBus {
    pub(crate) fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);

        EventBus { sender }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.sender.subscribe()
    }

    pub(crate) fn emit(&self, event: QueueEvent) {
        let _ = self.sender.send(event);
    }
}
