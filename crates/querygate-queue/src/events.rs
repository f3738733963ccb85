//! Events emitted by the tenant queue set.

use std::time::{Duration, Instant};

use querygate_core::GateEvent;

/// Observable queue activity. Emitted synchronously from the enqueueing or
/// dequeuing task, outside the queue lock.
#[derive(Debug, Clone)]
pub enum QueueEvent {
    /// A request entered a tenant queue.
    Enqueued {
        tenant: String,
        /// Queue depth after the insert.
        depth: usize,
        timestamp: Instant,
    },
    /// A request was refused because the tenant queue was full.
    Rejected { tenant: String, timestamp: Instant },
    /// A request was handed to a worker.
    Dispatched {
        tenant: String,
        worker: String,
        /// Time the request spent queued.
        queue_time: Duration,
        timestamp: Instant,
    },
    /// The queue set finished shutting down.
    Stopped { timestamp: Instant },
}

impl GateEvent for QueueEvent {
    fn kind(&self) -> &'static str {
        match self {
            QueueEvent::Enqueued { .. } => "enqueued",
            QueueEvent::Rejected { .. } => "rejected",
            QueueEvent::Dispatched { .. } => "dispatched",
            QueueEvent::Stopped { .. } => "stopped",
        }
    }

    fn at(&self) -> Instant {
        match self {
            QueueEvent::Enqueued { timestamp, .. }
            | QueueEvent::Rejected { timestamp, .. }
            | QueueEvent::Dispatched { timestamp, .. }
            | QueueEvent::Stopped { timestamp } => *timestamp,
        }
    }

    fn source(&self) -> &str {
        match self {
            QueueEvent::Enqueued { tenant, .. }
            | QueueEvent::Rejected { tenant, .. }
            | QueueEvent::Dispatched { tenant, .. } => tenant,
            QueueEvent::Stopped { .. } => "",
        }
    }
}
