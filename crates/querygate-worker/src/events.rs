//! Events emitted by the worker.

use std::time::Instant;

use querygate_core::GateEvent;

/// Observable worker activity, one event stream shared by all of the
/// worker's frontend streams.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// A frontend stream is established and the hello was sent.
    Connected { worker: String, timestamp: Instant },
    /// A frontend stream failed; `attempt` counts consecutive failures.
    Disconnected {
        worker: String,
        attempt: usize,
        timestamp: Instant,
    },
    /// The frontend ordered this worker to stop reconnecting.
    ShutdownReceived { worker: String, timestamp: Instant },
    /// A pulled query started executing.
    RequestStarted {
        worker: String,
        query_id: u64,
        timestamp: Instant,
    },
    /// A pulled query finished (successfully or not) and was answered.
    RequestFinished {
        worker: String,
        query_id: u64,
        timestamp: Instant,
    },
}

impl GateEvent for WorkerEvent {
    fn kind(&self) -> &'static str {
        match self {
            WorkerEvent::Connected { .. } => "connected",
            WorkerEvent::Disconnected { .. } => "disconnected",
            WorkerEvent::ShutdownReceived { .. } => "shutdown_received",
            WorkerEvent::RequestStarted { .. } => "request_started",
            WorkerEvent::RequestFinished { .. } => "request_finished",
        }
    }

    fn at(&self) -> Instant {
        match self {
            WorkerEvent::Connected { timestamp, .. }
            | WorkerEvent::Disconnected { timestamp, .. }
            | WorkerEvent::ShutdownReceived { timestamp, .. }
            | WorkerEvent::RequestStarted { timestamp, .. }
            | WorkerEvent::RequestFinished { timestamp, .. } => *timestamp,
        }
    }

    fn source(&self) -> &str {
        match self {
            WorkerEvent::Connected { worker, .. }
            | WorkerEvent::Disconnected { worker, .. }
            | WorkerEvent::ShutdownReceived { worker, .. }
            | WorkerEvent::RequestStarted { worker, .. }
            | WorkerEvent::RequestFinished { worker, .. } => worker,
        }
    }
}
