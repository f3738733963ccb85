//! Error types for the tenant queue set.

/// Why an enqueue was refused. All variants are fail-fast: enqueue never
/// blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EnqueueError {
    /// The tenant already has `max_outstanding_per_tenant` queued requests.
    #[error("too many outstanding requests")]
    TooManyOutstanding,
    /// The tenant id was empty.
    #[error("no tenant id provided")]
    NoTenant,
    /// The queue set is stopping or stopped.
    #[error("queue is stopped")]
    Stopped,
}

/// Why a blocked dequeue returned without work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DequeueError {
    /// The queue set shut down or the calling worker was cancelled.
    #[error("queue is shutting down")]
    Shutdown,
}
