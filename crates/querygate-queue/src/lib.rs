//! Per-tenant request queues for the querygate frontend.
//!
//! A [`TenantQueues`] multiplexes many tenants' queued requests to a pool of
//! pull-based workers:
//!
//! - every tenant gets its own bounded FIFO; overflow is rejected fail-fast,
//! - dispatch is round-robin over tenants with queued work,
//! - a per-tenant querier cap confines a tenant to a deterministic shard of
//!   the connected workers,
//! - shutdown drains queued work for a grace period, then wakes every
//!   blocked worker.
//!
//! # Example
//!
//! ```rust
//! use querygate_queue::{QueueConfig, TenantQueues};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() {
//! let queues: TenantQueues<String> = TenantQueues::new(
//!     QueueConfig::builder()
//!         .max_outstanding_per_tenant(100)
//!         .limits(|tenant: &str| if tenant == "big" { 4 } else { 0 })
//!         .build(),
//! );
//!
//! queues.enqueue("tenant-a", "select 1".to_owned()).unwrap();
//!
//! let cancel = CancellationToken::new();
//! let job = queues.dequeue("worker-1", &cancel).await.unwrap();
//! assert_eq!(job, "select 1");
//! # }
//! ```

mod config;
mod error;
mod events;
mod queue;
mod shard;

pub use config::{QueueConfig, QueueConfigBuilder, TenantLimits, DEFAULT_MAX_OUTSTANDING_PER_TENANT};
pub use error::{DequeueError, EnqueueError};
pub use events::QueueEvent;
pub use queue::TenantQueues;
