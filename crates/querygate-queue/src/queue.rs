//! The tenant queue set: bounded per-tenant FIFOs with round-robin dispatch.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::config::QueueConfig;
use crate::error::{DequeueError, EnqueueError};
use crate::events::QueueEvent;
use crate::shard;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Running,
    Stopping,
    Stopped,
}

struct Queued<T> {
    item: T,
    enqueued_at: Instant,
}

struct Inner<T> {
    state: State,
    queues: HashMap<String, VecDeque<Queued<T>>>,
    /// Tenants in dispatch order. Front of the deque is served next; a
    /// tenant that dispatches moves to the back. Invariant: same key set as
    /// `queues`.
    order: VecDeque<String>,
    /// Worker id -> number of live registrations (one per stream).
    workers: BTreeMap<String, usize>,
}

/// A set of per-tenant FIFO queues multiplexed to a pool of workers.
///
/// `enqueue` is fail-fast; [`dequeue`](TenantQueues::dequeue) suspends until
/// a request is available to the calling worker or the set shuts down.
/// Fairness is round-robin over tenants with queued work; a tenant whose
/// queue is observed empty is dropped from the rotation and re-enters at the
/// back on its next enqueue, so idle tenants bank no turns.
pub struct TenantQueues<T> {
    config: QueueConfig,
    inner: Mutex<Inner<T>>,
    notify: Notify,
}

impl<T> TenantQueues<T> {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: State::Running,
                queues: HashMap::new(),
                order: VecDeque::new(),
                workers: BTreeMap::new(),
            }),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Appends a request to `tenant`'s queue.
    pub fn enqueue(&self, tenant: &str, item: T) -> Result<(), EnqueueError> {
        if tenant.is_empty() {
            return Err(EnqueueError::NoTenant);
        }

        let depth = {
            let mut inner = self.lock();
            if inner.state != State::Running {
                return Err(EnqueueError::Stopped);
            }

            let depth = inner.queues.get(tenant).map_or(0, VecDeque::len);
            if depth >= self.config.max_outstanding_per_tenant {
                drop(inner);
                self.config.event_listeners.emit(&QueueEvent::Rejected {
                    tenant: tenant.to_owned(),
                    timestamp: Instant::now(),
                });
                #[cfg(feature = "metrics")]
                metrics::counter!("querygate_queue_rejected_total", "tenant" => tenant.to_owned())
                    .increment(1);
                return Err(EnqueueError::TooManyOutstanding);
            }

            if !inner.queues.contains_key(tenant) {
                inner.order.push_back(tenant.to_owned());
                inner.queues.insert(tenant.to_owned(), VecDeque::new());
            }
            if let Some(queue) = inner.queues.get_mut(tenant) {
                queue.push_back(Queued {
                    item,
                    enqueued_at: Instant::now(),
                });
            }
            depth + 1
        };

        self.config.event_listeners.emit(&QueueEvent::Enqueued {
            tenant: tenant.to_owned(),
            depth,
            timestamp: Instant::now(),
        });
        #[cfg(feature = "metrics")]
        {
            metrics::counter!("querygate_queue_enqueued_total", "tenant" => tenant.to_owned())
                .increment(1);
            metrics::gauge!("querygate_queue_length", "tenant" => tenant.to_owned())
                .set(depth as f64);
        }

        // Wake every blocked worker; shard rules mean an arbitrary single
        // waiter might not be eligible for this tenant.
        self.notify.notify_waiters();
        Ok(())
    }

    /// Pulls the next request this worker may serve, suspending until one is
    /// available. Returns [`DequeueError::Shutdown`] once the set stops or
    /// `cancel` fires.
    pub async fn dequeue(
        &self,
        worker_id: &str,
        cancel: &CancellationToken,
    ) -> Result<T, DequeueError> {
        loop {
            if cancel.is_cancelled() {
                return Err(DequeueError::Shutdown);
            }

            // Register interest before checking: notify_waiters only wakes
            // already-enabled waiters, so an enqueue landing between the
            // check and the await must still find us registered.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some((tenant, queued)) = self.try_dequeue(worker_id)? {
                let queue_time = queued.enqueued_at.elapsed();
                self.config.event_listeners.emit(&QueueEvent::Dispatched {
                    tenant,
                    worker: worker_id.to_owned(),
                    queue_time,
                    timestamp: Instant::now(),
                });
                #[cfg(feature = "metrics")]
                metrics::histogram!("querygate_queue_wait_seconds")
                    .record(queue_time.as_secs_f64());
                return Ok(queued.item);
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = cancel.cancelled() => return Err(DequeueError::Shutdown),
            }
        }
    }

    /// One dispatch scan over the tenant rotation.
    fn try_dequeue(
        &self,
        worker_id: &str,
    ) -> Result<Option<(String, Queued<T>)>, DequeueError> {
        let mut inner = self.lock();
        if inner.state == State::Stopped {
            return Err(DequeueError::Shutdown);
        }

        let mut k = 0;
        while k < inner.order.len() {
            let tenant = inner.order[k].clone();

            // Lazy removal of queues observed empty during dispatch.
            if inner.queues.get(&tenant).map_or(true, |q| q.is_empty()) {
                inner.order.remove(k);
                inner.queues.remove(&tenant);
                continue;
            }

            let limit = self.config.limits.max_queriers_per_tenant(&tenant);
            if !shard::worker_is_eligible(&tenant, worker_id, &inner.workers, limit) {
                // Not this worker's tenant; the tenant keeps its place in
                // line for a worker inside its shard.
                k += 1;
                continue;
            }

            let Some(queue) = inner.queues.get_mut(&tenant) else {
                k += 1;
                continue;
            };
            let Some(queued) = queue.pop_front() else {
                k += 1;
                continue;
            };

            if queue.is_empty() {
                inner.queues.remove(&tenant);
                inner.order.remove(k);
            } else if let Some(t) = inner.order.remove(k) {
                inner.order.push_back(t);
            }

            return Ok(Some((tenant, queued)));
        }

        if inner.state == State::Stopping && inner.order.is_empty() {
            return Err(DequeueError::Shutdown);
        }
        Ok(None)
    }

    /// Adds one registration for `worker_id` to the set used for shard
    /// computation. A worker with several streams registers once per stream.
    pub fn register_worker(&self, worker_id: &str) {
        {
            let mut inner = self.lock();
            *inner.workers.entry(worker_id.to_owned()).or_insert(0) += 1;
        }
        // Shard membership may have shifted; let blocked workers re-check.
        self.notify.notify_waiters();
    }

    /// Drops one registration for `worker_id`; the worker leaves the shard
    /// set when its last stream goes away.
    pub fn unregister_worker(&self, worker_id: &str) {
        {
            let mut inner = self.lock();
            if let Some(count) = inner.workers.get_mut(worker_id) {
                *count -= 1;
                if *count == 0 {
                    inner.workers.remove(worker_id);
                }
            }
        }
        self.notify.notify_waiters();
    }

    /// Number of requests currently queued across all tenants.
    pub fn pending(&self) -> usize {
        let inner = self.lock();
        inner.queues.values().map(VecDeque::len).sum()
    }

    /// Depth of one tenant's queue.
    pub fn tenant_depth(&self, tenant: &str) -> usize {
        let inner = self.lock();
        inner.queues.get(tenant).map_or(0, VecDeque::len)
    }

    /// Stops the queue set: new enqueues are refused immediately, queued
    /// requests may drain for up to `grace`, then every blocked dequeue is
    /// woken with [`DequeueError::Shutdown`].
    pub async fn shutdown(&self, grace: Duration) {
        {
            let mut inner = self.lock();
            if inner.state == State::Stopped {
                return;
            }
            inner.state = State::Stopping;
        }
        self.notify.notify_waiters();

        let deadline = Instant::now() + grace;
        while self.pending() > 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        {
            let mut inner = self.lock();
            inner.state = State::Stopped;
        }
        self.notify.notify_waiters();
        self.config.event_listeners.emit(&QueueEvent::Stopped {
            timestamp: Instant::now(),
        });
    }
}

impl<T> std::fmt::Debug for TenantQueues<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("TenantQueues")
            .field("state", &inner.state)
            .field("tenants", &inner.order.len())
            .field("workers", &inner.workers.len())
            .finish()
    }
}
