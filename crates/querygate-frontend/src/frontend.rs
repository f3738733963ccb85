//! The frontend core: query lifecycle, querier streams and readiness.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::{Request, Response};
use querygate_proto::{
    pb, request_to_wire, response_from_wire, ClientToFrontend, FrontendMessageKind,
    FrontendToClient,
};
use querygate_queue::{DequeueError, QueueConfig, TenantLimits, TenantQueues};
use tokio_util::sync::CancellationToken;
use tonic::Streaming;

use crate::config::FrontendConfig;
use crate::error::FrontendError;
use crate::pending::{cancel_message, ExecResult, PendingResults, StreamSender};

/// A queued query: everything a dispatch loop needs to hand it to a worker.
pub(crate) struct Envelope {
    pub(crate) query_id: u64,
    pub(crate) tenant: String,
    pub(crate) request: pb::HttpRequest,
    pub(crate) deadline: Option<Instant>,
    /// Fires when the HTTP caller goes away.
    pub(crate) cancel: CancellationToken,
}

/// Raised by [`Frontend::check_ready`] while no querier is connected.
#[derive(Debug, thiserror::Error)]
#[error("not ready: number of queriers connected to query-frontend is {connected}")]
pub struct NotReady {
    connected: usize,
}

/// The query frontend.
///
/// Owns the tenant queues, the pending-result table and the connected
/// querier accounting. HTTP ingress goes through
/// [`Handler`](crate::Handler); queriers attach through the gRPC services in
/// [`FrontendGrpc`](crate::FrontendGrpc).
pub struct Frontend {
    pub(crate) config: FrontendConfig,
    pub(crate) queue: TenantQueues<Envelope>,
    pub(crate) pending: PendingResults,
    connected: AtomicUsize,
    next_query_id: AtomicU64,
    pub(crate) shutdown: CancellationToken,
}

impl Frontend {
    /// A frontend with no per-tenant querier caps.
    pub fn new(config: FrontendConfig) -> Arc<Self> {
        Self::with_limits(config, |_: &str| 0)
    }

    /// A frontend with a per-tenant querier limits hook.
    pub fn with_limits<L>(config: FrontendConfig, limits: L) -> Arc<Self>
    where
        L: TenantLimits + 'static,
    {
        let queue = TenantQueues::new(
            QueueConfig::builder()
                .max_outstanding_per_tenant(config.max_outstanding_per_tenant)
                .limits(limits)
                .build(),
        );
        Arc::new(Self {
            config,
            queue,
            pending: PendingResults::default(),
            connected: AtomicUsize::new(0),
            next_query_id: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &FrontendConfig {
        &self.config
    }

    /// Number of querier streams currently attached.
    pub fn connected_queriers(&self) -> usize {
        self.connected.load(Ordering::SeqCst)
    }

    /// The frontend can serve queries iff at least one querier is attached,
    /// or it proxies to a downstream and needs no queriers at all.
    pub fn check_ready(&self) -> Result<(), NotReady> {
        if self.config.downstream_url.is_some() {
            return Ok(());
        }
        let connected = self.connected_queriers();
        if connected > 0 {
            Ok(())
        } else {
            Err(NotReady { connected })
        }
    }

    /// Queues a query under `tenant` and waits for its result.
    pub(crate) async fn enqueue_and_wait(
        &self,
        tenant: &str,
        req: &Request<Bytes>,
    ) -> Result<Response<Bytes>, FrontendError> {
        if self.shutdown.is_cancelled() {
            return Err(FrontendError::Stopped);
        }

        let query_id = self.next_query_id.fetch_add(1, Ordering::Relaxed) + 1;
        let cancel = CancellationToken::new();
        let rx = self.pending.register(query_id);
        let envelope = Envelope {
            query_id,
            tenant: tenant.to_owned(),
            request: request_to_wire(req),
            deadline: self.config.query_timeout.map(|t| Instant::now() + t),
            cancel: cancel.clone(),
        };

        // Tears the query down if this future is dropped before delivery:
        // the caller disconnecting must cancel, not leak.
        let mut guard = QueryGuard {
            frontend: self,
            query_id,
            cancel,
            armed: true,
        };

        if let Err(err) = self.queue.enqueue(tenant, envelope) {
            guard.armed = false;
            self.pending.cancel(query_id);
            return Err(err.into());
        }

        let delivered: ExecResult = match self.config.query_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, rx).await {
                Ok(received) => received.map_err(|_| FrontendError::WorkerLost)?,
                // The guard is still armed here: returning removes the
                // pending entry and pushes CANCEL at the dispatched worker.
                // A query whose worker disconnected after dispatch was only
                // flagged at the time, so the loss surfaces now, distinct
                // from an ordinary timeout.
                Err(_elapsed) => {
                    if self.pending.is_worker_lost(query_id) {
                        return Err(FrontendError::WorkerLost);
                    }
                    return Err(FrontendError::DeadlineExceeded);
                }
            },
            None => rx.await.map_err(|_| FrontendError::WorkerLost)?,
        };
        guard.armed = false;

        let wire = delivered?;
        Ok(response_from_wire(wire)?)
    }

    /// Removes the query and, if it was already dispatched, tells the worker
    /// to abort it.
    pub(crate) fn cancel_query(&self, query_id: u64) {
        if let Some(stream) = self.pending.cancel(query_id) {
            let _ = stream.try_send(Ok(cancel_message(query_id)));
        }
    }

    /// Routes a worker-reported result to the waiting handler. Unknown ids
    /// are late answers for cancelled or timed-out queries and are dropped.
    pub(crate) fn deliver_result(&self, query_id: u64, result: ExecResult, from: &str) {
        if !self.pending.deliver(query_id, result) {
            tracing::warn!(query_id, from, "dropping result for unknown query");
            #[cfg(feature = "metrics")]
            metrics::counter!("querygate_frontend_discarded_results_total").increment(1);
        }
    }

    /// Attaches one querier stream: a receive loop delivering answers and a
    /// dispatch loop feeding the stream from the tenant queues.
    pub(crate) fn start_querier_stream(
        self: Arc<Self>,
        worker_id: String,
        mut inbound: Streaming<ClientToFrontend>,
        out_tx: StreamSender,
    ) {
        self.queue.register_worker(&worker_id);
        let connected = self.connected.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(worker = %worker_id, connected, "querier connected");
        #[cfg(feature = "metrics")]
        metrics::gauge!("querygate_frontend_connected_queriers").set(connected as f64);

        let stream_done = CancellationToken::new();
        let (ack_tx, mut ack_rx) = tokio::sync::mpsc::channel::<()>(8);

        // Receive loop: worker answers and transport errors.
        {
            let frontend = Arc::clone(&self);
            let worker_id = worker_id.clone();
            let stream_done = stream_done.clone();
            tokio::spawn(async move {
                loop {
                    match inbound.message().await {
                        Ok(Some(msg)) => {
                            let result = answer_to_result(msg.http_response, msg.error);
                            frontend.deliver_result(msg.query_id, result, &worker_id);
                            let _ = ack_tx.send(()).await;
                        }
                        Ok(None) => break,
                        Err(status) => {
                            tracing::debug!(
                                worker = %worker_id,
                                error = %status,
                                "querier stream receive failed"
                            );
                            break;
                        }
                    }
                }
                stream_done.cancel();
            });
        }

        // Dispatch loop: pull from the queues, push down the stream.
        tokio::spawn(async move {
            let _disconnect = DisconnectGuard {
                frontend: Arc::clone(&self),
                worker_id: worker_id.clone(),
                out_tx: out_tx.clone(),
            };
            loop {
                let envelope = match self.queue.dequeue(&worker_id, &stream_done).await {
                    Ok(envelope) => envelope,
                    Err(DequeueError::Shutdown) => {
                        if self.shutdown.is_cancelled() {
                            let _ = out_tx.send(Ok(shutdown_message())).await;
                        }
                        break;
                    }
                };

                // The caller may have gone away while the query sat queued;
                // a dead query is skipped, never dispatched.
                if envelope.cancel.is_cancelled() {
                    continue;
                }
                if envelope.deadline.is_some_and(|d| Instant::now() >= d) {
                    tracing::debug!(
                        query_id = envelope.query_id,
                        tenant = %envelope.tenant,
                        "query expired in queue"
                    );
                    continue;
                }
                if !self.pending.record_dispatch(envelope.query_id, out_tx.clone()) {
                    continue;
                }

                let msg = FrontendToClient {
                    kind: FrontendMessageKind::HttpRequest as i32,
                    query_id: envelope.query_id,
                    http_request: Some(envelope.request),
                };
                if out_tx.send(Ok(msg)).await.is_err() {
                    // Stream went away with the query dispatched. The
                    // pending entry stays for a possible QueryResult
                    // delivery; the disconnect guard below flags it so the
                    // handler reports worker-lost at its deadline.
                    break;
                }

                // Depth-1 pipelining: wait for this query's answer before
                // pulling the next one for this stream.
                tokio::select! {
                    _ = stream_done.cancelled() => break,
                    ack = ack_rx.recv() => {
                        if ack.is_none() {
                            break;
                        }
                    }
                }
            }
        });
    }

    /// Graceful stop: refuse new queries, drain the queues, tell every
    /// querier to stop reconnecting, fail whatever never got answered.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.queue.shutdown(self.config.shutdown_grace).await;

        let deadline = Instant::now() + self.config.shutdown_grace;
        while !self.pending.is_empty() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.pending.fail_all();
    }

    /// Requests currently queued or awaiting results. Exposed for tests and
    /// operational introspection.
    pub fn inflight(&self) -> usize {
        self.pending.len()
    }
}

fn answer_to_result(response: Option<pb::HttpResponse>, error: String) -> ExecResult {
    match response {
        Some(response) => Ok(response),
        None => Err(FrontendError::Worker(error)),
    }
}

fn shutdown_message() -> FrontendToClient {
    FrontendToClient {
        kind: FrontendMessageKind::Shutdown as i32,
        query_id: 0,
        http_request: None,
    }
}

struct QueryGuard<'a> {
    frontend: &'a Frontend,
    query_id: u64,
    cancel: CancellationToken,
    armed: bool,
}

impl Drop for QueryGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.cancel.cancel();
            self.frontend.cancel_query(self.query_id);
        }
    }
}

struct DisconnectGuard {
    frontend: Arc<Frontend>,
    worker_id: String,
    out_tx: StreamSender,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        self.frontend.queue.unregister_worker(&self.worker_id);
        // Queries dispatched on this stream are orphaned, not failed:
        // their entries stay for a possible out-of-band result, flagged so
        // the waiting handlers report worker-lost at their deadlines.
        self.frontend.pending.mark_worker_lost(&self.out_tx);
        let connected = self.frontend.connected.fetch_sub(1, Ordering::SeqCst) - 1;
        tracing::info!(worker = %self.worker_id, connected, "querier disconnected");
        #[cfg(feature = "metrics")]
        metrics::gauge!("querygate_frontend_connected_queriers").set(connected as f64);
    }
}
