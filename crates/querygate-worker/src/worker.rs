//! The worker loop: pull queries from the frontend, run them locally,
//! answer on the stream.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use bytes::Bytes;
use http::{Request, Response, StatusCode};
use querygate_proto::{
    request_from_wire, response_to_wire, ClientToFrontend, FrontendClient, FrontendMessageKind,
};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Channel;
use tower::ServiceExt;
use tower_service::Service;

use crate::backoff::Backoff;
use crate::config::WorkerConfig;
use crate::error::{error_response, HandlerError, WorkerError};
use crate::events::WorkerEvent;

/// How each stream iteration ended.
enum StreamOutcome {
    /// The frontend closed the stream; reconnect.
    Ended,
    /// The frontend sent SHUTDOWN; do not reconnect.
    FrontendShutdown,
    /// Local shutdown was requested.
    Cancelled,
}

/// Queries currently executing on one stream, by query id.
type InflightMap = Arc<Mutex<HashMap<u64, CancellationToken>>>;

fn lock_inflight(map: &InflightMap) -> MutexGuard<'_, HashMap<u64, CancellationToken>> {
    map.lock().unwrap_or_else(|e| e.into_inner())
}

/// A querier-side worker.
///
/// Maintains `config.concurrency()` parallel `Process` streams to the
/// frontend. Each stream pulls at most one query at a time, executes it
/// against the local handler, and answers with a status-coded response.
/// Transport failures reconnect with jittered exponential backoff; a
/// SHUTDOWN message retires the stream for good.
pub struct Worker<S> {
    config: Arc<WorkerConfig>,
    handler: S,
}

impl<S> Worker<S>
where
    S: Service<Request<Bytes>, Response = Response<Bytes>, Error = HandlerError>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    pub fn new(config: WorkerConfig, handler: S) -> Self {
        Self {
            config: Arc::new(config),
            handler,
        }
    }

    /// Runs until `shutdown` fires or the frontend retires every stream.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), WorkerError> {
        let channel = Channel::from_shared(self.config.frontend_address.clone())
            .map_err(|_| WorkerError::InvalidAddress {
                address: self.config.frontend_address.clone(),
            })?
            .connect_lazy();

        let mut streams = Vec::with_capacity(self.config.concurrency());
        for _ in 0..self.config.concurrency() {
            streams.push(tokio::spawn(stream_loop(
                channel.clone(),
                Arc::clone(&self.config),
                self.handler.clone(),
                shutdown.clone(),
            )));
        }
        for stream in streams {
            // A panicking stream task is a bug in the handler; surface the
            // remaining streams' shutdown rather than aborting run().
            let _ = stream.await;
        }
        Ok(())
    }
}

async fn stream_loop<S>(
    channel: Channel,
    config: Arc<WorkerConfig>,
    handler: S,
    shutdown: CancellationToken,
) where
    S: Service<Request<Bytes>, Response = Response<Bytes>, Error = HandlerError>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    let backoff = Backoff::new(config.min_backoff, config.max_backoff);
    let mut attempt = 0usize;

    loop {
        if shutdown.is_cancelled() {
            return;
        }

        match process_stream(&channel, &config, handler.clone(), &shutdown).await {
            Ok(StreamOutcome::FrontendShutdown) => {
                config.event_listeners.emit(&WorkerEvent::ShutdownReceived {
                    worker: config.client_id.clone(),
                    timestamp: Instant::now(),
                });
                tracing::info!(worker = %config.client_id, "frontend requested shutdown");
                return;
            }
            Ok(StreamOutcome::Cancelled) => return,
            Ok(StreamOutcome::Ended) => {
                attempt = 0;
            }
            Err(err) => {
                attempt += 1;
                config.event_listeners.emit(&WorkerEvent::Disconnected {
                    worker: config.client_id.clone(),
                    attempt,
                    timestamp: Instant::now(),
                });
                let delay = backoff.delay_for_attempt(attempt - 1);
                tracing::warn!(
                    worker = %config.client_id,
                    error = %err,
                    attempt,
                    ?delay,
                    "frontend stream failed, backing off before reconnect"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.cancelled() => return,
                }
            }
        }
    }
}

async fn process_stream<S>(
    channel: &Channel,
    config: &Arc<WorkerConfig>,
    handler: S,
    shutdown: &CancellationToken,
) -> Result<StreamOutcome, WorkerError>
where
    S: Service<Request<Bytes>, Response = Response<Bytes>, Error = HandlerError>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    let mut client = FrontendClient::new(channel.clone());

    let (tx, rx) = tokio::sync::mpsc::channel::<ClientToFrontend>(8);
    let hello = ClientToFrontend {
        query_id: 0,
        client_id: config.client_id.clone(),
        http_response: None,
        error: String::new(),
    };
    // Capacity is fresh, the hello always fits.
    let _ = tx.try_send(hello);

    let response = client.process(ReceiverStream::new(rx)).await?;
    let mut inbound = response.into_inner();

    config.event_listeners.emit(&WorkerEvent::Connected {
        worker: config.client_id.clone(),
        timestamp: Instant::now(),
    });
    tracing::debug!(worker = %config.client_id, "frontend stream established");

    let inflight: InflightMap = InflightMap::default();

    loop {
        let message = tokio::select! {
            _ = shutdown.cancelled() => return Ok(StreamOutcome::Cancelled),
            message = inbound.message() => message?,
        };
        let Some(message) = message else {
            return Ok(StreamOutcome::Ended);
        };

        match message.kind() {
            FrontendMessageKind::HttpRequest => {
                let Some(wire_req) = message.http_request else {
                    tracing::warn!(
                        query_id = message.query_id,
                        "request message without a request body"
                    );
                    continue;
                };
                let token = CancellationToken::new();
                lock_inflight(&inflight).insert(message.query_id, token.clone());
                tokio::spawn(execute_and_answer(
                    handler.clone(),
                    Arc::clone(config),
                    message.query_id,
                    wire_req,
                    token,
                    tx.clone(),
                    Arc::clone(&inflight),
                ));
            }
            FrontendMessageKind::Cancel => {
                if let Some(token) = lock_inflight(&inflight).remove(&message.query_id) {
                    token.cancel();
                }
            }
            FrontendMessageKind::Shutdown => return Ok(StreamOutcome::FrontendShutdown),
        }
    }
}

async fn execute_and_answer<S>(
    mut handler: S,
    config: Arc<WorkerConfig>,
    query_id: u64,
    wire_req: querygate_proto::HttpRequest,
    token: CancellationToken,
    tx: tokio::sync::mpsc::Sender<ClientToFrontend>,
    inflight: InflightMap,
) where
    S: Service<Request<Bytes>, Response = Response<Bytes>, Error = HandlerError> + Send,
    S::Future: Send,
{
    config.event_listeners.emit(&WorkerEvent::RequestStarted {
        worker: config.client_id.clone(),
        query_id,
        timestamp: Instant::now(),
    });

    let outcome = match request_from_wire(wire_req) {
        Ok(req) => {
            let execution = async {
                handler.ready().await?;
                handler.call(req).await
            };
            tokio::select! {
                _ = token.cancelled() => Err(HandlerError::Cancelled),
                result = execution => result,
            }
        }
        Err(err) => Err(HandlerError::Status {
            code: StatusCode::BAD_REQUEST,
            message: err.to_string(),
        }),
    };

    lock_inflight(&inflight).remove(&query_id);

    let response = match outcome {
        Ok(response) => response,
        Err(err) => {
            tracing::debug!(query_id, error = %err, "query execution failed");
            error_response(&err)
        }
    };
    let answer = ClientToFrontend {
        query_id,
        client_id: String::new(),
        http_response: Some(response_to_wire(&response)),
        error: String::new(),
    };
    if tx.send(answer).await.is_err() {
        tracing::debug!(query_id, "stream closed before the answer was sent");
    }

    config.event_listeners.emit(&WorkerEvent::RequestFinished {
        worker: config.client_id.clone(),
        query_id,
        timestamp: Instant::now(),
    });
}
