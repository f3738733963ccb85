//! Shared harness: a real frontend gRPC server on a loopback port plus
//! in-process workers dialing it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{Request, Response};
use querygate_frontend::{Frontend, FrontendConfig, FrontendGrpc, Handler};
use querygate_worker::{HandlerError, Worker, WorkerConfig, WorkerError};
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tower::{Service, ServiceExt};

/// Binds the querier-facing gRPC services on an ephemeral loopback port.
pub async fn serve_grpc(frontend: &Arc<Frontend>) -> SocketAddr {
    let (process_svc, result_svc) = FrontendGrpc::new(Arc::clone(frontend)).into_services();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        let _ = tonic::transport::Server::builder()
            .add_service(process_svc)
            .add_service(result_svc)
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await;
    });
    addr
}

/// Starts a frontend and its gRPC endpoint.
pub async fn start_frontend(config: FrontendConfig) -> (Arc<Frontend>, SocketAddr) {
    let frontend = Frontend::new(config);
    let addr = serve_grpc(&frontend).await;
    (frontend, addr)
}

/// Spawns a worker with fast reconnect backoff, suitable for tests.
pub fn spawn_worker<S>(
    grpc: SocketAddr,
    client_id: &str,
    parallelism: usize,
    handler: S,
) -> (
    CancellationToken,
    tokio::task::JoinHandle<Result<(), WorkerError>>,
)
where
    S: Service<Request<Bytes>, Response = Response<Bytes>, Error = HandlerError>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    let config = WorkerConfig::builder(format!("http://{grpc}"))
        .parallelism(parallelism)
        .client_id(client_id)
        .backoff(Duration::from_millis(10), Duration::from_millis(100))
        .build();
    spawn_worker_with_config(config, handler)
}

pub fn spawn_worker_with_config<S>(
    config: WorkerConfig,
    handler: S,
) -> (
    CancellationToken,
    tokio::task::JoinHandle<Result<(), WorkerError>>,
)
where
    S: Service<Request<Bytes>, Response = Response<Bytes>, Error = HandlerError>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(Worker::new(config, handler).run(shutdown.clone()));
    (shutdown, handle)
}

/// Polls until `count` querier streams are attached. Panics after two
/// seconds; a test that cannot connect a worker cannot pass anyway.
pub async fn wait_for_connected(frontend: &Frontend, count: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while frontend.connected_queriers() < count {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {count} connected queriers"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// A query with the conventional tenant header.
pub fn query_request(tenant: &str, path: &str, body: &'static [u8]) -> Request<Bytes> {
    let mut req = Request::new(Bytes::from_static(body));
    *req.method_mut() = http::Method::POST;
    *req.uri_mut() = path.parse().expect("test uri");
    req.headers_mut()
        .insert("X-Scope-OrgID", tenant.parse().expect("tenant header"));
    req
}

/// Drives one request through the handler.
pub async fn call(handler: &Handler, req: Request<Bytes>) -> Response<Bytes> {
    handler
        .clone()
        .oneshot(req)
        .await
        .expect("handler is infallible")
}
