//! A single-process querygate cluster for manual poking.
//!
//! Starts the frontend (HTTP ingress + querier gRPC), plus one in-process
//! echo worker, so that:
//!
//! ```text
//! curl -H 'X-Scope-OrgID: demo' -d 'hello' http://127.0.0.1:8080/api/v1/query
//! ```
//!
//! round-trips through the queue and the worker stream.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use clap::Parser;
use http::{Request, Response};
use querygate_frontend::{Frontend, FrontendConfig, FrontendGrpc, Handler, TenantAuthLayer};
use querygate_worker::{HandlerError, Worker, WorkerConfig};
use tokio_util::sync::CancellationToken;
use tower::{service_fn, ServiceBuilder, ServiceExt};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "local-cluster", about = "Run a querygate frontend with an in-process echo worker")]
struct Args {
    /// HTTP ingress listen address.
    #[arg(long, default_value = "127.0.0.1:8080")]
    http: SocketAddr,

    /// Querier-facing gRPC listen address.
    #[arg(long, default_value = "127.0.0.1:9095")]
    grpc: SocketAddr,

    /// Parallel streams the demo worker keeps open.
    #[arg(long, default_value_t = 2)]
    parallelism: usize,

    /// Log queries slower than this many milliseconds (0 disables).
    #[arg(long, default_value_t = 1000)]
    slow_query_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    let frontend = Frontend::new(
        FrontendConfig::builder()
            .log_queries_longer_than(Duration::from_millis(args.slow_query_ms))
            .shutdown_grace(Duration::from_secs(2))
            .build(),
    );

    let (process_svc, result_svc) = FrontendGrpc::new(frontend.clone()).into_services();
    let grpc_addr = args.grpc;
    tokio::spawn(async move {
        if let Err(err) = tonic::transport::Server::builder()
            .add_service(process_svc)
            .add_service(result_svc)
            .serve(grpc_addr)
            .await
        {
            tracing::error!(%err, "grpc server failed");
        }
    });
    info!(%grpc_addr, "querier gRPC listening");

    let echo = service_fn(|req: Request<Bytes>| async move {
        let mut resp = Response::new(req.into_body());
        resp.headers_mut().insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        Ok::<_, HandlerError>(resp)
    });
    let worker_config = WorkerConfig::builder(format!("http://{grpc_addr}"))
        .parallelism(args.parallelism)
        .client_id("demo-querier")
        .build();
    let worker_shutdown = CancellationToken::new();
    tokio::spawn(Worker::new(worker_config, echo).run(worker_shutdown.clone()));

    let handler = Handler::new(frontend.clone())?;
    let frontend_for_ready = frontend.clone();
    let app = axum::Router::new()
        .route(
            "/ready",
            axum::routing::get(move || {
                let frontend = frontend_for_ready.clone();
                async move {
                    match frontend.check_ready() {
                        Ok(()) => (http::StatusCode::OK, "ready\n".to_owned()),
                        Err(err) => (http::StatusCode::SERVICE_UNAVAILABLE, format!("{err}\n")),
                    }
                }
            }),
        )
        .fallback(move |req: axum::extract::Request| {
            let handler = ServiceBuilder::new()
                .layer(TenantAuthLayer)
                .service(handler.clone());
            async move {
                let (parts, body) = req.into_parts();
                let bytes = axum::body::to_bytes(body, usize::MAX)
                    .await
                    .unwrap_or_default();
                let request = Request::from_parts(parts, bytes);
                match handler.oneshot(request).await {
                    Ok(response) => response.map(axum::body::Body::from),
                    Err(infallible) => match infallible {},
                }
            }
        });

    let listener = tokio::net::TcpListener::bind(args.http).await?;
    info!(http = %args.http, "HTTP ingress listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    info!("shutting down");
    worker_shutdown.cancel();
    frontend.shutdown().await;
    Ok(())
}
