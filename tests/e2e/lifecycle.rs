//! Graceful shutdown and admission limits.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{Request, Response};
use querygate_core::FnListener;
use querygate_frontend::{FrontendConfig, Handler};
use querygate_worker::{HandlerError, WorkerConfig, WorkerEvent};
use tower::service_fn;

use super::support;

#[tokio::test]
async fn shutdown_notifies_workers_and_they_stop_reconnecting() {
    let (frontend, grpc) = support::start_frontend(
        FrontendConfig::builder()
            .shutdown_grace(Duration::from_millis(100))
            .build(),
    )
    .await;

    let (shutdown_seen_tx, shutdown_seen_rx) = tokio::sync::oneshot::channel::<()>();
    let shutdown_seen_tx = std::sync::Mutex::new(Some(shutdown_seen_tx));
    let config = WorkerConfig::builder(format!("http://{grpc}"))
        .parallelism(1)
        .client_id("querier-1")
        .backoff(Duration::from_millis(10), Duration::from_millis(100))
        .on_event(FnListener::new(move |event: &WorkerEvent| {
            if matches!(event, WorkerEvent::ShutdownReceived { .. }) {
                if let Some(tx) = shutdown_seen_tx.lock().unwrap().take() {
                    let _ = tx.send(());
                }
            }
        }))
        .build();
    let (_token, run) = support::spawn_worker_with_config(
        config,
        service_fn(|_req: Request<Bytes>| async move {
            Ok::<_, HandlerError>(Response::new(Bytes::new()))
        }),
    );
    support::wait_for_connected(&frontend, 1).await;

    frontend.shutdown().await;

    // The worker must observe the shutdown message and retire for good.
    tokio::time::timeout(Duration::from_secs(2), shutdown_seen_rx)
        .await
        .expect("worker never saw the shutdown message")
        .expect("event listener dropped");
    tokio::time::timeout(Duration::from_secs(2), run)
        .await
        .expect("worker kept running after shutdown")
        .expect("worker task panicked")
        .expect("worker returned an error");

    // New queries are refused immediately.
    let handler = Handler::new(Arc::clone(&frontend)).unwrap();
    let resp = support::call(&handler, support::query_request("tenant-a", "/", b"")).await;
    assert_eq!(resp.status(), 500);
}

#[tokio::test]
async fn full_tenant_queue_returns_too_many_requests() {
    // No workers: the first query occupies the single queue slot.
    let (frontend, _grpc) = support::start_frontend(
        FrontendConfig::builder().max_outstanding_per_tenant(1).build(),
    )
    .await;
    let handler = Handler::new(Arc::clone(&frontend)).unwrap();

    let queued_handler = handler.clone();
    let _queued = tokio::spawn(async move {
        support::call(
            &queued_handler,
            support::query_request("tenant-a", "/first", b""),
        )
        .await
    });
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while frontend.inflight() < 1 {
        assert!(tokio::time::Instant::now() < deadline, "query never queued");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    // The pending entry appears before the enqueue itself; settle briefly.
    tokio::time::sleep(Duration::from_millis(10)).await;

    let resp = support::call(&handler, support::query_request("tenant-a", "/second", b"")).await;
    assert_eq!(resp.status(), 429);

    // Other tenants still have room.
    let other = tokio::spawn({
        let handler = handler.clone();
        async move {
            support::call(
                &handler,
                support::query_request("tenant-b", "/first", b""),
            )
            .await
        }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(frontend.inflight(), 2);
    other.abort();
}

#[tokio::test]
async fn oversized_body_is_rejected_end_to_end() {
    let (frontend, _grpc) =
        support::start_frontend(FrontendConfig::builder().max_body_size(1).build()).await;
    let handler = Handler::new(frontend).unwrap();

    let resp = support::call(
        &handler,
        support::query_request("tenant-a", "/", b"definitely more than one byte"),
    )
    .await;
    assert_eq!(resp.status(), 413);
}
