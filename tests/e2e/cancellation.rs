//! Cancellation: propagated after dispatch, and never retried.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{Request, Response};
use querygate_frontend::{FrontendConfig, Handler};
use querygate_worker::HandlerError;
use tokio::sync::Notify;
use tower::service_fn;

use super::support;

#[tokio::test]
async fn cancelled_query_is_attempted_exactly_once() {
    let entered = Arc::new(AtomicUsize::new(0));
    let entered_notify = Arc::new(Notify::new());

    let handler_entered = Arc::clone(&entered);
    let handler_notify = Arc::clone(&entered_notify);

    let (frontend, grpc) = support::start_frontend(FrontendConfig::default()).await;
    let (_shutdown, _run) = support::spawn_worker(
        grpc,
        "querier-1",
        1,
        service_fn(move |req: Request<Bytes>| {
            let entered = Arc::clone(&handler_entered);
            let notify = Arc::clone(&handler_notify);
            async move {
                if req.uri().path() == "/slow" {
                    entered.fetch_add(1, Ordering::SeqCst);
                    notify.notify_one();
                    // Holds the stream slot until the frontend cancels us.
                    tokio::time::sleep(Duration::from_secs(30)).await;
                }
                Ok::<_, HandlerError>(Response::new(Bytes::new()))
            }
        }),
    );
    support::wait_for_connected(&frontend, 1).await;
    let handler = Handler::new(Arc::clone(&frontend)).unwrap();

    // Dispatch a query the worker will sit on, then hang up the caller.
    let inflight_handler = handler.clone();
    let caller = tokio::spawn(async move {
        support::call(
            &inflight_handler,
            support::query_request("tenant-a", "/slow", b""),
        )
        .await
    });
    entered_notify.notified().await;
    caller.abort();
    let _ = caller.await;

    // The cancel reaches the worker, which frees the stream for new work;
    // a follow-up query must round-trip without the first being re-run.
    tokio::time::timeout(Duration::from_secs(2), async {
        let resp = support::call(&handler, support::query_request("tenant-a", "/", b"")).await;
        assert_eq!(resp.status(), 200);
    })
    .await
    .expect("stream still wedged after cancellation");

    assert_eq!(
        entered.load(Ordering::SeqCst),
        1,
        "cancelled query must be attempted exactly once"
    );
    assert_eq!(frontend.inflight(), 0);
}

#[tokio::test]
async fn query_cancelled_while_queued_is_never_dispatched() {
    let entered = Arc::new(AtomicUsize::new(0));
    let handler_entered = Arc::clone(&entered);

    // No worker yet: the first query has to sit in the queue.
    let (frontend, grpc) = support::start_frontend(FrontendConfig::default()).await;
    let handler = Handler::new(Arc::clone(&frontend)).unwrap();

    let queued_handler = handler.clone();
    let caller = tokio::spawn(async move {
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
    caller.abort();
    let _ = caller.await;

    let (_shutdown, _run) = support::spawn_worker(
        grpc,
        "querier-1",
        1,
        service_fn(move |req: Request<Bytes>| {
            let entered = Arc::clone(&handler_entered);
            async move {
                if req.uri().path() == "/first" {
                    entered.fetch_add(1, Ordering::SeqCst);
                }
                Ok::<_, HandlerError>(Response::new(Bytes::new()))
            }
        }),
    );
    support::wait_for_connected(&frontend, 1).await;

    let resp = support::call(&handler, support::query_request("tenant-a", "/second", b"")).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(
        entered.load(Ordering::SeqCst),
        0,
        "a query cancelled while queued must not reach the worker"
    );
}

#[tokio::test]
async fn worker_disconnect_mid_flight_surfaces_worker_lost_not_timeout() {
    let entered = Arc::new(Notify::new());
    let entered_in_worker = Arc::clone(&entered);

    let (frontend, grpc) = support::start_frontend(
        FrontendConfig::builder()
            .query_timeout(Duration::from_millis(500))
            .build(),
    )
    .await;
    let (worker_shutdown, run) = support::spawn_worker(
        grpc,
        "querier-1",
        1,
        service_fn(move |_req: Request<Bytes>| {
            let entered = Arc::clone(&entered_in_worker);
            async move {
                entered.notify_one();
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok::<_, HandlerError>(Response::new(Bytes::new()))
            }
        }),
    );
    support::wait_for_connected(&frontend, 1).await;

    let handler = Handler::new(Arc::clone(&frontend)).unwrap();
    let caller = tokio::spawn({
        let handler = handler.clone();
        async move {
            support::call(&handler, support::query_request("tenant-a", "/slow", b"")).await
        }
    });
    entered.notified().await;

    // Tear the worker down with the query still executing: its stream
    // drops, and the frontend must flag the orphaned query rather than
    // fail it outright.
    worker_shutdown.cancel();
    let _ = run.await;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while frontend.connected_queriers() > 0 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "worker stream never detached"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let resp = caller.await.unwrap();
    assert_eq!(
        resp.status(),
        500,
        "a dispatched query on a dead worker is worker-lost, not a deadline"
    );
    assert!(
        std::str::from_utf8(resp.body())
            .unwrap()
            .contains("lost contact with querier"),
        "unexpected body: {:?}",
        resp.body()
    );
    assert_eq!(frontend.inflight(), 0);
}

#[tokio::test]
async fn unanswered_query_times_out_with_gateway_timeout() {
    let (frontend, grpc) = support::start_frontend(
        FrontendConfig::builder()
            .query_timeout(Duration::from_millis(100))
            .build(),
    )
    .await;
    let (_shutdown, _run) = support::spawn_worker(
        grpc,
        "querier-1",
        1,
        service_fn(|_req: Request<Bytes>| async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<_, HandlerError>(Response::new(Bytes::new()))
        }),
    );
    support::wait_for_connected(&frontend, 1).await;

    let handler = Handler::new(Arc::clone(&frontend)).unwrap();
    let resp = support::call(&handler, support::query_request("tenant-a", "/", b"")).await;
    assert_eq!(resp.status(), 504);
    assert_eq!(frontend.inflight(), 0);
}
