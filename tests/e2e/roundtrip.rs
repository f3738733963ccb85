//! Round-trip and error-mapping behavior through a real worker stream.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http::{Request, Response, StatusCode};
use querygate_frontend::{FrontendConfig, Handler};
use querygate_worker::HandlerError;
use tower::service_fn;

use super::support;

#[tokio::test]
async fn round_trip_preserves_status_headers_and_body() {
    let (frontend, grpc) = support::start_frontend(FrontendConfig::default()).await;
    let (_shutdown, _run) = support::spawn_worker(
        grpc,
        "querier-1",
        1,
        service_fn(|req: Request<Bytes>| async move {
            let mut resp = Response::new(req.into_body());
            *resp.status_mut() = StatusCode::OK;
            resp.headers_mut()
                .insert("x-answered-by", "querier-1".parse().unwrap());
            Ok::<_, HandlerError>(resp)
        }),
    );
    support::wait_for_connected(&frontend, 1).await;

    let handler = Handler::new(Arc::clone(&frontend)).unwrap();
    let resp = support::call(
        &handler,
        support::query_request("tenant-a", "/api/v1/query", b"up{job=\"node\"}"),
    )
    .await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get("x-answered-by").unwrap(), "querier-1");
    assert_eq!(resp.body(), &Bytes::from_static(b"up{job=\"node\"}"));
    assert_eq!(frontend.inflight(), 0);
}

#[tokio::test]
async fn trace_context_headers_reach_the_worker_unchanged() {
    let seen = Arc::new(Mutex::new(None::<String>));
    let seen_in_worker = Arc::clone(&seen);

    let (frontend, grpc) = support::start_frontend(FrontendConfig::default()).await;
    let (_shutdown, _run) = support::spawn_worker(
        grpc,
        "querier-1",
        1,
        service_fn(move |req: Request<Bytes>| {
            let seen = Arc::clone(&seen_in_worker);
            async move {
                *seen.lock().unwrap() = req
                    .headers()
                    .get("traceparent")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned);
                Ok::<_, HandlerError>(Response::new(Bytes::new()))
            }
        }),
    );
    support::wait_for_connected(&frontend, 1).await;

    let traceparent = "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01";
    let mut req = support::query_request("tenant-a", "/", b"");
    req.headers_mut()
        .insert("traceparent", traceparent.parse().unwrap());

    let handler = Handler::new(frontend).unwrap();
    let resp = support::call(&handler, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(seen.lock().unwrap().as_deref(), Some(traceparent));
}

#[tokio::test]
async fn worker_errors_map_to_the_documented_statuses() {
    let (frontend, grpc) = support::start_frontend(FrontendConfig::default()).await;
    let (_shutdown, _run) = support::spawn_worker(
        grpc,
        "querier-1",
        1,
        service_fn(|req: Request<Bytes>| async move {
            match req.uri().path() {
                "/unknown" => Err(HandlerError::Internal("something broke".into())),
                "/deadline" => Err(HandlerError::DeadlineExceeded),
                "/canceled" => Err(HandlerError::Cancelled),
                "/bad-query" => Err(HandlerError::Status {
                    code: StatusCode::BAD_REQUEST,
                    message: "unparseable".into(),
                }),
                _ => Ok(Response::new(Bytes::new())),
            }
        }),
    );
    support::wait_for_connected(&frontend, 1).await;
    let handler = Handler::new(frontend).unwrap();

    for (path, expected) in [
        ("/unknown", 500),
        ("/deadline", 504),
        ("/canceled", 499),
        ("/bad-query", 400),
    ] {
        let resp = support::call(&handler, support::query_request("tenant-a", path, b"")).await;
        assert_eq!(resp.status().as_u16(), expected, "path {path}");
    }
}
