//! Downstream-URL mode: straight proxying, downstream host rewriting.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http::Request;
use querygate_frontend::{Frontend, FrontendConfig, Handler};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::support;

/// A one-connection-at-a-time HTTP server that records the Host header it
/// observes and echoes a fixed body.
async fn spawn_recording_http_server(seen_host: Arc<Mutex<Option<String>>>) -> std::net::SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let seen_host = Arc::clone(&seen_host);
            tokio::spawn(async move {
                let mut buf = vec![0u8; 8192];
                let mut read = 0;
                // Read until the end of the request head; bodies in these
                // tests are small enough to arrive with it.
                loop {
                    match socket.read(&mut buf[read..]).await {
                        Ok(0) => break,
                        Ok(n) => {
                            read += n;
                            if buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                                break;
                            }
                        }
                        Err(_) => return,
                    }
                }

                let head = String::from_utf8_lossy(&buf[..read]).into_owned();
                let host = head.lines().find_map(|line| {
                    line.to_ascii_lowercase()
                        .strip_prefix("host:")
                        .map(|_| line[5..].trim().to_owned())
                });
                *seen_host.lock().unwrap() = host;

                let body = b"downstream says hi";
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.write_all(body).await;
            });
        }
    });
    addr
}

#[tokio::test]
async fn downstream_observes_its_own_host() {
    let seen_host = Arc::new(Mutex::new(None));
    let addr = spawn_recording_http_server(Arc::clone(&seen_host)).await;

    let frontend = Frontend::new(
        FrontendConfig::builder()
            .downstream_url(format!("http://{addr}"))
            .build(),
    );
    let handler = Handler::new(frontend).unwrap();

    // Simulate a request that arrived addressed to the frontend itself.
    let mut req = Request::new(Bytes::from_static(b"query=up"));
    *req.method_mut() = http::Method::POST;
    *req.uri_mut() = "/api/prom/query".parse().unwrap();
    req.headers_mut()
        .insert(http::header::HOST, "frontend.example:80".parse().unwrap());

    let resp = support::call(&handler, req).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.body(), &Bytes::from_static(b"downstream says hi"));

    let host = seen_host.lock().unwrap().clone().expect("host recorded");
    assert_eq!(host, addr.to_string(), "downstream must see its own host");
}

#[tokio::test]
async fn downstream_mode_needs_no_tenant() {
    let seen_host = Arc::new(Mutex::new(None));
    let addr = spawn_recording_http_server(Arc::clone(&seen_host)).await;

    let frontend = Frontend::new(
        FrontendConfig::builder()
            .downstream_url(format!("http://{addr}"))
            .build(),
    );
    let handler = Handler::new(frontend).unwrap();

    let resp = support::call(&handler, Request::new(Bytes::new())).await;
    assert_eq!(resp.status(), 200);
}
