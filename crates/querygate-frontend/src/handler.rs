//! The HTTP handler in front of the queues.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::future::BoxFuture;
use http::{Request, Response};
use querygate_proto::TENANT_HEADER;
use tower_service::Service;

use crate::downstream::DownstreamProxy;
use crate::error::{error_response, FrontendError};
use crate::frontend::Frontend;

/// Tenant identity attached to a request, normally by [`TenantAuthLayer`]
/// or an embedder's own authentication middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantId(pub String);

/// Accepts HTTP queries, queues them and writes back whatever the worker
/// produced. In downstream mode it proxies instead of queueing.
#[derive(Clone)]
pub struct Handler {
    frontend: Arc<Frontend>,
    downstream: Option<DownstreamProxy>,
}

impl Handler {
    pub fn new(frontend: Arc<Frontend>) -> Result<Self, FrontendError> {
        let downstream = match frontend.config().downstream_url.as_deref() {
            Some(url) => Some(DownstreamProxy::new(url)?),
            None => None,
        };
        Ok(Self {
            frontend,
            downstream,
        })
    }
}

impl Service<Request<Bytes>> for Handler {
    type Response = Response<Bytes>;
    type Error = std::convert::Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Bytes>) -> Self::Future {
        let frontend = Arc::clone(&self.frontend);
        let downstream = self.downstream.clone();

        Box::pin(async move {
            let started = Instant::now();
            let response = match serve(&frontend, downstream.as_ref(), &req).await {
                Ok(response) => response,
                Err(err) => error_response(&err),
            };
            maybe_log_slow_query(&frontend, &req, started.elapsed());
            Ok(response)
        })
    }
}

async fn serve(
    frontend: &Frontend,
    downstream: Option<&DownstreamProxy>,
    req: &Request<Bytes>,
) -> Result<Response<Bytes>, FrontendError> {
    if let Some(limit) = frontend.config().max_body_size {
        if req.body().len() > limit {
            return Err(FrontendError::BodyTooLarge);
        }
    }

    if let Some(proxy) = downstream {
        return proxy.forward(req).await;
    }

    let tenant = tenant_of(req).ok_or(FrontendError::MissingTenant)?;
    frontend.enqueue_and_wait(&tenant, req).await
}

fn tenant_of(req: &Request<Bytes>) -> Option<String> {
    if let Some(TenantId(tenant)) = req.extensions().get::<TenantId>() {
        if !tenant.is_empty() {
            return Some(tenant.clone());
        }
    }
    req.headers()
        .get(TENANT_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
}

fn is_form(req: &Request<Bytes>) -> bool {
    req.headers()
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false)
}

/// Strict urlencoded parse: unlike `serde_urlencoded`, which substitutes
/// its way past broken input, a stray `%` or non-UTF-8 byte is an error, so
/// a garbage body is reported instead of silently logged as garbage params.
fn strict_form_pairs(body: &[u8]) -> Option<Vec<(String, String)>> {
    let text = std::str::from_utf8(body).ok()?;
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes.get(i + 1..i + 3)?;
            if !hex.iter().all(u8::is_ascii_hexdigit) {
                return None;
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    serde_urlencoded::from_str::<Vec<(String, String)>>(text).ok()
}

/// URL query and form parameters merged by name. The bool reports a form
/// body that failed to parse.
fn slow_query_params(req: &Request<Bytes>) -> (BTreeMap<String, Vec<String>>, bool) {
    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut form_failed = false;

    if let Some(query) = req.uri().query() {
        if let Ok(pairs) = serde_urlencoded::from_str::<Vec<(String, String)>>(query) {
            for (name, value) in pairs {
                params.entry(name).or_default().push(value);
            }
        }
    }

    if is_form(req) {
        match strict_form_pairs(req.body()) {
            Some(pairs) => {
                for (name, value) in pairs {
                    params.entry(name).or_default().push(value);
                }
            }
            None => form_failed = true,
        }
    }

    (params, form_failed)
}

fn slow_query_line(req: &Request<Bytes>, elapsed: Duration) -> (String, bool) {
    let (params, form_failed) = slow_query_params(req);

    let host = req
        .uri()
        .authority()
        .map(|a| a.as_str().to_owned())
        .or_else(|| {
            req.headers()
                .get(http::header::HOST)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        })
        .unwrap_or_default();

    let mut line = format!(
        "msg=\"slow query detected\" method={} host={} path={} time_taken={:?}",
        req.method(),
        host,
        req.uri().path(),
        elapsed,
    );
    for (name, values) in &params {
        line.push_str(&format!(" param_{}={}", name, values.join(",")));
    }
    (line, form_failed)
}

fn maybe_log_slow_query(frontend: &Frontend, req: &Request<Bytes>, elapsed: Duration) {
    let threshold = frontend.config().log_queries_longer_than;
    if threshold.is_zero() || elapsed <= threshold {
        return;
    }

    let (line, form_failed) = slow_query_line(req, elapsed);
    if form_failed {
        tracing::warn!("unable to parse form for request");
    }
    tracing::warn!(target: "querygate::frontend::slow_query", "{line}");
}

/// Copies the conventional `X-Scope-OrgID` header into a [`TenantId`]
/// request extension. Embedders with their own authentication insert the
/// extension themselves and skip this layer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TenantAuthLayer;

impl<S> tower_layer::Layer<S> for TenantAuthLayer {
    type Service = TenantAuth<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TenantAuth { inner }
    }
}

/// See [`TenantAuthLayer`].
#[derive(Debug, Clone)]
pub struct TenantAuth<S> {
    inner: S,
}

impl<S, B> Service<Request<B>> for TenantAuth<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        if req.extensions().get::<TenantId>().is_none() {
            let tenant = req
                .headers()
                .get(TENANT_HEADER)
                .and_then(|v| v.to_str().ok())
                .filter(|t| !t.is_empty())
                .map(str::to_owned);
            if let Some(tenant) = tenant {
                req.extensions_mut().insert(TenantId(tenant));
            }
        }
        self.inner.call(req)
    }
}
