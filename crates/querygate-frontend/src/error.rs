//! Frontend error kinds and their HTTP rendering.

use bytes::Bytes;
use http::{Response, StatusCode};
use querygate_proto::WireError;
use querygate_queue::EnqueueError;

/// Non-standard "client closed request" status popularized by nginx.
pub(crate) fn status_client_closed_request() -> StatusCode {
    StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Everything that can go wrong between accepting an HTTP query and writing
/// its response.
#[derive(Debug, thiserror::Error)]
pub enum FrontendError {
    /// The request body exceeded `max_body_size`. Detected before enqueue.
    #[error("http: request body too large")]
    BodyTooLarge,
    /// No tenant id on the request; the auth layer did not run or the
    /// header is missing.
    #[error("no org id")]
    MissingTenant,
    /// The tenant queue is at capacity.
    #[error("too many outstanding requests")]
    TooManyOutstanding,
    /// The query deadline elapsed before a worker answered.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
    /// The caller went away before the result arrived.
    #[error("context canceled")]
    Cancelled,
    /// A structured error carrying the exact status to report.
    #[error("{message}")]
    Status { code: StatusCode, message: String },
    /// The frontend is shutting down.
    #[error("frontend stopped")]
    Stopped,
    /// The query was dispatched to a worker whose stream went away before
    /// an answer arrived, and no out-of-band result landed by the
    /// deadline.
    #[error("lost contact with querier")]
    WorkerLost,
    /// The worker reported an execution failure without a response.
    #[error("error processing request: {0}")]
    Worker(String),
    /// `downstream_url` could not be parsed at startup.
    #[error("invalid downstream url {url:?}")]
    InvalidDownstreamUrl { url: String },
    /// Downstream-mode proxying failed.
    #[error("downstream request failed: {0}")]
    Downstream(#[from] reqwest::Error),
    /// The worker's wire response did not decode.
    #[error(transparent)]
    Wire(#[from] WireError),
}

impl FrontendError {
    /// The user-visible status for this error kind.
    pub fn status(&self) -> StatusCode {
        match self {
            FrontendError::BodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            FrontendError::MissingTenant => StatusCode::UNAUTHORIZED,
            FrontendError::TooManyOutstanding => StatusCode::TOO_MANY_REQUESTS,
            FrontendError::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            FrontendError::Cancelled => status_client_closed_request(),
            FrontendError::Status { code, .. } => *code,
            FrontendError::Stopped
            | FrontendError::WorkerLost
            | FrontendError::Worker(_)
            | FrontendError::InvalidDownstreamUrl { .. }
            | FrontendError::Downstream(_)
            | FrontendError::Wire(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<EnqueueError> for FrontendError {
    fn from(err: EnqueueError) -> Self {
        match err {
            EnqueueError::TooManyOutstanding => FrontendError::TooManyOutstanding,
            EnqueueError::NoTenant => FrontendError::MissingTenant,
            EnqueueError::Stopped => FrontendError::Stopped,
        }
    }
}

/// Renders an error as the HTTP response the caller sees. The single exit
/// point for every error path in the handler.
pub fn error_response(err: &FrontendError) -> Response<Bytes> {
    let mut resp = Response::new(Bytes::from(format!("{err}\n")));
    *resp.status_mut() = err.status();
    resp.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    resp
}
