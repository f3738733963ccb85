//! Worker-side error kinds and their HTTP rendering.

use bytes::Bytes;
use http::{Response, StatusCode};

fn status_client_closed_request() -> StatusCode {
    StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Failure modes of the local query handler. Whatever the handler reports is
/// converted into a status-coded HTTP response before it leaves the worker,
/// so the frontend can pass it through verbatim.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HandlerError {
    /// The frontend cancelled the query (the caller went away).
    #[error("context canceled")]
    Cancelled,
    /// The handler gave up on its own deadline.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
    /// A structured failure carrying the exact status to report.
    #[error("{message}")]
    Status { code: StatusCode, message: String },
    /// Anything else.
    #[error("{0}")]
    Internal(String),
}

impl HandlerError {
    pub fn status(&self) -> StatusCode {
        match self {
            HandlerError::Cancelled => status_client_closed_request(),
            HandlerError::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            HandlerError::Status { code, .. } => *code,
            HandlerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Renders an execution failure as the response reported to the frontend.
pub fn error_response(err: &HandlerError) -> Response<Bytes> {
    let mut resp = Response::new(Bytes::from(format!("{err}\n")));
    *resp.status_mut() = err.status();
    resp.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    resp
}

/// Errors that stop a worker entirely, as opposed to one failed query.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("invalid frontend address {address:?}")]
    InvalidAddress { address: String },
    #[error("transport error: {0}")]
    Transport(#[from] tonic::Status),
}
