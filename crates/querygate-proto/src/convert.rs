//! Conversions between wire HTTP messages and `http` crate types.
//!
//! Encoding (native -> wire) never fails: header values that are not valid
//! UTF-8 are carried lossily, which matches what the frontend is willing to
//! forward anyway. Decoding validates everything and reports [`WireError`].

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{Method, Request, Response, StatusCode, Uri};

use crate::pb::{Header, HttpRequest, HttpResponse};

/// Decoding failure for a wire HTTP message.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("invalid http method {0:?}")]
    InvalidMethod(String),
    #[error("invalid url {0:?}")]
    InvalidUrl(String),
    #[error("invalid status code {0}")]
    InvalidStatus(u32),
    #[error("invalid header name {0:?}")]
    InvalidHeaderName(String),
    #[error("invalid value for header {0:?}")]
    InvalidHeaderValue(String),
}

impl From<WireError> for tonic::Status {
    fn from(err: WireError) -> Self {
        tonic::Status::invalid_argument(err.to_string())
    }
}

fn headers_to_wire(headers: &http::HeaderMap) -> Vec<Header> {
    let mut out: Vec<Header> = Vec::with_capacity(headers.keys_len());
    for key in headers.keys() {
        let values = headers
            .get_all(key)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect();
        out.push(Header {
            key: key.as_str().to_owned(),
            values,
        });
    }
    out
}

fn headers_from_wire(headers: Vec<Header>, map: &mut http::HeaderMap) -> Result<(), WireError> {
    for header in headers {
        let name = HeaderName::from_bytes(header.key.as_bytes())
            .map_err(|_| WireError::InvalidHeaderName(header.key.clone()))?;
        for value in header.values {
            let value = HeaderValue::from_str(&value)
                .map_err(|_| WireError::InvalidHeaderValue(header.key.clone()))?;
            map.append(name.clone(), value);
        }
    }
    Ok(())
}

/// Serializes a request for transport to a querier.
pub fn request_to_wire(req: &Request<Bytes>) -> HttpRequest {
    HttpRequest {
        method: req.method().as_str().to_owned(),
        url: req.uri().to_string(),
        headers: headers_to_wire(req.headers()),
        body: req.body().to_vec(),
    }
}

/// Reconstructs a request on the querier side.
pub fn request_from_wire(wire: HttpRequest) -> Result<Request<Bytes>, WireError> {
    let method = Method::from_bytes(wire.method.as_bytes())
        .map_err(|_| WireError::InvalidMethod(wire.method.clone()))?;
    let uri: Uri = wire
        .url
        .parse()
        .map_err(|_| WireError::InvalidUrl(wire.url.clone()))?;

    let mut req = Request::new(Bytes::from(wire.body));
    *req.method_mut() = method;
    *req.uri_mut() = uri;
    headers_from_wire(wire.headers, req.headers_mut())?;
    Ok(req)
}

/// Serializes a querier's response for transport back to the frontend.
pub fn response_to_wire(resp: &Response<Bytes>) -> HttpResponse {
    HttpResponse {
        code: u32::from(resp.status().as_u16()),
        headers: headers_to_wire(resp.headers()),
        body: resp.body().to_vec(),
    }
}

/// Reconstructs a response on the frontend side.
pub fn response_from_wire(wire: HttpResponse) -> Result<Response<Bytes>, WireError> {
    let code = u16::try_from(wire.code).map_err(|_| WireError::InvalidStatus(wire.code))?;
    let status = StatusCode::from_u16(code).map_err(|_| WireError::InvalidStatus(wire.code))?;

    let mut resp = Response::new(Bytes::from(wire.body));
    *resp.status_mut() = status;
    headers_from_wire(wire.headers, resp.headers_mut())?;
    Ok(resp)
}
