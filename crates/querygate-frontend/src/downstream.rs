//! Downstream-URL proxy mode: no queueing, no queriers, just forward.

use bytes::Bytes;
use http::{Request, Response};

use crate::error::FrontendError;

#[derive(Debug, Clone)]
pub(crate) struct DownstreamProxy {
    base: reqwest::Url,
    client: reqwest::Client,
}

impl DownstreamProxy {
    pub(crate) fn new(url: &str) -> Result<Self, FrontendError> {
        let base = reqwest::Url::parse(url).map_err(|_| FrontendError::InvalidDownstreamUrl {
            url: url.to_owned(),
        })?;
        Ok(Self {
            base,
            client: reqwest::Client::new(),
        })
    }

    pub(crate) async fn forward(&self, req: &Request<Bytes>) -> Result<Response<Bytes>, FrontendError> {
        let mut url = self.base.clone();
        url.set_path(req.uri().path());
        url.set_query(req.uri().query());

        let mut headers = req.headers().clone();
        // The downstream must observe its own authority as the Host, not
        // the frontend's.
        headers.remove(http::header::HOST);

        let outgoing = self
            .client
            .request(req.method().clone(), url)
            .headers(headers)
            .body(req.body().clone())
            .build()?;
        let received = self.client.execute(outgoing).await?;

        let status = received.status();
        let resp_headers = received.headers().clone();
        let body = received.bytes().await?;

        let mut resp = Response::new(body);
        *resp.status_mut() = status;
        *resp.headers_mut() = resp_headers;
        Ok(resp)
    }
}
