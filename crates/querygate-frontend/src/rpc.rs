//! gRPC services exposed to queriers.

use std::sync::Arc;

use querygate_proto::{
    ClientToFrontend, FrontendForQuerierServer, FrontendServer, FrontendToClient,
    QueryResultRequest, QueryResultResponse, TENANT_METADATA_KEY,
};
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};

use crate::error::FrontendError;
use crate::frontend::Frontend;

/// Tonic-facing wrapper around [`Frontend`]; implements both querier
/// services.
#[derive(Clone)]
pub struct FrontendGrpc {
    frontend: Arc<Frontend>,
}

impl FrontendGrpc {
    pub fn new(frontend: Arc<Frontend>) -> Self {
        Self { frontend }
    }

    /// The two servers to mount on a tonic router.
    pub fn into_services(
        self,
    ) -> (
        FrontendServer<FrontendGrpc>,
        FrontendForQuerierServer<FrontendGrpc>,
    ) {
        (
            FrontendServer::new(self.clone()),
            FrontendForQuerierServer::new(self),
        )
    }
}

#[tonic::async_trait]
impl querygate_proto::Frontend for FrontendGrpc {
    type ProcessStream = ReceiverStream<Result<FrontendToClient, Status>>;

    async fn process(
        &self,
        request: Request<Streaming<ClientToFrontend>>,
    ) -> Result<Response<Self::ProcessStream>, Status> {
        let mut inbound = request.into_inner();

        // The first message identifies the querier; work only flows after.
        let hello = inbound
            .message()
            .await?
            .ok_or_else(|| Status::invalid_argument("stream closed before the hello message"))?;
        if hello.client_id.is_empty() {
            return Err(Status::invalid_argument("hello message missing client_id"));
        }

        let (out_tx, out_rx) = tokio::sync::mpsc::channel(4);
        Arc::clone(&self.frontend).start_querier_stream(hello.client_id, inbound, out_tx);
        Ok(Response::new(ReceiverStream::new(out_rx)))
    }
}

#[tonic::async_trait]
impl querygate_proto::FrontendForQuerier for FrontendGrpc {
    async fn query_result(
        &self,
        request: Request<QueryResultRequest>,
    ) -> Result<Response<QueryResultResponse>, Status> {
        let tenant = request
            .metadata()
            .get(TENANT_METADATA_KEY)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_owned();
        let msg = request.into_inner();

        match msg.http_response {
            Some(response) => {
                self.frontend
                    .deliver_result(msg.query_id, Ok(response), &tenant);
            }
            None => {
                self.frontend.deliver_result(
                    msg.query_id,
                    Err(FrontendError::Worker("empty query result".to_owned())),
                    &tenant,
                );
            }
        }
        Ok(Response::new(QueryResultResponse {}))
    }
}
