//! Wire protocol between the querygate frontend and its queriers.
//!
//! The protobuf schema lives in `proto/querygate.proto`; this crate exposes
//! the generated messages and tonic services plus lossless-enough
//! conversions between the wire HTTP types and the `http` crate's types.

mod convert;

#[allow(clippy::derive_partial_eq_without_eq)]
pub mod pb {
    tonic::include_proto!("querygate");
}

pub use convert::{
    request_from_wire, request_to_wire, response_from_wire, response_to_wire, WireError,
};
pub use pb::frontend_client::FrontendClient;
pub use pb::frontend_for_querier_client::FrontendForQuerierClient;
pub use pb::frontend_for_querier_server::{FrontendForQuerier, FrontendForQuerierServer};
pub use pb::frontend_server::{Frontend, FrontendServer};
pub use pb::frontend_to_client::Kind as FrontendMessageKind;
pub use pb::{
    ClientToFrontend, FrontendToClient, Header, HttpRequest, HttpResponse, QueryResultRequest,
    QueryResultResponse,
};

/// Metadata key carrying the tenant id on querier-originated RPCs.
pub const TENANT_METADATA_KEY: &str = "x-scope-orgid";

/// Conventional HTTP header carrying the tenant id on ingress requests.
pub const TENANT_HEADER: &str = "X-Scope-OrgID";
