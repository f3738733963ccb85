//! The querygate frontend: HTTP ingress for read queries, per-tenant
//! queueing, and the gRPC services queriers pull work through.
//!
//! The flow, end to end:
//!
//! 1. An HTTP query arrives at [`Handler`] (a tower `Service`). The tenant
//!    comes from a [`TenantId`] extension, conventionally set from the
//!    `X-Scope-OrgID` header by [`TenantAuthLayer`].
//! 2. The handler wraps the request in an envelope with a fresh query id,
//!    registers the pending result and enqueues it in the tenant's queue.
//! 3. A connected querier's `Process` stream pulls the envelope (round-robin
//!    across tenants, shuffle-sharded when a tenant is capped), executes it,
//!    and answers on the stream or through the `QueryResult` RPC.
//! 4. The handler wakes up and writes the response verbatim, logging the
//!    query if it was slow.
//!
//! With `downstream_url` configured the handler skips all of the above and
//! proxies straight through.

mod config;
mod downstream;
mod error;
mod frontend;
mod handler;
mod pending;
mod rpc;

pub use config::{FrontendConfig, FrontendConfigBuilder};
pub use error::{error_response, FrontendError};
pub use frontend::{Frontend, NotReady};
pub use handler::{Handler, TenantAuth, TenantAuthLayer, TenantId};
pub use rpc::FrontendGrpc;

// The limits hook is defined next to the queues but configured from here.
pub use querygate_queue::TenantLimits;
