//! Querier-side worker for querygate.
//!
//! A [`Worker`] dials the frontend, keeps N parallel `Process` streams open
//! and executes every pulled query against a local handler, which is any
//! tower `Service<http::Request<Bytes>>` producing `http::Response<Bytes>`
//! or a [`HandlerError`]. Errors become status-coded responses before they
//! leave the worker, so the frontend passes them through verbatim.
//!
//! # Example
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use querygate_worker::{HandlerError, Worker, WorkerConfig};
//! use tokio_util::sync::CancellationToken;
//! use tower::service_fn;
//!
//! # async fn example() -> Result<(), querygate_worker::WorkerError> {
//! let handler = service_fn(|req: http::Request<Bytes>| async move {
//!     Ok::<_, HandlerError>(http::Response::new(req.into_body()))
//! });
//!
//! let config = WorkerConfig::builder("http://127.0.0.1:9095")
//!     .parallelism(4)
//!     .client_id("querier-1")
//!     .build();
//!
//! Worker::new(config, handler).run(CancellationToken::new()).await
//! # }
//! ```

mod backoff;
mod config;
mod error;
mod events;
mod worker;

pub use backoff::Backoff;
pub use config::{WorkerConfig, WorkerConfigBuilder};
pub use error::{error_response, HandlerError, WorkerError};
pub use events::WorkerEvent;
pub use worker::Worker;
