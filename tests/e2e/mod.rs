//! End-to-end tests over real loopback gRPC streams.

mod support;

mod cancellation;
mod downstream;
mod lifecycle;
mod roundtrip;
