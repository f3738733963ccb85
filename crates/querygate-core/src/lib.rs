//! Shared infrastructure for the querygate workspace.
//!
//! Currently this is the typed event system the queue, frontend and worker
//! crates use to expose their behavior to embedders and tests without going
//! through a logging sink.

pub mod events;

pub use events::{EventListener, EventListeners, FnListener, GateEvent};
