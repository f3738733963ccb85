//! Event system shared by the querygate crates.
//!
//! Each crate defines its own event enum (queue events, worker events) and
//! exposes an [`EventListeners`] registry on its config. Listeners run
//! synchronously on the emitting task, so they should be cheap.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Trait implemented by every event type emitted in this workspace.
pub trait GateEvent: Send + Sync + fmt::Debug {
    /// Short machine-readable kind, e.g. `"enqueued"` or `"worker_connected"`.
    fn kind(&self) -> &'static str;

    /// When the event occurred.
    fn at(&self) -> Instant;

    /// Which component instance emitted it (queue name, worker id, ...).
    fn source(&self) -> &str;
}

/// Receives events of one type.
pub trait EventListener<E: GateEvent>: Send + Sync {
    fn on_event(&self, event: &E);
}

/// An ordered collection of listeners for one event type.
///
/// Emission isolates listeners from each other: a panicking listener is
/// caught so the remaining listeners still observe the event.
#[derive(Clone)]
pub struct EventListeners<E: GateEvent> {
    listeners: Vec<Arc<dyn EventListener<E>>>,
}

impl<E: GateEvent> EventListeners<E> {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    /// Registers a listener. Listeners are invoked in registration order.
    pub fn add<L>(&mut self, listener: L)
    where
        L: EventListener<E> + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    /// Delivers `event` to every listener, isolating panics.
    pub fn emit(&self, event: &E) {
        for listener in &self.listeners {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener.on_event(event);
            }));
            if outcome.is_err() {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    source = event.source(),
                    kind = event.kind(),
                    "event listener panicked"
                );
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }
}

impl<E: GateEvent> Default for EventListeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: GateEvent> fmt::Debug for EventListeners<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventListeners")
            .field("len", &self.listeners.len())
            .finish()
    }
}

/// Adapter turning a closure into a listener.
pub struct FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    f: F,
    _marker: std::marker::PhantomData<fn(&E)>,
}

impl<E, F> FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<E, F> EventListener<E> for FnListener<E, F>
where
    E: GateEvent,
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        (self.f)(event)
    }
}
