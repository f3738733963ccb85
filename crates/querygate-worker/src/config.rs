//! Worker configuration.

use std::time::Duration;

use querygate_core::{EventListener, EventListeners};

use crate::events::WorkerEvent;

/// Tunables for a querier-side worker.
#[derive(Clone)]
pub struct WorkerConfig {
    pub(crate) frontend_address: String,
    pub(crate) parallelism: usize,
    pub(crate) match_max_concurrency: bool,
    pub(crate) max_concurrent: usize,
    pub(crate) client_id: String,
    pub(crate) min_backoff: Duration,
    pub(crate) max_backoff: Duration,
    pub(crate) event_listeners: EventListeners<WorkerEvent>,
}

impl WorkerConfig {
    pub fn builder(frontend_address: impl Into<String>) -> WorkerConfigBuilder {
        WorkerConfigBuilder::new(frontend_address)
    }

    /// Number of parallel frontend streams this worker maintains. With
    /// `match_max_concurrency` set, the stream count follows the local
    /// handler's concurrency so the worker never pulls more work than it
    /// can serve at once.
    pub fn concurrency(&self) -> usize {
        let n = if self.match_max_concurrency {
            self.max_concurrent
        } else {
            self.parallelism
        };
        n.max(1)
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

impl std::fmt::Debug for WorkerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerConfig")
            .field("frontend_address", &self.frontend_address)
            .field("parallelism", &self.parallelism)
            .field("match_max_concurrency", &self.match_max_concurrency)
            .field("max_concurrent", &self.max_concurrent)
            .field("client_id", &self.client_id)
            .finish()
    }
}

/// Builder for [`WorkerConfig`].
pub struct WorkerConfigBuilder {
    config: WorkerConfig,
}

impl WorkerConfigBuilder {
    pub fn new(frontend_address: impl Into<String>) -> Self {
        Self {
            config: WorkerConfig {
                frontend_address: frontend_address.into(),
                parallelism: 1,
                match_max_concurrency: false,
                max_concurrent: 1,
                client_id: format!("querier-{}", std::process::id()),
                min_backoff: Duration::from_millis(100),
                max_backoff: Duration::from_secs(5),
                event_listeners: EventListeners::new(),
            },
        }
    }

    /// Number of frontend streams to keep open.
    pub fn parallelism(mut self, streams: usize) -> Self {
        self.config.parallelism = streams;
        self
    }

    /// Follow the local handler's concurrency instead of `parallelism`.
    pub fn match_max_concurrency(mut self, matching: bool) -> Self {
        self.config.match_max_concurrency = matching;
        self
    }

    /// The local handler's concurrent-query capacity.
    pub fn max_concurrent(mut self, max: usize) -> Self {
        self.config.max_concurrent = max;
        self
    }

    /// Identity reported in the stream hello. Streams of one worker share
    /// it; per-tenant querier caps key off it.
    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.config.client_id = id.into();
        self
    }

    /// Reconnect backoff bounds.
    pub fn backoff(mut self, min: Duration, max: Duration) -> Self {
        self.config.min_backoff = min;
        self.config.max_backoff = max;
        self
    }

    /// Registers a worker event listener.
    pub fn on_event<L>(mut self, listener: L) -> Self
    where
        L: EventListener<WorkerEvent> + 'static,
    {
        self.config.event_listeners.add(listener);
        self
    }

    pub fn build(self) -> WorkerConfig {
        self.config
    }
}
