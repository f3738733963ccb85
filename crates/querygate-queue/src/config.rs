//! Queue set configuration.

use std::sync::Arc;

use querygate_core::{EventListener, EventListeners};

use crate::events::QueueEvent;

/// Default per-tenant queue capacity.
pub const DEFAULT_MAX_OUTSTANDING_PER_TENANT: usize = 100;

/// Per-tenant limits hook.
///
/// `max_queriers_per_tenant` caps how many distinct workers may concurrently
/// pull a tenant's requests. `0`, or any value at least the number of
/// registered workers, means every worker is eligible.
///
/// Closures implement the trait directly:
///
/// ```rust
/// use querygate_queue::TenantLimits;
///
/// let limits = |tenant: &str| if tenant == "heavy" { 2 } else { 0 };
/// assert_eq!(limits.max_queriers_per_tenant("heavy"), 2);
/// ```
pub trait TenantLimits: Send + Sync {
    fn max_queriers_per_tenant(&self, tenant: &str) -> usize;
}

impl<F> TenantLimits for F
where
    F: Fn(&str) -> usize + Send + Sync,
{
    fn max_queriers_per_tenant(&self, tenant: &str) -> usize {
        self(tenant)
    }
}

/// Configuration for a [`TenantQueues`](crate::TenantQueues) instance.
pub struct QueueConfig {
    pub(crate) max_outstanding_per_tenant: usize,
    pub(crate) limits: Arc<dyn TenantLimits>,
    pub(crate) event_listeners: EventListeners<QueueEvent>,
}

impl QueueConfig {
    pub fn builder() -> QueueConfigBuilder {
        QueueConfigBuilder::default()
    }

    pub fn max_outstanding_per_tenant(&self) -> usize {
        self.max_outstanding_per_tenant
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_outstanding_per_tenant: DEFAULT_MAX_OUTSTANDING_PER_TENANT,
            limits: Arc::new(|_: &str| 0),
            event_listeners: EventListeners::new(),
        }
    }
}

impl std::fmt::Debug for QueueConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueConfig")
            .field(
                "max_outstanding_per_tenant",
                &self.max_outstanding_per_tenant,
            )
            .field("event_listeners", &self.event_listeners.len())
            .finish()
    }
}

/// Builder for [`QueueConfig`].
#[derive(Default)]
pub struct QueueConfigBuilder {
    max_outstanding_per_tenant: Option<usize>,
    limits: Option<Arc<dyn TenantLimits>>,
    event_listeners: EventListeners<QueueEvent>,
}

impl QueueConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps each tenant's queue depth. Defaults to
    /// [`DEFAULT_MAX_OUTSTANDING_PER_TENANT`].
    pub fn max_outstanding_per_tenant(mut self, max: usize) -> Self {
        self.max_outstanding_per_tenant = Some(max);
        self
    }

    /// Installs the per-tenant querier limits hook.
    pub fn limits<L>(mut self, limits: L) -> Self
    where
        L: TenantLimits + 'static,
    {
        self.limits = Some(Arc::new(limits));
        self
    }

    /// Registers a queue event listener.
    pub fn on_event<L>(mut self, listener: L) -> Self
    where
        L: EventListener<QueueEvent> + 'static,
    {
        self.event_listeners.add(listener);
        self
    }

    pub fn build(self) -> QueueConfig {
        QueueConfig {
            max_outstanding_per_tenant: self
                .max_outstanding_per_tenant
                .unwrap_or(DEFAULT_MAX_OUTSTANDING_PER_TENANT),
            limits: self.limits.unwrap_or_else(|| Arc::new(|_: &str| 0)),
            event_listeners: self.event_listeners,
        }
    }
}
