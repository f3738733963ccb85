//! Frontend configuration.

use std::time::Duration;

use querygate_queue::DEFAULT_MAX_OUTSTANDING_PER_TENANT;

/// Tunables for the frontend.
///
/// The zero values follow the conventions of the rest of the workspace:
/// `None` / zero disables the corresponding behavior.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FrontendConfig {
    /// Proxy-only mode: forward every request here instead of queueing.
    pub downstream_url: Option<String>,
    /// Largest accepted request body in bytes. `None` disables the check.
    pub max_body_size: Option<usize>,
    /// Log queries that take longer than this. Zero disables slow-query
    /// logging.
    pub log_queries_longer_than: Duration,
    /// Per-tenant queue capacity.
    pub max_outstanding_per_tenant: usize,
    /// How long a queued or dispatched query may live before the handler
    /// gives up with 504. `None` waits indefinitely (the caller's own
    /// disconnect still cancels).
    pub query_timeout: Option<Duration>,
    /// Drain budget for queued work and in-flight results at shutdown.
    pub shutdown_grace: Duration,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            downstream_url: None,
            max_body_size: None,
            log_queries_longer_than: Duration::ZERO,
            max_outstanding_per_tenant: DEFAULT_MAX_OUTSTANDING_PER_TENANT,
            query_timeout: None,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl FrontendConfig {
    pub fn builder() -> FrontendConfigBuilder {
        FrontendConfigBuilder::default()
    }
}

/// Builder for [`FrontendConfig`].
#[derive(Debug, Default)]
pub struct FrontendConfigBuilder {
    config: FrontendConfig,
}

impl FrontendConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables downstream proxy mode.
    pub fn downstream_url(mut self, url: impl Into<String>) -> Self {
        self.config.downstream_url = Some(url.into());
        self
    }

    /// Rejects bodies larger than `bytes` with 413.
    pub fn max_body_size(mut self, bytes: usize) -> Self {
        self.config.max_body_size = Some(bytes);
        self
    }

    /// Logs queries slower than `threshold`.
    pub fn log_queries_longer_than(mut self, threshold: Duration) -> Self {
        self.config.log_queries_longer_than = threshold;
        self
    }

    /// Caps each tenant's queue depth.
    pub fn max_outstanding_per_tenant(mut self, max: usize) -> Self {
        self.config.max_outstanding_per_tenant = max;
        self
    }

    /// Fails queries not answered within `timeout` with 504.
    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.config.query_timeout = Some(timeout);
        self
    }

    /// Sets the shutdown drain budget.
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.config.shutdown_grace = grace;
        self
    }

    pub fn build(self) -> FrontendConfig {
        self.config
    }
}
