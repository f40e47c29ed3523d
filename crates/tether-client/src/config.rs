//! Client configuration.

use std::time::Duration;

/// Configuration for a [`ServiceClient`](crate::ServiceClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Maximum live connections per service instance.
    pub connection_pool_size: usize,
    /// Interval between hedged attempts. Zero disables the retry ticker.
    pub retry_timeout: Duration,
    /// Deadline after which a call gives up. Zero disables the deadline.
    pub giveup_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connection_pool_size: 5,
            retry_timeout: Duration::ZERO,
            giveup_timeout: Duration::ZERO,
        }
    }
}

impl ClientConfig {
    /// Create a new builder
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }
}

/// Builder for [`ClientConfig`]
#[derive(Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Set the per-instance connection pool size
    pub fn connection_pool_size(mut self, size: usize) -> Self {
        self.config.connection_pool_size = size;
        self
    }

    /// Set the hedged-retry interval
    pub fn retry_timeout(mut self, retry: Duration) -> Self {
        self.config.retry_timeout = retry;
        self
    }

    /// Set the giveup deadline
    pub fn giveup_timeout(mut self, giveup: Duration) -> Self {
        self.config.giveup_timeout = giveup;
        self
    }

    /// Build the configuration
    pub fn build(self) -> ClientConfig {
        self.config
    }
}

/// The retry/giveup pair owned by the dispatch mux.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timeouts {
    pub retry: Duration,
    pub giveup: Duration,
}
