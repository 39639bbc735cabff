//! Session engine configuration.

use std::time::Duration;

use crate::core::constants::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_DELIVERY_TIMEOUT, DEFAULT_DEST_NAME,
    DEFAULT_EXPECTATION_TTL, DEFAULT_HELLO_INTERVAL, DEFAULT_HELLO_MAX_ATTEMPTS,
    DEFAULT_KEEPALIVE_INTERVAL, DEFAULT_MAX_ACTIVE_TRANSFERS, DEFAULT_MAX_PENDING_EXPECTATIONS,
    DEFAULT_MAX_RESOURCE_BYTES,
};

/// Session engine configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Application name announced in HELLO.
    pub app_name: String,

    /// Client software version announced in HELLO.
    pub app_version: String,

    /// Destination application name used to derive the hub destination.
    pub dest_name: String,

    /// Tear down links left over from a previous session to the same
    /// destination before opening a fresh one.
    pub cleanup_existing_links: bool,

    /// Overall connect deadline covering path discovery through link
    /// establishment.
    pub connect_timeout: Duration,

    /// Interval between HELLO retransmissions while handshaking.
    pub hello_interval: Duration,

    /// HELLO attempts before the handshake is abandoned.
    pub hello_max_attempts: u32,

    /// Interval between keepalive pings, if keepalive is started.
    pub keepalive_interval: Duration,

    /// Largest resource announcement the engine will accept.
    pub max_resource_size: u64,

    /// How long a resource expectation stays matchable.
    pub resource_ttl: Duration,

    /// Bound on simultaneously pending resource expectations.
    pub resource_max_pending: usize,

    /// Bound on simultaneously active inbound transfers.
    pub max_active_transfers: usize,

    /// How long a sent message may wait for its echo before it is
    /// reported as unconfirmed.
    pub delivery_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            app_name: "rrc".to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            dest_name: DEFAULT_DEST_NAME.to_string(),
            cleanup_existing_links: true,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            hello_interval: DEFAULT_HELLO_INTERVAL,
            hello_max_attempts: DEFAULT_HELLO_MAX_ATTEMPTS,
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            max_resource_size: DEFAULT_MAX_RESOURCE_BYTES,
            resource_ttl: DEFAULT_EXPECTATION_TTL,
            resource_max_pending: DEFAULT_MAX_PENDING_EXPECTATIONS,
            max_active_transfers: DEFAULT_MAX_ACTIVE_TRANSFERS,
            delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
        }
    }
}

/// Builder for a [`SessionConfig`].
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// Create a builder seeded with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name announced in HELLO.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.config.app_name = name.into();
        self
    }

    /// Set the client software version announced in HELLO.
    pub fn app_version(mut self, version: impl Into<String>) -> Self {
        self.config.app_version = version.into();
        self
    }

    /// Set the destination application name.
    pub fn dest_name(mut self, name: impl Into<String>) -> Self {
        self.config.dest_name = name.into();
        self
    }

    /// Tear down (or keep) leftover links before connecting.
    pub fn cleanup_existing_links(mut self, cleanup: bool) -> Self {
        self.config.cleanup_existing_links = cleanup;
        self
    }

    /// Set the overall connect deadline.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the HELLO retransmission interval.
    pub fn hello_interval(mut self, interval: Duration) -> Self {
        self.config.hello_interval = interval;
        self
    }

    /// Set the number of HELLO attempts before giving up.
    pub fn hello_max_attempts(mut self, attempts: u32) -> Self {
        self.config.hello_max_attempts = attempts;
        self
    }

    /// Set the keepalive ping interval.
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.config.keepalive_interval = interval;
        self
    }

    /// Set the largest acceptable resource size.
    pub fn max_resource_size(mut self, size: u64) -> Self {
        self.config.max_resource_size = size;
        self
    }

    /// Set the resource expectation time-to-live.
    pub fn resource_ttl(mut self, ttl: Duration) -> Self {
        self.config.resource_ttl = ttl;
        self
    }

    /// Set the pending resource expectation bound.
    pub fn resource_max_pending(mut self, max: usize) -> Self {
        self.config.resource_max_pending = max;
        self
    }

    /// Set the active transfer bound.
    pub fn max_active_transfers(mut self, max: usize) -> Self {
        self.config.max_active_transfers = max;
        self
    }

    /// Set the delivery confirmation timeout.
    pub fn delivery_timeout(mut self, timeout: Duration) -> Self {
        self.config.delivery_timeout = timeout;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> SessionConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.dest_name, DEFAULT_DEST_NAME);
        assert_eq!(config.hello_max_attempts, DEFAULT_HELLO_MAX_ATTEMPTS);
    }

    #[test]
    fn test_builder_overrides() {
        let config = SessionConfigBuilder::new()
            .app_name("test-app")
            .connect_timeout(Duration::from_secs(5))
            .resource_max_pending(3)
            .build();
        assert_eq!(config.app_name, "test-app");
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.resource_max_pending, 3);
        // Untouched fields keep their defaults.
        assert_eq!(config.hello_interval, DEFAULT_HELLO_INTERVAL);
    }
}
