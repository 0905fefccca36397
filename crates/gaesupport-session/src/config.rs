//! Configuration for the session store.

use std::time::Duration;

use gaesupport_types::config::defaults;
use gaesupport_types::{AppIdentity, HasSessionConfig};

/// Configuration for the session store.
#[derive(Debug, Clone)]
pub struct SessionStoreConfig {
    /// Prefix prepended to every session id before it reaches the cache or
    /// the durable store.
    pub key_prefix: String,

    /// TTL applied to every cache write.
    pub max_lifetime: Duration,

    /// Durable entities whose last access is older than this are purged.
    pub stale_after: Duration,
}

impl Default for SessionStoreConfig {
    fn default() -> Self {
        Self {
            key_prefix: String::new(),
            max_lifetime: defaults::session_max_lifetime(),
            stale_after: defaults::stale_after(),
        }
    }
}

impl SessionStoreConfig {
    /// Create a configuration with the given key prefix and default lifetimes.
    pub fn new(key_prefix: impl Into<String>) -> Self {
        Self {
            key_prefix: key_prefix.into(),
            ..Default::default()
        }
    }

    /// Build from an application identity and a configuration provider.
    pub fn from_session_config<C: HasSessionConfig>(identity: &AppIdentity, config: &C) -> Self {
        Self {
            key_prefix: identity.session_prefix(),
            max_lifetime: config.max_lifetime(),
            stale_after: config.stale_after(),
        }
    }

    /// Set the cache TTL.
    pub fn with_max_lifetime(mut self, max_lifetime: Duration) -> Self {
        self.max_lifetime = max_lifetime;
        self
    }

    /// Set the durable purge threshold.
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }
}
