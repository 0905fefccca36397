//! Configuration traits for decoupled config passing between crates.
//!
//! These traits allow components to depend on configuration capabilities without
//! requiring direct knowledge of the full configuration structure. Each trait
//! represents a specific configuration capability.

use std::time::Duration;

/// Base trait for all configuration types.
///
/// Implementations should be cheaply cloneable and thread-safe.
pub trait ConfigProvider: Clone + Send + Sync + 'static {}

/// Session storage configuration.
pub trait HasSessionConfig: ConfigProvider {
    /// Lifetime of a cached session; used as the cache TTL on every write.
    fn max_lifetime(&self) -> Duration;

    /// Age after which a durable session entity is purged by the sweep.
    fn stale_after(&self) -> Duration {
        defaults::stale_after()
    }
}

/// Trace reporting configuration.
pub trait HasTraceConfig: ConfigProvider {
    /// Maximum number of spans per submitted page.
    fn page_size(&self) -> usize {
        defaults::TRACE_PAGE_SIZE
    }

    /// Whether spans carry process memory labels.
    fn memory_labels(&self) -> bool {
        false
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Default values
// ─────────────────────────────────────────────────────────────────────────────

/// Default configuration values.
pub mod defaults {
    use std::time::Duration;

    /// Matches the usual `session.gc_maxlifetime` of 24 minutes.
    pub const SESSION_MAX_LIFETIME_SECS: u64 = 1440;
    pub const SESSION_STALE_AFTER_SECS: u64 = 86_400;
    pub const MEMCACHE_HOST: &str = "127.0.0.1";
    pub const MEMCACHE_PORT: u16 = 11211;
    pub const TRACE_PAGE_SIZE: usize = 150;
    pub const TRACE_QUEUE_CAPACITY: usize = 64;
    pub const TRACE_SUBMIT_PATH: &str = "/gae/trace_submit";
    pub const DEFAULT_PORT: u16 = 8080;
    pub const DEFAULT_BIND: &str = "127.0.0.1";
    pub const HTTP_TIMEOUT_SECS: u64 = 30;

    pub fn session_max_lifetime() -> Duration {
        Duration::from_secs(SESSION_MAX_LIFETIME_SECS)
    }

    pub fn stale_after() -> Duration {
        Duration::from_secs(SESSION_STALE_AFTER_SECS)
    }

    pub fn http_timeout() -> Duration {
        Duration::from_secs(HTTP_TIMEOUT_SECS)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Simple wrapper types for standalone config passing
// ─────────────────────────────────────────────────────────────────────────────

/// Standalone session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfigProvider {
    pub max_lifetime: Duration,
    pub stale_after: Duration,
}

impl Default for SessionConfigProvider {
    fn default() -> Self {
        Self {
            max_lifetime: defaults::session_max_lifetime(),
            stale_after: defaults::stale_after(),
        }
    }
}

impl ConfigProvider for SessionConfigProvider {}

impl HasSessionConfig for SessionConfigProvider {
    fn max_lifetime(&self) -> Duration {
        self.max_lifetime
    }

    fn stale_after(&self) -> Duration {
        self.stale_after
    }
}

/// Standalone trace configuration.
#[derive(Debug, Clone)]
pub struct TraceConfigProvider {
    pub page_size: usize,
    pub memory_labels: bool,
}

impl Default for TraceConfigProvider {
    fn default() -> Self {
        Self {
            page_size: defaults::TRACE_PAGE_SIZE,
            memory_labels: false,
        }
    }
}

impl ConfigProvider for TraceConfigProvider {}

impl HasTraceConfig for TraceConfigProvider {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn memory_labels(&self) -> bool {
        self.memory_labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_defaults() {
        let config = SessionConfigProvider::default();
        assert_eq!(config.max_lifetime(), Duration::from_secs(1440));
        assert_eq!(config.stale_after(), Duration::from_secs(86_400));
    }

    #[test]
    fn test_trace_defaults() {
        let config = TraceConfigProvider::default();
        assert_eq!(config.page_size(), 150);
        assert!(!config.memory_labels());
    }
}
