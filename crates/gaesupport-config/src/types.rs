//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [app]        # application / module identity
//! [cache]      # memcached endpoint
//! [session]    # session lifetime and durable sweep threshold
//! [datastore]  # Cloud Datastore endpoint
//! [trace]      # span reporting and submission
//! [server]     # HTTP server settings
//! ```

use std::time::Duration;

use gaesupport_types::config::defaults;
use gaesupport_types::{AppIdentity, ConfigProvider, HasSessionConfig, HasTraceConfig};
use serde::{Deserialize, Serialize};

/// Environment variable overriding the memcached host.
pub const MEMCACHE_HOST_ENV: &str = "MEMCACHE_HOST";
/// Environment variable overriding the memcached port.
pub const MEMCACHE_PORT_ENV: &str = "MEMCACHE_PORT";
/// Environment variable overriding the session lifetime in seconds.
pub const SESSION_MAX_LIFETIME_ENV: &str = "SESSION_MAX_LIFETIME";
/// Environment variable pointing the datastore client at an emulator.
pub const DATASTORE_EMULATOR_HOST_ENV: &str = "DATASTORE_EMULATOR_HOST";

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GaeSupportConfig {
    /// Application identity.
    pub app: Option<AppConfig>,

    /// Cache endpoint.
    pub cache: Option<CacheConfig>,

    /// Session storage settings.
    pub session: Option<SessionConfig>,

    /// Durable datastore settings.
    pub datastore: Option<DatastoreConfig>,

    /// Trace reporting settings.
    pub trace: Option<TraceConfig>,

    /// HTTP server settings.
    pub server: Option<ServerConfig>,
}

impl GaeSupportConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> crate::Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> crate::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    pub fn merge(&mut self, other: GaeSupportConfig) {
        if other.app.is_some() {
            self.app = other.app;
        }

        if other.cache.is_some() {
            self.cache = other.cache;
        }

        if other.session.is_some() {
            self.session = other.session;
        }

        if other.datastore.is_some() {
            self.datastore = other.datastore;
        }

        if other.trace.is_some() {
            self.trace = other.trace;
        }

        if other.server.is_some() {
            self.server = other.server;
        }
    }

    /// Apply ambient environment overrides.
    ///
    /// `lookup` returns the value of an environment variable; pass
    /// `|k| std::env::var(k).ok()` for the process environment.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let app = self.app.get_or_insert_with(AppConfig::default);
        if let Some(id) = lookup(gaesupport_types::identity::APPLICATION_ID_ENV) {
            app.application_id = id;
        }
        if let Some(id) = lookup(gaesupport_types::identity::MODULE_ID_ENV) {
            app.module_id = id;
        }

        if let Some(host) = lookup(MEMCACHE_HOST_ENV) {
            self.cache.get_or_insert_with(CacheConfig::default).host = host;
        }
        if let Some(port) = lookup(MEMCACHE_PORT_ENV).and_then(|p| p.parse().ok()) {
            self.cache.get_or_insert_with(CacheConfig::default).port = port;
        }

        if let Some(secs) = lookup(SESSION_MAX_LIFETIME_ENV).and_then(|s| s.parse().ok()) {
            self.session
                .get_or_insert_with(SessionConfig::default)
                .max_lifetime_secs = secs;
        }

        if let Some(host) = lookup(DATASTORE_EMULATOR_HOST_ENV) {
            self.datastore
                .get_or_insert_with(DatastoreConfig::default)
                .emulator_host = Some(host);
        }
    }

    /// Application identity, empty when unconfigured.
    pub fn identity(&self) -> AppIdentity {
        self.app
            .as_ref()
            .map(|a| AppIdentity::new(&a.application_id, &a.module_id))
            .unwrap_or_default()
    }

    /// Cache settings, falling back to defaults.
    pub fn cache(&self) -> CacheConfig {
        self.cache.clone().unwrap_or_default()
    }

    /// Session settings, falling back to defaults.
    pub fn session(&self) -> SessionConfig {
        self.session.clone().unwrap_or_default()
    }

    /// Datastore settings, falling back to defaults.
    pub fn datastore(&self) -> DatastoreConfig {
        self.datastore.clone().unwrap_or_default()
    }

    /// Trace settings, falling back to defaults.
    pub fn trace(&self) -> TraceConfig {
        self.trace.clone().unwrap_or_default()
    }

    /// Server settings, falling back to defaults.
    pub fn server(&self) -> ServerConfig {
        self.server.clone().unwrap_or_default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sections
// ─────────────────────────────────────────────────────────────────────────────

/// Application identity section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Application id (e.g. `s~my-app`).
    pub application_id: String,
    /// Module (service) id.
    pub module_id: String,
}

/// Memcached endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub host: String,
    pub port: u16,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            host: defaults::MEMCACHE_HOST.to_string(),
            port: defaults::MEMCACHE_PORT,
        }
    }
}

/// Session storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Cache TTL for session payloads, in seconds.
    pub max_lifetime_secs: u64,
    /// Durable entities older than this are purged by the sweep.
    pub stale_after_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_lifetime_secs: defaults::SESSION_MAX_LIFETIME_SECS,
            stale_after_secs: defaults::SESSION_STALE_AFTER_SECS,
        }
    }
}

impl ConfigProvider for SessionConfig {}

impl HasSessionConfig for SessionConfig {
    fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }

    fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

/// Cloud Datastore settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatastoreConfig {
    /// Project id override; derived from the application id when unset.
    pub project_id: Option<String>,
    /// `host:port` of a datastore emulator. Requests go out unauthenticated.
    pub emulator_host: Option<String>,
    /// Static bearer token, bypassing the metadata server.
    pub access_token: Option<String>,
}

/// Trace reporting settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    /// Whether the request-trace middleware is installed.
    pub enabled: bool,
    /// Maximum spans per submitted page.
    pub page_size: usize,
    /// Attach process memory labels to spans.
    pub memory_labels: bool,
    /// Base URL the submission worker posts batches to; the server's own
    /// address when unset.
    pub submit_base_url: Option<String>,
    /// Capacity of the submission queue.
    pub queue_capacity: usize,
    /// Cloud Trace API endpoint override.
    pub api_endpoint: Option<String>,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            page_size: defaults::TRACE_PAGE_SIZE,
            memory_labels: false,
            submit_base_url: None,
            queue_capacity: defaults::TRACE_QUEUE_CAPACITY,
            api_endpoint: None,
        }
    }
}

impl ConfigProvider for TraceConfig {}

impl HasTraceConfig for TraceConfig {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn memory_labels(&self) -> bool {
        self.memory_labels
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to listen on.
    pub port: u16,
    /// Address to bind to.
    pub bind: String,
    /// Enable request logging.
    pub request_logging: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: defaults::DEFAULT_PORT,
            bind: defaults::DEFAULT_BIND.to_string(),
            request_logging: true,
        }
    }
}
