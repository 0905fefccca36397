//! Application state shared across handlers.

use std::sync::Arc;

use gaesupport_session::{
    DataStoreSessionHandler, SessionStoreConfig, SharedCache, SharedEntityStore,
};
use gaesupport_trace::{ReporterOptions, SharedDispatcher, SharedTraceBackend};
use gaesupport_types::AppIdentity;

use crate::config::ServerConfig;

/// Per-request trace reporting: where finished batches go and how reporters
/// are configured.
#[derive(Clone)]
pub struct RequestTracing {
    pub dispatcher: SharedDispatcher,
    pub options: ReporterOptions,
}

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,

    /// Application and module identity.
    pub identity: Arc<AppIdentity>,

    /// Session cache (memcached in production).
    pub cache: SharedCache,

    /// Durable session entities (Cloud Datastore in production).
    pub store: SharedEntityStore,

    /// Session store settings.
    pub session: Arc<SessionStoreConfig>,

    /// Destination of forwarded trace batches.
    pub trace_backend: SharedTraceBackend,

    /// Request tracing; `None` disables the trace middleware.
    pub tracing: Option<RequestTracing>,
}

impl AppState {
    /// Create a new application state.
    pub fn new(
        config: ServerConfig,
        identity: AppIdentity,
        cache: SharedCache,
        store: SharedEntityStore,
        trace_backend: SharedTraceBackend,
    ) -> Self {
        let session = SessionStoreConfig::new(identity.session_prefix());
        Self {
            config: Arc::new(config),
            identity: Arc::new(identity),
            cache,
            store,
            session: Arc::new(session),
            trace_backend,
            tracing: None,
        }
    }

    /// Replace the session store settings.
    pub fn with_session_config(mut self, session: SessionStoreConfig) -> Self {
        self.session = Arc::new(session);
        self
    }

    /// Enable the per-request trace middleware.
    pub fn with_tracing(mut self, dispatcher: SharedDispatcher, options: ReporterOptions) -> Self {
        self.tracing = Some(RequestTracing {
            dispatcher,
            options,
        });
        self
    }

    /// A session handler for one request.
    pub fn session_handler(&self) -> DataStoreSessionHandler {
        DataStoreSessionHandler::new(
            Arc::clone(&self.cache),
            Arc::clone(&self.store),
            (*self.session).clone(),
        )
    }
}
