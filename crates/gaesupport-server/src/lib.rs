//! HTTP surface of the App Engine support services.
//!
//! Serves the internal endpoints the platform calls:
//!
//! - `GET /gae/sessiongc`: purge stale durable sessions (scheduled job)
//! - `POST /gae/trace_submit`: forward a queued trace batch to Cloud Trace
//! - `GET /health`: liveness
//!
//! Every request gets a [`RequestTrace`](gaesupport_trace::RequestTrace) when
//! tracing is configured on the [`AppState`], and is access-logged when
//! request logging is enabled.
//!
//! # Example
//!
//! ```ignore
//! use gaesupport_server::{AppState, Server, ServerConfig};
//!
//! let state = AppState::new(config, identity, cache, store, backend)
//!     .with_tracing(dispatcher, reporter_options);
//! Server::from_state(state).run().await?;
//! ```

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use middleware::{request_logging_middleware, request_trace_middleware};
pub use routes::{HealthResponse, TraceSubmitForm};
pub use state::{AppState, RequestTracing};

use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

/// The support services HTTP server.
pub struct Server {
    state: AppState,
}

impl Server {
    /// Create a server from a pre-built application state.
    pub fn from_state(state: AppState) -> Self {
        Self { state }
    }

    /// Build the router with all routes and middleware.
    pub fn router(&self) -> Router {
        Router::new()
            .merge(routes::health_routes())
            .merge(routes::gae_routes())
            // Trace reporter (inner layer, wraps only the handler)
            .layer(axum::middleware::from_fn_with_state(
                self.state.clone(),
                middleware::request_trace_middleware,
            ))
            // Request logging (outer layer, sees the final status)
            .layer(axum::middleware::from_fn_with_state(
                self.state.clone(),
                middleware::request_logging_middleware,
            ))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Run the server on the configured bind address.
    pub async fn run(self) -> Result<()> {
        let addr = self.state.config.bind_address;
        self.run_on(addr).await
    }

    /// Run the server on a specific address (useful for testing).
    pub async fn run_on(self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Internal(format!("Failed to bind: {}", e)))?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let router = self.router();

        if let Ok(addr) = listener.local_addr() {
            info!("Starting server on {}", addr);
        }

        axum::serve(listener, router)
            .await
            .map_err(|e| ServerError::Internal(format!("Server error: {}", e)))?;

        Ok(())
    }

    /// Get the configured bind address.
    pub fn bind_address(&self) -> SocketAddr {
        self.state.config.bind_address
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use gaesupport_session::{InMemoryCache, InMemoryEntityStore};
    use gaesupport_trace::{
        RecordingBackend, RecordingDispatcher, ReporterOptions, TRACE_CONTEXT_HEADER,
    };
    use gaesupport_types::AppIdentity;
    use tower::ServiceExt;

    fn state() -> AppState {
        AppState::new(
            ServerConfig::default(),
            AppIdentity::new("s~my-app", "default"),
            Arc::new(InMemoryCache::new()),
            Arc::new(InMemoryEntityStore::new()),
            Arc::new(RecordingBackend::new()),
        )
    }

    #[tokio::test]
    async fn test_server_health_endpoint() {
        let app = Server::from_state(state()).router();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_sessiongc_route_is_mounted() {
        let app = Server::from_state(state()).router();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/gae/sessiongc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_sampled_gc_request_dispatches_its_spans() {
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let state = state().with_tracing(dispatcher.clone(), ReporterOptions::new("my-app"));
        let app = Server::from_state(state).router();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/gae/sessiongc")
                    .header(TRACE_CONTEXT_HEADER, "feed/7;o=1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let batches = dispatcher.batches();
        assert_eq!(batches.len(), 1);
        let names: Vec<&str> = batches[0].spans.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["request", "session_gc"]);
    }

    #[tokio::test]
    async fn test_trace_submit_is_never_traced() {
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let state = state().with_tracing(dispatcher.clone(), ReporterOptions::new("my-app"));
        let app = Server::from_state(state).router();

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/gae/trace_submit")
                    .header(TRACE_CONTEXT_HEADER, "feed/7;o=1")
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(dispatcher.is_empty());
    }

    #[test]
    fn test_bind_address() {
        let state = AppState::new(
            ServerConfig::default().with_bind_address("0.0.0.0:9000".parse().unwrap()),
            AppIdentity::new("s~my-app", "default"),
            Arc::new(InMemoryCache::new()),
            Arc::new(InMemoryEntityStore::new()),
            Arc::new(RecordingBackend::new()),
        );
        assert_eq!(Server::from_state(state).bind_address().port(), 9000);
    }
}
