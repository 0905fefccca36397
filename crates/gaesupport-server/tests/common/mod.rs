//! Common test utilities for integration tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use reqwest::Client;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use gaesupport_server::{AppState, Server, ServerConfig};
use gaesupport_session::{InMemoryCache, InMemoryEntityStore};
use gaesupport_trace::{RecordingBackend, ReporterOptions, TaskQueueDispatcher};
use gaesupport_types::AppIdentity;
use gaesupport_types::config::defaults;

/// A test server backed by in-memory session storage and a recording trace
/// backend, with request tracing submitting through its own endpoint.
pub struct TestServer {
    /// The server's address.
    pub addr: SocketAddr,
    /// HTTP client for this server.
    pub client: Client,
    /// Session cache behind the server.
    pub cache: Arc<InMemoryCache>,
    /// Durable session store behind the server.
    pub store: Arc<InMemoryEntityStore>,
    /// Receives every forwarded trace batch.
    pub backend: Arc<RecordingBackend>,
    _handle: JoinHandle<()>,
}

impl TestServer {
    /// Start a new test server with default configuration.
    pub async fn start() -> Result<Self> {
        Self::start_with_store(Arc::new(InMemoryEntityStore::new())).await
    }

    /// Start a new test server over a pre-seeded durable store.
    pub async fn start_with_store(store: Arc<InMemoryEntityStore>) -> Result<Self> {
        let addr = find_available_port().await?;
        let cache = Arc::new(InMemoryCache::new());
        let backend = Arc::new(RecordingBackend::new());

        let config = ServerConfig::default()
            .with_bind_address(addr)
            .with_request_logging(false);
        let dispatcher = TaskQueueDispatcher::spawn(
            format!("http://{}{}", addr, defaults::TRACE_SUBMIT_PATH),
            defaults::TRACE_QUEUE_CAPACITY,
        );

        let state = AppState::new(
            config,
            AppIdentity::new("s~my-app", "default"),
            cache.clone(),
            store.clone(),
            backend.clone(),
        )
        .with_tracing(Arc::new(dispatcher), ReporterOptions::new("my-app"));

        let server = Server::from_state(state);
        let handle = tokio::spawn(async move {
            let _ = server.run_on(addr).await;
        });

        let client = Client::new();
        wait_for_server(&client, addr).await?;

        Ok(Self {
            addr,
            client,
            cache,
            store,
            backend,
            _handle: handle,
        })
    }

    /// Get the base URL for the server.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.get(format!("{}{}", self.base_url(), path))
    }

    pub fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.post(format!("{}{}", self.base_url(), path))
    }

    /// Check if server is healthy.
    pub async fn health(&self) -> Result<bool> {
        let resp = self.get("/health").send().await?;
        Ok(resp.status().is_success())
    }

    /// Wait until the trace backend has received `count` submissions.
    pub async fn wait_for_submissions(&self, count: usize) -> Result<()> {
        let result = timeout(Duration::from_secs(5), async {
            while self.backend.calls().len() < count {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;

        match result {
            Ok(()) => Ok(()),
            Err(_) => anyhow::bail!(
                "Timeout waiting for {} trace submissions, got {}",
                count,
                self.backend.calls().len()
            ),
        }
    }
}

/// Find an available port for the test server.
async fn find_available_port() -> Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(addr)
}

/// Wait for the server to become ready.
async fn wait_for_server(client: &Client, addr: SocketAddr) -> Result<()> {
    let url = format!("http://{}/health", addr);

    let result = timeout(Duration::from_secs(5), async {
        loop {
            match client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => return,
                _ => tokio::time::sleep(Duration::from_millis(50)).await,
            }
        }
    })
    .await;

    match result {
        Ok(()) => Ok(()),
        Err(_) => anyhow::bail!("Timeout waiting for server to start"),
    }
}
