//! Tracing API port and its Cloud Trace v1 adapter.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use gaesupport_types::SharedTokenProvider;
use gaesupport_types::config::defaults;
use parking_lot::Mutex;
use tracing::debug;

use crate::batch::Traces;
use crate::error::{TraceError, TraceResult};

/// Production Cloud Trace endpoint.
pub const CLOUD_TRACE_API_URL: &str = "https://cloudtrace.googleapis.com";

/// Destination of submitted traces.
#[async_trait]
pub trait TraceBackend: Send + Sync {
    /// Send new traces (or spans of existing traces) to the backend.
    async fn patch_traces(&self, project_id: &str, traces: &Traces) -> TraceResult<()>;
}

/// Shared backend handle.
pub type SharedTraceBackend = Arc<dyn TraceBackend>;

/// Cloud Trace v1 REST client.
#[derive(Debug, Clone)]
pub struct CloudTraceClient {
    client: reqwest::Client,
    base_url: String,
    tokens: SharedTokenProvider,
}

impl CloudTraceClient {
    pub fn new(tokens: SharedTokenProvider) -> Self {
        let client = reqwest::Client::builder()
            .timeout(defaults::http_timeout())
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: CLOUD_TRACE_API_URL.to_string(),
            tokens,
        }
    }

    /// Override the API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl TraceBackend for CloudTraceClient {
    async fn patch_traces(&self, project_id: &str, traces: &Traces) -> TraceResult<()> {
        let url = format!("{}/v1/projects/{}/traces", self.base_url, project_id);
        let mut request = self.client.patch(&url).json(traces);
        if let Some(token) = self.tokens.access_token().await? {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TraceError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        debug!(project_id, spans = traces.span_count(), "Patched traces");
        Ok(())
    }
}

/// Backend that records submissions in memory.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    calls: Mutex<Vec<(String, Traces)>>,
    failing: AtomicBool,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every subsequent call with an API error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// `(project_id, traces)` for each call so far.
    pub fn calls(&self) -> Vec<(String, Traces)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl TraceBackend for RecordingBackend {
    async fn patch_traces(&self, project_id: &str, traces: &Traces) -> TraceResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TraceError::Api {
                status: 503,
                message: "backend unavailable".to_string(),
            });
        }
        self.calls
            .lock()
            .push((project_id.to_string(), traces.clone()));
        Ok(())
    }
}
