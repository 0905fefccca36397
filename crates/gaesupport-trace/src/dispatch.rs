//! Out-of-band delivery of trace batches.
//!
//! The reporter hands finished batches to a [`TraceDispatcher`] and moves on;
//! dispatch never blocks the request. The production dispatcher queues
//! batches for a background worker that posts each one to the internal
//! submit endpoint, which forwards it to the tracing API.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use gaesupport_types::config::defaults;

use crate::batch::TraceBatch;
use crate::error::{TraceError, TraceResult};

/// Form field carrying the JSON `Traces` document.
pub const SUBMIT_FORM_FIELD: &str = "data";

/// Accepts trace batches for asynchronous submission.
pub trait TraceDispatcher: Send + Sync {
    /// Queue a batch. Returns `false` when the batch was dropped.
    fn dispatch(&self, batch: TraceBatch) -> bool;
}

/// Shared dispatcher handle.
pub type SharedDispatcher = Arc<dyn TraceDispatcher>;

/// Bounded queue drained by a worker that POSTs each batch as form field
/// `data` to the submit endpoint.
#[derive(Debug, Clone)]
pub struct TaskQueueDispatcher {
    sender: mpsc::Sender<TraceBatch>,
}

impl TaskQueueDispatcher {
    /// Start the worker on the current tokio runtime.
    ///
    /// The worker exits once every clone of the dispatcher is dropped and
    /// the queue is drained.
    pub fn spawn(submit_url: impl Into<String>, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let client = reqwest::Client::builder()
            .timeout(defaults::http_timeout())
            .build()
            .unwrap_or_default();
        tokio::spawn(run_worker(client, submit_url.into(), receiver));
        Self { sender }
    }
}

impl TraceDispatcher for TaskQueueDispatcher {
    fn dispatch(&self, batch: TraceBatch) -> bool {
        match self.sender.try_send(batch) {
            Ok(()) => true,
            Err(TrySendError::Full(batch)) => {
                warn!(
                    trace_id = %batch.trace_id,
                    spans = batch.len(),
                    "Trace submission queue full, dropping batch"
                );
                false
            }
            Err(TrySendError::Closed(batch)) => {
                warn!(
                    trace_id = %batch.trace_id,
                    spans = batch.len(),
                    "Trace submission worker gone, dropping batch"
                );
                false
            }
        }
    }
}

async fn run_worker(client: reqwest::Client, url: String, mut receiver: mpsc::Receiver<TraceBatch>) {
    debug!(url = %url, "Trace submission worker started");
    while let Some(batch) = receiver.recv().await {
        match submit(&client, &url, &batch).await {
            Ok(()) => debug!(trace_id = %batch.trace_id, spans = batch.len(), "Trace batch queued for submission"),
            Err(e) => warn!(
                trace_id = %batch.trace_id,
                spans = batch.len(),
                error = %e,
                "Trace batch submission failed"
            ),
        }
    }
    debug!("Trace submission worker stopped");
}

async fn submit(client: &reqwest::Client, url: &str, batch: &TraceBatch) -> TraceResult<()> {
    let data = serde_json::to_string(&batch.to_traces())?;
    let response = client
        .post(url)
        .form(&[(SUBMIT_FORM_FIELD, data)])
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(TraceError::Api {
            status: status.as_u16(),
            message: response.text().await.unwrap_or_default(),
        });
    }
    Ok(())
}

/// Dispatcher that keeps every batch in memory.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    batches: Mutex<Vec<TraceBatch>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Batches dispatched so far.
    pub fn batches(&self) -> Vec<TraceBatch> {
        self.batches.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.batches.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.lock().is_empty()
    }
}

impl TraceDispatcher for RecordingDispatcher {
    fn dispatch(&self, batch: TraceBatch) -> bool {
        self.batches.lock().push(batch);
        true
    }
}
