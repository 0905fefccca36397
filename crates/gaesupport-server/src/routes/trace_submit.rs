//! Forwarding of queued trace batches to the tracing backend.

use axum::{
    Extension, Form,
    extract::{State, rejection::FormRejection},
    http::StatusCode,
};
use serde::Deserialize;
use tracing::{debug, info};

use gaesupport_trace::{RequestTrace, Traces};

use crate::error::{Result, ServerError};
use crate::state::AppState;

/// Form posted by the trace queue worker.
#[derive(Debug, Deserialize)]
pub struct TraceSubmitForm {
    /// JSON `Traces` document.
    #[serde(default)]
    pub data: Option<String>,
}

/// `POST /gae/trace_submit`: decode form field `data` and patch it into the
/// tracing backend under this application's project.
///
/// This request's own spans are never submitted, or every submission would
/// queue another one.
pub async fn trace_submit_handler(
    State(state): State<AppState>,
    trace: Option<Extension<RequestTrace>>,
    form: std::result::Result<Form<TraceSubmitForm>, FormRejection>,
) -> Result<StatusCode> {
    if let Some(Extension(trace)) = &trace {
        trace.force_untraced();
    }

    let data = match form {
        Ok(Form(form)) => form.data.unwrap_or_default(),
        Err(FormRejection::InvalidFormContentType(_)) => String::new(),
        Err(e) => return Err(ServerError::BadRequest(e.body_text())),
    };

    if data.is_empty() {
        debug!("Trace submission without data, nothing to do");
        return Ok(StatusCode::OK);
    }

    let traces: Traces = serde_json::from_str(&data)
        .map_err(|e| ServerError::BadRequest(format!("Undecodable trace batch: {}", e)))?;

    let project_id = state.identity.project_id();
    state
        .trace_backend
        .patch_traces(project_id, &traces)
        .await?;

    info!(
        project_id,
        spans = traces.span_count(),
        "Forwarded trace batch"
    );
    Ok(StatusCode::OK)
}
