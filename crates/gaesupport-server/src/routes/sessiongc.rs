//! Durable session garbage collection, triggered by the scheduler.

use axum::{Extension, extract::State, http::StatusCode};
use tracing::info;

use gaesupport_trace::RequestTrace;

use crate::error::Result;
use crate::state::AppState;

/// `GET /gae/sessiongc`: purge durable sessions past their stale age.
///
/// Empty `200` on success; store failures surface as a `500` so the scheduler
/// records the run as failed.
pub async fn session_gc_handler(
    State(state): State<AppState>,
    trace: Option<Extension<RequestTrace>>,
) -> Result<StatusCode> {
    let span = trace.as_ref().and_then(|Extension(t)| t.start_span("session_gc"));

    let handler = state.session_handler();
    let report = handler.purge_stale().await;

    if let (Some(Extension(t)), Some(id)) = (&trace, span) {
        t.end_span(id);
    }

    let report = report?;
    info!(
        found = report.found,
        deleted = report.deleted,
        threshold = %handler.delete_before().to_rfc3339(),
        "Session garbage collection complete"
    );
    Ok(StatusCode::OK)
}
