//! Request middleware: access logging and per-request trace reporting.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tracing::debug;

use gaesupport_trace::{RequestTrace, TRACE_CONTEXT_HEADER, TraceReporter};

use crate::state::AppState;

// ─────────────────────────────────────────────────────────────────────────────
// Request logging
// ─────────────────────────────────────────────────────────────────────────────

/// Log method, path, status and duration of every request.
pub async fn request_logging_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.config.request_logging {
        return next.run(request).await;
    }

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = std::time::Instant::now();

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();

    if status.is_server_error() {
        tracing::error!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            "Request completed with server error"
        );
    } else if status.is_client_error() {
        tracing::warn!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            "Request completed with client error"
        );
    } else {
        tracing::info!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            "Request completed"
        );
    }

    response
}

// ─────────────────────────────────────────────────────────────────────────────
// Request tracing
// ─────────────────────────────────────────────────────────────────────────────

/// Give each request a [`RequestTrace`] built from its trace context header,
/// and finish it once the response is ready.
///
/// Handlers reach the reporter through `Extension<RequestTrace>`. Nothing
/// happens when tracing is not configured.
pub async fn request_trace_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let Some(settings) = state.tracing.as_ref() else {
        return next.run(request).await;
    };

    let header = request
        .headers()
        .get(TRACE_CONTEXT_HEADER)
        .and_then(|v| v.to_str().ok());
    let reporter = TraceReporter::from_header(
        header,
        settings.options.clone().with_request_start(Utc::now()),
    );
    let trace = RequestTrace::new(reporter);
    request.extensions_mut().insert(trace.clone());

    let response = next.run(request).await;

    if let Some(report) = trace.finish(settings.dispatcher.as_ref()) {
        debug!(
            spans = report.spans,
            orphans_closed = report.orphans_closed,
            outcome = ?report.outcome,
            "Request trace finished"
        );
    }

    response
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
