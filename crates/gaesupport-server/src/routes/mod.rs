//! HTTP routes.

pub mod health;
pub mod sessiongc;
pub mod trace_submit;

pub use health::{HealthResponse, health_routes};
pub use sessiongc::session_gc_handler;
pub use trace_submit::{TraceSubmitForm, trace_submit_handler};

use axum::Router;
use axum::routing::{get, post};

use crate::state::AppState;

/// Internal endpoints invoked by the scheduler and the trace queue worker.
pub fn gae_routes() -> Router<AppState> {
    Router::new()
        .route("/gae/sessiongc", get(session_gc_handler))
        .route("/gae/trace_submit", post(trace_submit_handler))
}
