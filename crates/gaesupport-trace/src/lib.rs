//! Request-scoped trace span reporting.
//!
//! A [`TraceReporter`] buffers the spans of one request. When the request
//! ends, [`TraceReporter::finish`] closes any span left open and, if the
//! inbound [`TraceContext`] marks the request as sampled, splits the spans
//! into pages of at most 150 and hands each page to a [`TraceDispatcher`].
//!
//! The production dispatcher ([`TaskQueueDispatcher`]) queues batches for a
//! background worker that posts them to the internal submit endpoint; that
//! endpoint forwards them to Cloud Trace through a [`TraceBackend`].

mod backend;
mod batch;
mod context;
mod dispatch;
mod error;
mod reporter;
mod span;

pub use backend::{
    CLOUD_TRACE_API_URL, CloudTraceClient, RecordingBackend, SharedTraceBackend, TraceBackend,
};
pub use batch::{Trace, TraceBatch, TraceSpan, Traces};
pub use context::{TRACE_CONTEXT_HEADER, TraceContext};
pub use dispatch::{
    RecordingDispatcher, SUBMIT_FORM_FIELD, SharedDispatcher, TaskQueueDispatcher,
    TraceDispatcher,
};
pub use error::{TraceError, TraceResult};
pub use reporter::{
    ROOT_SPAN_NAME, ReporterOptions, RequestTrace, TeardownOutcome, TeardownReport,
    TraceReporter,
};
pub use span::{Labels, Span, SpanId, SpanIdGenerator, SpanKind, format_timestamp};
