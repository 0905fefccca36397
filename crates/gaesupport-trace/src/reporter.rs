//! Request-scoped span buffer.
//!
//! A [`TraceReporter`] lives for one request. Application code starts and
//! ends spans on it; at the end of the request the owner calls
//! [`TraceReporter::finish`], which closes orphaned spans and, for sampled
//! requests, pages the spans into batches for the dispatcher.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info};

use gaesupport_types::config::defaults;
use gaesupport_types::{AppIdentity, HasTraceConfig};

use crate::batch::TraceBatch;
use crate::context::TraceContext;
use crate::dispatch::TraceDispatcher;
use crate::span::{Labels, Span, SpanId, SpanIdGenerator};

/// Name of the span opened at construction when a request start time is known.
pub const ROOT_SPAN_NAME: &str = "request";

/// Per-request reporter settings.
#[derive(Debug, Clone)]
pub struct ReporterOptions {
    pub project_id: String,
    pub page_size: usize,
    pub memory_labels: bool,
    /// Opens a root span starting at this time.
    pub request_start: Option<DateTime<Utc>>,
}

impl ReporterOptions {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            page_size: defaults::TRACE_PAGE_SIZE,
            memory_labels: false,
            request_start: None,
        }
    }

    /// Build from the application identity and trace settings.
    pub fn from_trace_config<C: HasTraceConfig>(identity: &AppIdentity, config: &C) -> Self {
        Self {
            project_id: identity.project_id().to_string(),
            page_size: config.page_size(),
            memory_labels: config.memory_labels(),
            request_start: None,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_memory_labels(mut self, enabled: bool) -> Self {
        self.memory_labels = enabled;
        self
    }

    pub fn with_request_start(mut self, start: DateTime<Utc>) -> Self {
        self.request_start = Some(start);
        self
    }
}

/// What happened to the spans at teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownOutcome {
    /// Sampled request; `batches` pages produced, `accepted` of them queued.
    Dispatched { batches: usize, accepted: usize },
    /// Submission suppressed by [`TraceReporter::force_untraced`].
    ForcedUntraced,
    /// Trace context present but not sampled.
    NotSampled,
    /// No trace context on the request.
    NoContext,
}

/// Summary of [`TraceReporter::finish`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeardownReport {
    /// Spans buffered at teardown.
    pub spans: usize,
    /// Spans still open at teardown and closed by it.
    pub orphans_closed: usize,
    pub outcome: TeardownOutcome,
}

/// Buffers the spans of one request.
#[derive(Debug)]
pub struct TraceReporter {
    context: Option<TraceContext>,
    options: ReporterOptions,
    spans: BTreeMap<SpanId, Span>,
    unfinished: BTreeSet<SpanId>,
    ids: SpanIdGenerator,
    force_untraced: bool,
    peak_physical: usize,
}

impl TraceReporter {
    pub fn new(context: Option<TraceContext>, options: ReporterOptions) -> Self {
        let request_start = options.request_start;
        let mut reporter = Self {
            context,
            options,
            spans: BTreeMap::new(),
            unfinished: BTreeSet::new(),
            ids: SpanIdGenerator::new(),
            force_untraced: false,
            peak_physical: 0,
        };
        if let Some(start) = request_start {
            reporter.start_span_with(ROOT_SPAN_NAME, Labels::new(), Some(start));
        }
        reporter
    }

    /// Reporter for a request carrying the given trace context header value.
    pub fn from_header(header: Option<&str>, options: ReporterOptions) -> Self {
        Self::new(header.and_then(TraceContext::parse), options)
    }

    pub fn context(&self) -> Option<&TraceContext> {
        self.context.as_ref()
    }

    /// Start a span now. `None` when `name` is empty.
    pub fn start_span(&mut self, name: &str) -> Option<SpanId> {
        self.start_span_with(name, Labels::new(), None)
    }

    /// Start a span with labels and an optional explicit start time.
    pub fn start_span_with(
        &mut self,
        name: &str,
        labels: Labels,
        start_time: Option<DateTime<Utc>>,
    ) -> Option<SpanId> {
        if name.is_empty() {
            debug!("Refusing to start a span without a name");
            return None;
        }

        let now = Utc::now();
        let id = self.ids.next_id(now);
        let mut span = Span::new(id, name, start_time.unwrap_or(now));
        if self.options.memory_labels {
            span.labels = self.memory_snapshot("start");
        }
        span.labels.extend(labels);

        self.spans.insert(id, span);
        self.unfinished.insert(id);
        Some(id)
    }

    /// End an open span. `false` for unknown or already ended spans.
    pub fn end_span(&mut self, id: SpanId) -> bool {
        self.end_span_with(id, Labels::new())
    }

    /// End an open span, merging `labels` into it.
    pub fn end_span_with(&mut self, id: SpanId, labels: Labels) -> bool {
        if !self.unfinished.contains(&id) {
            return false;
        }

        let memory = if self.options.memory_labels {
            self.memory_snapshot("end")
        } else {
            Labels::new()
        };

        let Some(span) = self.spans.get_mut(&id) else {
            return false;
        };
        span.labels.extend(memory);
        span.labels.extend(labels);
        span.end_time = Some(Utc::now());
        self.unfinished.remove(&id);
        true
    }

    /// Never submit this request's spans.
    pub fn force_untraced(&mut self) {
        self.force_untraced = true;
    }

    pub fn is_force_untraced(&self) -> bool {
        self.force_untraced
    }

    pub fn span(&self, id: SpanId) -> Option<&Span> {
        self.spans.get(&id)
    }

    pub fn is_open(&self, id: SpanId) -> bool {
        self.unfinished.contains(&id)
    }

    /// Number of spans not yet ended.
    pub fn open_spans(&self) -> usize {
        self.unfinished.len()
    }

    /// Number of buffered spans.
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Close orphaned spans and hand sampled spans to `dispatcher`.
    pub fn finish(mut self, dispatcher: &dyn TraceDispatcher) -> TeardownReport {
        let orphans: Vec<SpanId> = self.unfinished.iter().copied().collect();
        for id in &orphans {
            self.end_span(*id);
        }
        if !orphans.is_empty() {
            debug!(count = orphans.len(), "Closed orphaned spans");
        }

        let span_count = self.spans.len();
        let outcome = match &self.context {
            _ if self.force_untraced => TeardownOutcome::ForcedUntraced,
            None => {
                info!("No trace header");
                TeardownOutcome::NoContext
            }
            Some(ctx) if !ctx.sampled => TeardownOutcome::NotSampled,
            Some(ctx) => {
                info!(
                    trace_id = %ctx.trace_id,
                    spans = span_count,
                    "Request is a trace sample, submitting spans"
                );
                let spans: Vec<Span> = std::mem::take(&mut self.spans).into_values().collect();
                let batches = TraceBatch::paginate(
                    &self.options.project_id,
                    &ctx.trace_id,
                    ctx.span_id,
                    spans,
                    self.options.page_size,
                );
                let total = batches.len();
                let accepted = batches
                    .into_iter()
                    .map(|batch| dispatcher.dispatch(batch))
                    .filter(|queued| *queued)
                    .count();
                TeardownOutcome::Dispatched {
                    batches: total,
                    accepted,
                }
            }
        };

        TeardownReport {
            spans: span_count,
            orphans_closed: orphans.len(),
            outcome,
        }
    }

    fn memory_snapshot(&mut self, phase: &str) -> Labels {
        let mut labels = Labels::new();
        if let Some(usage) = memory_stats::memory_stats() {
            self.peak_physical = self.peak_physical.max(usage.physical_mem);
            labels.insert(
                format!("memory/{}/physical", phase),
                usage.physical_mem.to_string(),
            );
            labels.insert(
                format!("memory/{}/virtual", phase),
                usage.virtual_mem.to_string(),
            );
            labels.insert(
                format!("memory/{}/peak", phase),
                self.peak_physical.to_string(),
            );
        }
        labels
    }
}

/// Cloneable handle to a request's reporter, shareable between middleware
/// and handlers.
#[derive(Debug, Clone)]
pub struct RequestTrace {
    inner: Arc<Mutex<Option<TraceReporter>>>,
}

impl RequestTrace {
    pub fn new(reporter: TraceReporter) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(reporter))),
        }
    }

    /// Run `f` on the reporter; `None` once it has been finished.
    pub fn with<R>(&self, f: impl FnOnce(&mut TraceReporter) -> R) -> Option<R> {
        self.inner.lock().as_mut().map(f)
    }

    pub fn start_span(&self, name: &str) -> Option<SpanId> {
        self.with(|r| r.start_span(name)).flatten()
    }

    pub fn end_span(&self, id: SpanId) -> bool {
        self.with(|r| r.end_span(id)).unwrap_or(false)
    }

    pub fn force_untraced(&self) {
        self.with(TraceReporter::force_untraced);
    }

    /// Finish the reporter. Only the first call does anything.
    pub fn finish(&self, dispatcher: &dyn TraceDispatcher) -> Option<TeardownReport> {
        let reporter = self.inner.lock().take()?;
        Some(reporter.finish(dispatcher))
    }
}
