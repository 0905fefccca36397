//! Spans and span identifiers.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Span labels.
pub type Labels = BTreeMap<String, String>;

/// Span identifier: microseconds since the Unix epoch at creation, bumped
/// when needed so ids from one generator are strictly increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpanId(pub u64);

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Issues strictly increasing span ids from a microsecond clock.
#[derive(Debug, Default)]
pub struct SpanIdGenerator {
    last: u64,
}

impl SpanIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next id for a clock reading of `now`.
    pub fn next_id(&mut self, now: DateTime<Utc>) -> SpanId {
        let micros = u64::try_from(now.timestamp_micros()).unwrap_or(0);
        let id = if micros > self.last { micros } else { self.last + 1 };
        self.last = id;
        SpanId(id)
    }
}

/// Kind of a span as understood by the tracing API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpanKind {
    #[default]
    SpanKindUnspecified,
    RpcServer,
    RpcClient,
}

/// One timed unit of work within a request.
#[derive(Debug, Clone, PartialEq)]
pub struct Span {
    pub id: SpanId,
    pub name: String,
    pub kind: SpanKind,
    pub start_time: DateTime<Utc>,
    /// `None` while the span is open.
    pub end_time: Option<DateTime<Utc>>,
    pub labels: Labels,
}

impl Span {
    pub fn new(id: SpanId, name: impl Into<String>, start_time: DateTime<Utc>) -> Self {
        Self {
            id,
            name: name.into(),
            kind: SpanKind::SpanKindUnspecified,
            start_time,
            end_time: None,
            labels: Labels::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }
}

/// RFC 3339 UTC timestamp with microsecond precision and a `Z` suffix.
pub fn format_timestamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}
