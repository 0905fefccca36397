//! Trace batches and the Cloud Trace v1 wire format.

use serde::{Deserialize, Serialize};

use crate::span::{Labels, Span, SpanId, SpanKind, format_timestamp};

/// One page of spans for a single trace.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceBatch {
    pub project_id: String,
    pub trace_id: String,
    /// Caller span every submitted span hangs off.
    pub parent_span_id: Option<SpanId>,
    pub spans: Vec<Span>,
}

impl TraceBatch {
    /// Split spans into batches of at most `page_size`, preserving order.
    ///
    /// A zero page size is treated as one.
    pub fn paginate(
        project_id: &str,
        trace_id: &str,
        parent_span_id: Option<SpanId>,
        spans: Vec<Span>,
        page_size: usize,
    ) -> Vec<TraceBatch> {
        spans
            .chunks(page_size.max(1))
            .map(|page| TraceBatch {
                project_id: project_id.to_string(),
                trace_id: trace_id.to_string(),
                parent_span_id,
                spans: page.to_vec(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Wire document for this batch.
    pub fn to_traces(&self) -> Traces {
        let parent = self.parent_span_id.map(|id| id.to_string());
        Traces {
            traces: vec![Trace {
                project_id: self.project_id.clone(),
                trace_id: self.trace_id.clone(),
                spans: self
                    .spans
                    .iter()
                    .map(|span| TraceSpan::from_span(span, parent.clone()))
                    .collect(),
            }],
        }
    }
}

/// `Traces` document of the Cloud Trace v1 API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Traces {
    #[serde(default)]
    pub traces: Vec<Trace>,
}

impl Traces {
    /// Total spans across all traces.
    pub fn span_count(&self) -> usize {
        self.traces.iter().map(|t| t.spans.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trace {
    pub project_id: String,
    pub trace_id: String,
    #[serde(default)]
    pub spans: Vec<TraceSpan>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceSpan {
    /// Decimal uint64.
    pub span_id: String,
    #[serde(default)]
    pub kind: SpanKind,
    pub name: String,
    pub start_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
    #[serde(default, skip_serializing_if = "Labels::is_empty")]
    pub labels: Labels,
}

impl TraceSpan {
    fn from_span(span: &Span, parent_span_id: Option<String>) -> Self {
        Self {
            span_id: span.id.to_string(),
            kind: span.kind,
            name: span.name.clone(),
            start_time: format_timestamp(span.start_time),
            end_time: span.end_time.map(format_timestamp),
            parent_span_id,
            labels: span.labels.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn spans(n: u64) -> Vec<Span> {
        let t = Utc.timestamp_opt(1_714_564_800, 0).unwrap();
        (0..n)
            .map(|i| {
                let mut span = Span::new(SpanId(i + 1), format!("s{}", i), t);
                span.end_time = Some(t);
                span
            })
            .collect()
    }

    #[test]
    fn test_paginate_320_into_150_150_20() {
        let batches = TraceBatch::paginate("app", "t", None, spans(320), 150);
        let sizes: Vec<usize> = batches.iter().map(TraceBatch::len).collect();
        assert_eq!(sizes, vec![150, 150, 20]);
        assert_eq!(batches[2].spans[0].id, SpanId(301));
    }

    #[test]
    fn test_paginate_empty() {
        assert!(TraceBatch::paginate("app", "t", None, Vec::new(), 150).is_empty());
    }

    #[test]
    fn test_wire_format() {
        let mut span_list = spans(1);
        span_list[0]
            .labels
            .insert("memory/start/physical".to_string(), "1024".to_string());
        let batch = TraceBatch {
            project_id: "my-app".to_string(),
            trace_id: "abc".to_string(),
            parent_span_id: Some(SpanId(7)),
            spans: span_list,
        };

        let json = serde_json::to_value(batch.to_traces()).unwrap();
        let span = &json["traces"][0]["spans"][0];
        assert_eq!(json["traces"][0]["projectId"], "my-app");
        assert_eq!(json["traces"][0]["traceId"], "abc");
        assert_eq!(span["spanId"], "1");
        assert_eq!(span["kind"], "SPAN_KIND_UNSPECIFIED");
        assert_eq!(span["startTime"], "2024-05-01T12:00:00.000000Z");
        assert_eq!(span["endTime"], "2024-05-01T12:00:00.000000Z");
        assert_eq!(span["parentSpanId"], "7");
        assert_eq!(span["labels"]["memory/start/physical"], "1024");
    }

    #[test]
    fn test_wire_format_omits_empty_fields() {
        let batch = TraceBatch {
            project_id: "my-app".to_string(),
            trace_id: "abc".to_string(),
            parent_span_id: None,
            spans: vec![Span::new(
                SpanId(1),
                "open",
                Utc.timestamp_opt(0, 0).unwrap(),
            )],
        };
        let json = serde_json::to_value(batch.to_traces()).unwrap();
        let span = json["traces"][0]["spans"][0].as_object().unwrap();
        assert!(!span.contains_key("endTime"));
        assert!(!span.contains_key("parentSpanId"));
        assert!(!span.contains_key("labels"));
    }
}
