//! Inbound trace context: `X-Cloud-Trace-Context: <traceId>/<spanId>;o=<0|1>`.

use crate::span::SpanId;

/// Header carrying the inbound trace context.
pub const TRACE_CONTEXT_HEADER: &str = "x-cloud-trace-context";

/// Parsed trace context of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    pub trace_id: String,
    /// Span of the caller; parent of every span the reporter submits.
    pub span_id: Option<SpanId>,
    /// `o=1`: the request is sampled and its spans should be submitted.
    pub sampled: bool,
}

impl TraceContext {
    /// Parse a header value. Returns `None` when there is no trace id.
    ///
    /// The span id and options are optional; a malformed span id is ignored.
    pub fn parse(header: &str) -> Option<Self> {
        let mut parts = header.trim().split(';');
        let ids = parts.next().unwrap_or_default();

        let (trace_id, span_id) = match ids.split_once('/') {
            Some((trace, span)) => (trace, span.trim().parse().ok().map(SpanId)),
            None => (ids, None),
        };
        let trace_id = trace_id.trim();
        if trace_id.is_empty() {
            return None;
        }

        let sampled = parts.any(|opt| opt.trim() == "o=1");

        Some(Self {
            trace_id: trace_id.to_string(),
            span_id,
            sampled,
        })
    }

    /// Render back to header form.
    pub fn to_header_value(&self) -> String {
        let mut value = self.trace_id.clone();
        if let Some(span) = self.span_id {
            value.push('/');
            value.push_str(&span.to_string());
        }
        value.push_str(if self.sampled { ";o=1" } else { ";o=0" });
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sampled() {
        let ctx = TraceContext::parse("105445aa7843bc8bf206b12000100000/1;o=1").unwrap();
        assert_eq!(ctx.trace_id, "105445aa7843bc8bf206b12000100000");
        assert_eq!(ctx.span_id, Some(SpanId(1)));
        assert!(ctx.sampled);
    }

    #[test]
    fn test_parse_not_sampled() {
        let ctx = TraceContext::parse("abc/123;o=0").unwrap();
        assert!(!ctx.sampled);
        assert_eq!(ctx.span_id, Some(SpanId(123)));
    }

    #[test]
    fn test_parse_without_options_or_span() {
        let ctx = TraceContext::parse("abc/123").unwrap();
        assert!(!ctx.sampled);

        let ctx = TraceContext::parse("abc;o=1").unwrap();
        assert_eq!(ctx.trace_id, "abc");
        assert_eq!(ctx.span_id, None);
        assert!(ctx.sampled);
    }

    #[test]
    fn test_parse_bad_span_id_is_ignored() {
        let ctx = TraceContext::parse("abc/not-a-number;o=1").unwrap();
        assert_eq!(ctx.span_id, None);
        assert!(ctx.sampled);
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(TraceContext::parse(""), None);
        assert_eq!(TraceContext::parse("  ;o=1"), None);
        assert_eq!(TraceContext::parse("/12;o=1"), None);
    }

    #[test]
    fn test_header_value() {
        let ctx = TraceContext::parse("abc/12;o=1").unwrap();
        assert_eq!(ctx.to_header_value(), "abc/12;o=1");
    }
}
