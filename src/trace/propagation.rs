//! Trace context carried in HTTP headers.

use std::str::FromStr;

use http::{HeaderMap, HeaderName, HeaderValue};
use opentelemetry::{trace::TraceContextExt, Context};
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// Read-only view of the headers of an incoming request.
pub(crate) struct HeaderExtractor<'a>(pub &'a HeaderMap);

impl opentelemetry::propagation::Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(|header_value| header_value.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0
            .keys()
            .map(|header_name| header_name.as_str())
            .collect()
    }
}

/// Writable view of the headers of an outgoing request.
pub(crate) struct HeaderInjector<'a>(pub &'a mut HeaderMap);

impl opentelemetry::propagation::Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        if let Ok(header_name) = HeaderName::from_str(key) {
            if let Ok(header_value) = HeaderValue::from_str(&value) {
                self.0.insert(header_name, header_value);
            }
        }
    }
}

/// Makes the remote context found in `headers` the parent of `span`.
pub(crate) fn extract_parent(span: &Span, headers: &HeaderMap) {
    if cfg!(feature = "propagate") {
        let context = opentelemetry::global::get_text_map_propagator(|extractor| {
            extractor.extract(&HeaderExtractor(headers))
        });
        // setting a parent only fails when the span is already started elsewhere
        let _ = span.set_parent(context);
    }
}

/// Writes the context of `span` into `headers`.
pub(crate) fn inject_context(span: &Span, headers: &mut HeaderMap) {
    if cfg!(feature = "propagate") {
        let context = span.context();
        opentelemetry::global::get_text_map_propagator(|injector| {
            injector.inject_context(&context, &mut HeaderInjector(headers));
        });
    }
}

/// `traceresponse` header value for `span`, when it has a valid context.
pub(crate) fn trace_response(span: &Span) -> Option<HeaderValue> {
    let context: Context = span.context();
    let span_context = context.span().span_context().clone();
    if !span_context.is_valid() {
        return None;
    }

    let value = format!(
        "00-{}-{}-01",
        span_context.trace_id(),
        span_context.span_id()
    );
    HeaderValue::from_str(&value).ok()
}

#[cfg(test)]
mod tests {
    use opentelemetry::propagation::{Extractor, Injector};

    use super::*;

    #[test]
    fn injector_skips_invalid_headers() {
        let mut headers = HeaderMap::new();
        let mut injector = HeaderInjector(&mut headers);
        injector.set("traceparent", "00-abc-def-01".to_owned());
        injector.set("bad header", "value".to_owned());
        injector.set("tracestate", "bad\nvalue".to_owned());

        assert_eq!(headers.len(), 1);
        assert_eq!(HeaderExtractor(&headers).get("traceparent"), Some("00-abc-def-01"));
        assert_eq!(HeaderExtractor(&headers).keys(), vec!["traceparent"]);
    }

    #[test]
    fn disabled_span_has_no_trace_response() {
        assert!(trace_response(&Span::none()).is_none());
    }
}
