use opentelemetry::KeyValue;
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;

use super::CaptureConfig;

/// Removes sensitive content from a captured attribute before it is recorded.
///
/// Implementations are expected to be pure: the same attribute always yields
/// the same result, and they may be called any number of times per span.
pub trait Redactor: Send + Sync {
    fn redact(&self, attribute: KeyValue) -> KeyValue;
}

impl<F> Redactor for F
where
    F: Fn(KeyValue) -> KeyValue + Send + Sync,
{
    fn redact(&self, attribute: KeyValue) -> KeyValue {
        self(attribute)
    }
}

/// [`Redactor`] that records captured content as is.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopRedactor;

impl Redactor for NoopRedactor {
    fn redact(&self, attribute: KeyValue) -> KeyValue {
        attribute
    }
}

/// Builds the redacted attribute for a captured buffer.
///
/// Returns `None` when nothing was captured or when the configuration is
/// metadata-only; the redactor is not called in that case.
pub fn redacted_attribute(
    config: &CaptureConfig,
    key: &'static str,
    captured: &[u8],
) -> Option<KeyValue> {
    if config.is_metadata_only() || captured.is_empty() {
        return None;
    }

    let value = String::from_utf8_lossy(captured).into_owned();
    Some(config.redactor().redact(KeyValue::new(key, value)))
}

/// Records the redacted form of a captured buffer on `span`.
pub fn record_redacted(span: &Span, config: &CaptureConfig, key: &'static str, captured: &[u8]) {
    if let Some(attribute) = redacted_attribute(config, key, captured) {
        span.set_attribute(attribute.key, attribute.value);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use opentelemetry::Value;

    use super::*;

    fn mask(attribute: KeyValue) -> KeyValue {
        let masked = attribute.value.as_str().replace("hunter2", "****");
        KeyValue::new(attribute.key, masked)
    }

    #[test]
    fn redactor_sees_the_captured_text() {
        let config = CaptureConfig::new().with_redactor(mask);
        let attribute =
            redacted_attribute(&config, "http.request.body", br#"{"password":"hunter2"}"#).unwrap();

        assert_eq!(attribute.key.as_str(), "http.request.body");
        assert_eq!(
            attribute.value,
            Value::from(r#"{"password":"****"}"#.to_owned())
        );
    }

    #[test]
    fn empty_buffers_skip_the_redactor() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let config = CaptureConfig::new().with_redactor(move |attribute: KeyValue| {
            counter.fetch_add(1, Ordering::SeqCst);
            attribute
        });

        assert!(redacted_attribute(&config, "http.response.body", b"").is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn metadata_only_skips_the_redactor() {
        let config = CaptureConfig::new().metadata_only(true);
        assert!(redacted_attribute(&config, "http.response.body", b"{}").is_none());
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let config = CaptureConfig::new();
        let attribute = redacted_attribute(&config, "faas.event", b"ok\xff").unwrap();
        assert_eq!(attribute.value, Value::from("ok\u{fffd}".to_owned()));
    }
}
