//! Middleware that adds tracing to a serverless function handler.
//!
//! The incoming event and the handler response are recorded as `faas.event`
//! and `faas.res`, after going through the configured [`Redactor`]. The span
//! ends when the handler returns.

use std::{
    fmt::Display,
    future::Future,
    pin::Pin,
    sync::atomic::{AtomicBool, Ordering},
    task::{ready, Context, Poll},
};

use pin_project::pin_project;
use serde::Serialize;
use tower_layer::Layer;
use tower_service::Service;
use tracing::{Level, Span};

use super::span::{record_error, SpanGuard, SpanKind};
use crate::capture::{record_redacted, CaptureConfig, Redactor};

static COLD_START: AtomicBool = AtomicBool::new(true);

/// `true` for the first invocation handled by this process.
fn take_cold_start() -> bool {
    COLD_START.swap(false, Ordering::Relaxed)
}

/// An event handed to a function handler.
pub trait Invocation {
    /// The event as it should appear in `faas.event`.
    fn payload(&self) -> Option<String>;

    /// Identifier of this invocation, assigned by the platform.
    fn invocation_id(&self) -> Option<&str> {
        None
    }

    /// Identifier of the invoked function, e.g. its ARN.
    fn function_id(&self) -> Option<&str> {
        None
    }
}

impl Invocation for serde_json::Value {
    fn payload(&self) -> Option<String> {
        Some(self.to_string())
    }
}

impl Invocation for String {
    fn payload(&self) -> Option<String> {
        Some(self.clone())
    }
}

impl Invocation for bytes::Bytes {
    fn payload(&self) -> Option<String> {
        Some(String::from_utf8_lossy(self).into_owned())
    }
}

#[cfg(feature = "lambda")]
impl<P: Serialize> Invocation for lambda_runtime::LambdaEvent<P> {
    fn payload(&self) -> Option<String> {
        serde_json::to_string(&self.payload).ok()
    }

    fn invocation_id(&self) -> Option<&str> {
        Some(&self.context.request_id)
    }

    fn function_id(&self) -> Option<&str> {
        Some(&self.context.invoked_function_arn)
    }
}

/// [`Layer`] that adds tracing to a function handler.
#[derive(Clone, Debug)]
pub struct FaasLayer {
    level: Level,
    capture: CaptureConfig,
}

impl FaasLayer {
    /// [`Span`]s are constructed at the given level.
    pub fn new(level: Level) -> Self {
        Self {
            level,
            capture: CaptureConfig::default(),
        }
    }

    /// Replaces the capture settings.
    pub fn with_capture(mut self, capture: CaptureConfig) -> Self {
        self.capture = capture;
        self
    }

    /// Events and responses are not recorded.
    pub fn metadata_only(mut self, metadata_only: bool) -> Self {
        self.capture = self.capture.metadata_only(metadata_only);
        self
    }

    /// Events and responses go through `redactor` before being recorded.
    pub fn with_redactor<R>(mut self, redactor: R) -> Self
    where
        R: Redactor + 'static,
    {
        self.capture = self.capture.with_redactor(redactor);
        self
    }
}

impl<S> Layer<S> for FaasLayer {
    type Service = Faas<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Faas {
            inner,
            level: self.level,
            capture: self.capture.clone(),
        }
    }
}

/// Middleware that adds tracing to a function handler.
#[derive(Clone, Debug)]
pub struct Faas<S> {
    inner: S,
    level: Level,
    capture: CaptureConfig,
}

impl<S, E> Service<E> for Faas<S>
where
    S: Service<E>,
    S::Response: Serialize,
    S::Error: Display,
    E: Invocation,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = InvocationFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, event: E) -> Self::Future {
        let span = make_invocation_span(self.level, &event);
        if !self.capture.is_metadata_only() {
            if let Some(payload) = event.payload() {
                record_redacted(&span, &self.capture, "faas.event", payload.as_bytes());
            }
        }

        let guard = SpanGuard::new(span);
        let inner = {
            let _enter = guard.span().enter();
            self.inner.call(event)
        };

        InvocationFuture {
            inner,
            guard,
            capture: self.capture.clone(),
        }
    }
}

/// Response future for [`Faas`].
#[pin_project]
pub struct InvocationFuture<F> {
    #[pin]
    inner: F,
    guard: SpanGuard,
    capture: CaptureConfig,
}

impl<F, T, E> Future for InvocationFuture<F>
where
    F: Future<Output = Result<T, E>>,
    T: Serialize,
    E: Display,
{
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let result = {
            let _enter = this.guard.span().enter();
            ready!(this.inner.poll(cx))
        };

        let span = this.guard.span();
        match &result {
            Ok(response) => {
                if !this.capture.is_metadata_only() {
                    match serde_json::to_vec(response) {
                        Ok(response) => record_redacted(span, this.capture, "faas.res", &response),
                        Err(err) => {
                            tracing::debug!(error = %err, "handler response is not serializable")
                        }
                    }
                }
            }
            Err(err) => record_error(span, err),
        }
        this.guard.end();

        Poll::Ready(result)
    }
}

/// Creates a new [`Span`] for the given invocation.
fn make_invocation_span<E: Invocation>(level: Level, event: &E) -> Span {
    // taken even when the span is disabled
    let cold_start = take_cold_start();

    macro_rules! make_span {
        ($level:expr) => {{
            use tracing::field::Empty;

            tracing::span!(
                $level,
                "FaaS",
                "cloud.resource_id" = event.function_id(),
                "error.message" = Empty,
                "faas.coldstart" = cold_start,
                "faas.invocation_id" = event.invocation_id(),
                "otel.kind" = SpanKind::Server.as_str(),
                "otel.name" = function_name(event.function_id()),
                "otel.status_code" = Empty,
            )
        }};
    }

    match level {
        Level::ERROR => make_span!(Level::ERROR),
        Level::WARN => make_span!(Level::WARN),
        Level::INFO => make_span!(Level::INFO),
        Level::DEBUG => make_span!(Level::DEBUG),
        Level::TRACE => make_span!(Level::TRACE),
    }
}

/// Function name out of an ARN such as
/// `arn:aws:lambda:eu-west-1:123456789012:function:checkout:prod`.
fn function_name(function_id: Option<&str>) -> &str {
    function_id
        .and_then(|arn| arn.split(':').nth(6))
        .filter(|name| !name.is_empty())
        .unwrap_or("handler")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_name_from_arn() {
        assert_eq!(
            function_name(Some("arn:aws:lambda:eu-west-1:123456789012:function:checkout:prod")),
            "checkout"
        );
        assert_eq!(
            function_name(Some("arn:aws:lambda:eu-west-1:123456789012:function:checkout")),
            "checkout"
        );
        assert_eq!(function_name(Some("checkout")), "handler");
        assert_eq!(function_name(None), "handler");
    }

    #[test]
    fn cold_start_is_taken_by_disabled_spans() {
        use tracing_subscriber::{filter::LevelFilter, layer::SubscriberExt};

        let subscriber = tracing_subscriber::registry().with(LevelFilter::INFO);
        let _guard = tracing::subscriber::set_default(subscriber);
        assert!(COLD_START.load(Ordering::Relaxed));

        let span = make_invocation_span(Level::DEBUG, &serde_json::Value::Null);
        assert!(span.is_disabled());
        assert!(!COLD_START.load(Ordering::Relaxed));
        assert!(!take_cold_start());
    }

    #[test]
    fn json_payloads_are_compact() {
        let event = serde_json::json!({"order": 7});
        assert_eq!(event.payload().as_deref(), Some(r#"{"order":7}"#));
    }
}
