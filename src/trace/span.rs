//! Span ownership and the attributes shared by every adapter.

use std::fmt::{self, Display};

use http::{HeaderMap, StatusCode};
use tracing::Span;

/// Describes the relationship between the [`Span`] and the service producing the span.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SpanKind {
    /// The span describes a request sent to some remote service.
    Client,
    /// The span describes the server-side handling of a request.
    Server,
}

impl SpanKind {
    /// String representation of span kind
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            SpanKind::Client => "client",
            SpanKind::Server => "server",
        }
    }
}

/// Sole owner of a [`Span`] for one unit of work.
///
/// The span ends the first time [`SpanGuard::end`] is called, or when the
/// guard is dropped, whichever comes first. Later calls do nothing.
pub struct SpanGuard {
    span: Span,
    ended: bool,
}

impl SpanGuard {
    pub fn new(span: Span) -> Self {
        Self { span, ended: false }
    }

    /// The guarded span, or a disabled span once ended.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Ends the span. Returns `false` if it had already ended.
    pub fn end(&mut self) -> bool {
        if self.ended {
            return false;
        }
        self.ended = true;
        drop(std::mem::replace(&mut self.span, Span::none()));
        true
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Moves the span into a new guard, leaving this one ended.
    pub(crate) fn take(&mut self) -> SpanGuard {
        let span = std::mem::replace(&mut self.span, Span::none());
        let ended = std::mem::replace(&mut self.ended, true);
        SpanGuard { span, ended }
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        self.end();
    }
}

impl fmt::Debug for SpanGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpanGuard")
            .field("span", &self.span.id())
            .field("ended", &self.ended)
            .finish()
    }
}

/// Records the response status, marking the span as failed where the status
/// is an error for the given side of the exchange.
pub(crate) fn record_status(span: &Span, kind: SpanKind, status: StatusCode) {
    span.record("http.response.status_code", status.as_u16() as i64);

    // client errors are only failures for the client
    if let SpanKind::Client = kind {
        if status.is_client_error() {
            span.record("otel.status_code", "ERROR");
        }
    }
    if status.is_server_error() {
        span.record("otel.status_code", "ERROR");
    }
}

/// Records the error message.
pub(crate) fn record_error<E: Display + ?Sized>(span: &Span, err: &E) {
    span.record("otel.status_code", "ERROR");
    span.record("error.message", err.to_string());
}

/// JSON object mapping each header name to the list of its values.
///
/// Values that are not visible ASCII are left out.
pub(crate) fn headers_json(headers: &HeaderMap) -> String {
    let mut object = serde_json::Map::new();
    for name in headers.keys() {
        let values = headers
            .get_all(name)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .map(|value| serde_json::Value::String(value.to_owned()))
            .collect();
        object.insert(name.as_str().to_owned(), serde_json::Value::Array(values));
    }
    serde_json::Value::Object(object).to_string()
}
