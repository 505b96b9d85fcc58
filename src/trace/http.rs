//! Middleware that adds tracing and body capture to a [`Service`] that handles HTTP requests.
//!
//! The same layer wraps servers ([`HttpLayer::server`]) and clients
//! ([`HttpLayer::client`]). In both cases the span stays open until the
//! response body has been consumed, so that the captured response can be
//! recorded before the span ends.

use std::{
    fmt::Display,
    future::Future,
    pin::Pin,
    task::{ready, Context, Poll},
};

use http::{header::CONTENT_TYPE, HeaderName, Request, Response};
use pin_project::pin_project;
use tower_layer::Layer;
use tower_service::Service;
use tracing::{Level, Span};

use super::{
    body::{Capture, ClientCapture, ResponseBody, ServerCapture, ServerExchange},
    propagation,
    span::{headers_json, record_error, record_status, SpanGuard, SpanKind},
};
use crate::{
    capture::{record_redacted, CaptureConfig, CapturedBody, RecorderPool, Redactor, SharedTap, Tap},
    util,
};

const TRACE_RESPONSE: HeaderName = HeaderName::from_static("traceresponse");

/// [`Layer`] that adds tracing to a [`Service`] that handles HTTP requests.
#[derive(Clone, Debug)]
pub struct HttpLayer {
    level: Level,
    kind: SpanKind,
    capture: CaptureConfig,
    recorders: RecorderPool,
}

impl HttpLayer {
    /// [`Span`] are constructed at the given level from server side.
    pub fn server(level: Level) -> Self {
        Self::new(level, SpanKind::Server)
    }

    /// [`Span`] are constructed at the given level from client side.
    pub fn client(level: Level) -> Self {
        Self::new(level, SpanKind::Client)
    }

    fn new(level: Level, kind: SpanKind) -> Self {
        Self {
            level,
            kind,
            capture: CaptureConfig::default(),
            recorders: RecorderPool::new(),
        }
    }

    /// Replaces the capture settings.
    pub fn with_capture(mut self, capture: CaptureConfig) -> Self {
        self.capture = capture;
        self
    }

    /// Only structural metadata is recorded: no header, no body.
    pub fn metadata_only(mut self, metadata_only: bool) -> Self {
        self.capture = self.capture.metadata_only(metadata_only);
        self
    }

    /// Captured headers and bodies go through `redactor` before being recorded.
    pub fn with_redactor<R>(mut self, redactor: R) -> Self
    where
        R: Redactor + 'static,
    {
        self.capture = self.capture.with_redactor(redactor);
        self
    }
}

impl<S> Layer<S> for HttpLayer {
    type Service = Http<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Http {
            inner,
            level: self.level,
            kind: self.kind,
            capture: self.capture.clone(),
            recorders: self.recorders.clone(),
        }
    }
}

/// Middleware that adds tracing to a [`Service`] that handles HTTP requests.
#[derive(Clone, Debug)]
pub struct Http<S> {
    inner: S,
    level: Level,
    kind: SpanKind,
    capture: CaptureConfig,
    recorders: RecorderPool,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for Http<S>
where
    S: Service<Request<CapturedBody<ReqBody>>, Response = Response<ResBody>>,
    S::Error: Display,
    ResBody: http_body::Body,
{
    type Response = Response<ResponseBody<ResBody>>;
    type Error = S::Error;
    type Future = ResponseFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let metadata_only = self.capture.is_metadata_only();

        // captured before the trace context is injected
        let request_headers = (!metadata_only).then(|| headers_json(req.headers()));
        let request_body = SharedTap::new(Tap::new(req.headers().get(CONTENT_TYPE), metadata_only));

        let span = make_request_span(self.level, self.kind, &mut req);
        let request_headers = match self.kind {
            SpanKind::Client => {
                if let Some(headers) = &request_headers {
                    record_redacted(&span, &self.capture, "http.request.headers", headers.as_bytes());
                }
                None
            }
            SpanKind::Server => request_headers,
        };

        let req = req.map(|body| CapturedBody::new(body, request_body.clone()));
        let guard = SpanGuard::new(span);
        let inner = {
            let _enter = guard.span().enter();
            self.inner.call(req)
        };

        ResponseFuture {
            inner,
            guard,
            kind: self.kind,
            capture: self.capture.clone(),
            recorders: self.recorders.clone(),
            request_body,
            request_headers,
        }
    }
}

/// Response future for [`Http`].
///
/// Dropping the future before it completes ends the span.
#[pin_project]
pub struct ResponseFuture<F> {
    #[pin]
    inner: F,
    guard: SpanGuard,
    kind: SpanKind,
    capture: CaptureConfig,
    recorders: RecorderPool,
    request_body: SharedTap,
    request_headers: Option<String>,
}

impl<F, ResBody, E> Future for ResponseFuture<F>
where
    F: Future<Output = Result<Response<ResBody>, E>>,
    E: Display,
    ResBody: http_body::Body,
{
    type Output = Result<Response<ResponseBody<ResBody>>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let result = {
            let _enter = this.guard.span().enter();
            ready!(this.inner.poll(cx))
        };
        let guard = this.guard.take();

        match (*this.kind, result) {
            (SpanKind::Server, Ok(response)) => {
                let (mut parts, body) = response.into_parts();

                if let Some(trace_response) = propagation::trace_response(guard.span()) {
                    parts.headers.insert(TRACE_RESPONSE, trace_response);
                }

                let metadata_only = this.capture.is_metadata_only();
                let mut recorder = this
                    .recorders
                    .acquire_recorder(parts.headers.get(CONTENT_TYPE), metadata_only);
                recorder.write_header(parts.status);

                let exchange = ServerExchange {
                    guard,
                    capture: this.capture.clone(),
                    request_body: this.request_body.clone(),
                    request_headers: this.request_headers.take(),
                    response_headers: (!metadata_only).then(|| headers_json(&parts.headers)),
                };
                let capture = Capture::Server(ServerCapture { recorder, exchange });

                Poll::Ready(Ok(Response::from_parts(
                    parts,
                    ResponseBody::new(body, capture),
                )))
            }
            (SpanKind::Server, Err(err)) => {
                record_error(guard.span(), &err);

                let mut exchange = ServerExchange {
                    guard,
                    capture: this.capture.clone(),
                    request_body: this.request_body.clone(),
                    request_headers: this.request_headers.take(),
                    response_headers: None,
                };
                exchange.finish(None);

                Poll::Ready(Err(err))
            }
            (SpanKind::Client, Ok(response)) => {
                let (parts, body) = response.into_parts();
                record_client_response(&guard, this.capture, this.request_body, &parts);

                let capture = Capture::Client(ClientCapture {
                    tap: Tap::new(
                        parts.headers.get(CONTENT_TYPE),
                        this.capture.is_metadata_only(),
                    ),
                    guard,
                    capture: this.capture.clone(),
                });

                Poll::Ready(Ok(Response::from_parts(
                    parts,
                    ResponseBody::new(body, capture),
                )))
            }
            (SpanKind::Client, Err(err)) => {
                let mut guard = guard;
                record_error(guard.span(), &err);
                guard.end();

                Poll::Ready(Err(err))
            }
        }
    }
}

/// Creates a new [`Span`] for the given request.
fn make_request_span<B>(level: Level, kind: SpanKind, request: &mut Request<B>) -> Span {
    macro_rules! make_span {
        ($level:expr) => {{
            use tracing::field::Empty;

            tracing::span!(
                $level,
                "HTTP",
                "client.address" = Empty,
                "error.message" = Empty,
                "http.request.body.size" = Empty,
                "http.request.method" = util::http_method(request.method()),
                "http.response.body.size" = Empty,
                "http.response.status_code" = Empty,
                "http.route" = Empty,
                "network.protocol.name" = "http",
                "network.protocol.version" = util::http_version(request.version()),
                "otel.kind" = kind.as_str(),
                "otel.name" = Empty,
                "otel.status_code" = Empty,
                "url.full" = Empty,
                "url.path" = request.uri().path(),
                "url.query" = Empty,
                "url.scheme" = Empty,
            )
        }};
    }

    let span = match level {
        Level::ERROR => make_span!(Level::ERROR),
        Level::WARN => make_span!(Level::WARN),
        Level::INFO => make_span!(Level::INFO),
        Level::DEBUG => make_span!(Level::DEBUG),
        Level::TRACE => make_span!(Level::TRACE),
    };

    if let Some(query) = request.uri().query() {
        span.record("url.query", query);
    }

    if let Some(url_scheme) = util::http_url_scheme(request) {
        span.record("url.scheme", url_scheme);
    }

    match kind {
        SpanKind::Client => {
            span.record(
                "otel.name",
                format!("HTTP {}", util::http_method(request.method())),
            );
            span.record("url.full", tracing::field::display(request.uri()));

            propagation::inject_context(&span, request.headers_mut());
        }
        SpanKind::Server => {
            let route_name = util::route_name(request);
            span.record("otel.name", &*route_name);
            if let Some(http_route) = util::http_route(request) {
                span.record("http.route", http_route);
            }

            if let Some(client_address) = util::client_address(request) {
                span.record("client.address", client_address);
            }

            propagation::extract_parent(&span, request.headers());
        }
    }

    span
}

/// Records what the client knows once the response head has arrived.
fn record_client_response(
    guard: &SpanGuard,
    capture: &CaptureConfig,
    request_body: &SharedTap,
    parts: &http::response::Parts,
) {
    let span = guard.span();

    let request_body = request_body.lock();
    span.record("http.request.body.size", request_body.observed() as i64);
    record_redacted(span, capture, "http.request.body", request_body.captured());
    drop(request_body);

    record_status(span, SpanKind::Client, parts.status);
    if !capture.is_metadata_only() {
        let headers = headers_json(&parts.headers);
        record_redacted(span, capture, "http.response.headers", headers.as_bytes());
    }
}
