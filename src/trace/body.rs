//! Response bodies that keep the span open until the response is consumed.

use std::{
    fmt::{self, Display},
    pin::Pin,
    task::{ready, Context, Poll},
};

use bytes::{Buf, Bytes};
use http_body::{Body, Frame, SizeHint};
use pin_project::pin_project;

use super::span::{record_error, record_status, SpanGuard, SpanKind};
use crate::capture::{record_redacted, CaptureConfig, PooledRecorder, Recorder, SharedTap, Tap};

/// Response body returned by [`Http`](super::Http).
///
/// Frames are forwarded unchanged. The span of the exchange ends when the body
/// reaches its end, or when it is dropped, whichever comes first.
#[pin_project]
pub struct ResponseBody<B> {
    #[pin]
    inner: B,
    capture: Capture,
}

pub(crate) enum Capture {
    Server(ServerCapture),
    Client(ClientCapture),
}

impl<B: Body> ResponseBody<B> {
    pub(crate) fn new(inner: B, mut capture: Capture) -> Self {
        if inner.is_end_stream() {
            capture.complete();
        }
        Self { inner, capture }
    }
}

impl<B> Body for ResponseBody<B>
where
    B: Body,
    B::Error: Display,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let mut this = self.project();

        match ready!(this.inner.as_mut().poll_frame(cx)) {
            Some(Ok(frame)) => {
                let frame = frame.map_data(|mut data| data.copy_to_bytes(data.remaining()));
                if let Some(data) = frame.data_ref() {
                    this.capture.observe(data);
                }
                if this.inner.is_end_stream() {
                    this.capture.complete();
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Some(Err(err)) => {
                this.capture.fail(&err);
                Poll::Ready(Some(Err(err)))
            }
            None => {
                this.capture.complete();
                Poll::Ready(None)
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl<B: fmt::Debug> fmt::Debug for ResponseBody<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseBody")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl Capture {
    fn observe(&mut self, data: &[u8]) {
        match self {
            Capture::Server(server) => server.recorder.write(data),
            Capture::Client(client) => client.tap.observe(data),
        }
    }

    fn fail(&mut self, err: &dyn Display) {
        match self {
            // the server keeps going, the failure shows up as a truncated body
            Capture::Server(server) => server.recorder.record_error(err),
            Capture::Client(client) => {
                client.tap.record_error(err);
                record_error(client.guard.span(), err);
            }
        }
    }

    fn complete(&mut self) {
        match self {
            Capture::Server(server) => server.exchange.finish(Some(&*server.recorder)),
            Capture::Client(client) => client.complete(),
        }
    }
}

/// Everything the server side records once the exchange is over.
pub(crate) struct ServerExchange {
    pub(crate) guard: SpanGuard,
    pub(crate) capture: CaptureConfig,
    pub(crate) request_body: SharedTap,
    pub(crate) request_headers: Option<String>,
    pub(crate) response_headers: Option<String>,
}

impl ServerExchange {
    /// Records the request and, when there is one, the response; then ends the span.
    pub(crate) fn finish(&mut self, response: Option<&Recorder>) {
        if self.guard.is_ended() {
            return;
        }

        let span = self.guard.span();
        let request_body = self.request_body.lock();
        span.record("http.request.body.size", request_body.observed() as i64);

        if let Some(headers) = &self.request_headers {
            record_redacted(span, &self.capture, "http.request.headers", headers.as_bytes());
        }
        record_redacted(
            span,
            &self.capture,
            "http.request.body",
            request_body.captured(),
        );
        drop(request_body);

        if let Some(recorder) = response {
            record_status(span, SpanKind::Server, recorder.status());
            span.record("http.response.body.size", recorder.written_bytes() as i64);

            if let Some(headers) = &self.response_headers {
                record_redacted(span, &self.capture, "http.response.headers", headers.as_bytes());
            }
            record_redacted(span, &self.capture, "http.response.body", recorder.captured());
        }

        self.guard.end();
    }
}

/// Server side: the response is recorded while the server writes it out.
pub(crate) struct ServerCapture {
    pub(crate) recorder: PooledRecorder,
    pub(crate) exchange: ServerExchange,
}

impl Drop for ServerCapture {
    fn drop(&mut self) {
        self.exchange.finish(Some(&*self.recorder));
    }
}

/// Client side: the span ends once the caller has read the whole response,
/// or gives the body up.
pub(crate) struct ClientCapture {
    pub(crate) tap: Tap,
    pub(crate) guard: SpanGuard,
    pub(crate) capture: CaptureConfig,
}

impl ClientCapture {
    fn complete(&mut self) {
        if self.guard.is_ended() {
            return;
        }

        let span = self.guard.span();
        span.record("http.response.body.size", self.tap.observed() as i64);
        record_redacted(span, &self.capture, "http.response.body", self.tap.captured());
        self.guard.end();
    }
}
