#![allow(dead_code)]

use std::{
    collections::VecDeque,
    io,
    pin::Pin,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    task::{Context, Poll},
};

use bytes::Bytes;
use http_body::{Body, Frame};
use opentelemetry::{trace::TracerProvider as _, KeyValue};
use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider, SpanData};
use tracing::{span, subscriber::DefaultGuard, Subscriber};
use tracing_subscriber::{layer::SubscriberExt, registry::LookupSpan, Layer};

/// Spans exported by the code under test, for the current thread only.
pub struct Telemetry {
    exporter: InMemorySpanExporter,
    closed: Arc<AtomicUsize>,
    _provider: SdkTracerProvider,
    _guard: DefaultGuard,
}

/// Counts span closes, one per ended span.
struct CountCloses(Arc<AtomicUsize>);

impl<S> Layer<S> for CountCloses
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_close(&self, _id: span::Id, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn install() -> Telemetry {
    let exporter = InMemorySpanExporter::default();
    let provider = SdkTracerProvider::builder()
        .with_simple_exporter(exporter.clone())
        .build();
    let tracer = provider.tracer("tower-otel-capture-tests");
    let closed = Arc::new(AtomicUsize::new(0));

    let subscriber = tracing_subscriber::registry()
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .with(CountCloses(Arc::clone(&closed)));
    let guard = tracing::subscriber::set_default(subscriber);

    Telemetry {
        exporter,
        closed,
        _provider: provider,
        _guard: guard,
    }
}

impl Telemetry {
    pub fn spans(&self) -> Vec<SpanData> {
        self.exporter.get_finished_spans().unwrap()
    }

    /// The single span exported so far.
    pub fn span(&self) -> SpanData {
        let mut spans = self.spans();
        assert_eq!(spans.len(), 1, "expected exactly one span");
        spans.remove(0)
    }

    /// Number of spans ended so far.
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

pub fn attribute(span: &SpanData, key: &str) -> Option<String> {
    span.attributes
        .iter()
        .find(|attribute| attribute.key.as_str() == key)
        .map(|attribute| attribute.value.as_str().into_owned())
}

/// Redactor wrapping values in angle brackets, so tests can tell redacted
/// values from raw ones.
pub fn bracket(attribute: KeyValue) -> KeyValue {
    let value = format!("<{}>", attribute.value.as_str());
    KeyValue::new(attribute.key, value)
}

/// Body yielding prepared frames, one per poll.
#[derive(Debug)]
pub struct Frames(VecDeque<Result<Frame<Bytes>, io::Error>>);

impl Frames {
    pub fn data(chunks: &[&'static str]) -> Self {
        Self(
            chunks
                .iter()
                .map(|chunk| Ok(Frame::data(Bytes::from_static(chunk.as_bytes()))))
                .collect(),
        )
    }

    pub fn then_fail(mut self, message: &'static str) -> Self {
        self.0
            .push_back(Err(io::Error::new(io::ErrorKind::ConnectionReset, message)));
        self
    }
}

impl Body for Frames {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Poll::Ready(self.0.pop_front())
    }

    fn is_end_stream(&self) -> bool {
        self.0.is_empty()
    }
}
