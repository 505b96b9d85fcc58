use std::{
    fmt::Display,
    pin::Pin,
    task::{ready, Context, Poll},
};

use bytes::{Buf, Bytes};
use http_body::{Body, Frame, SizeHint};
use pin_project::pin_project;

use super::SharedTap;

/// Request body that mirrors every data frame it yields into a [`SharedTap`].
///
/// Frames, errors and end of stream are forwarded unchanged; trailers are
/// never captured.
#[pin_project]
#[derive(Debug)]
pub struct CapturedBody<B> {
    #[pin]
    inner: B,
    tap: SharedTap,
}

impl<B> CapturedBody<B> {
    pub fn new(inner: B, tap: SharedTap) -> Self {
        Self { inner, tap }
    }

    /// The tap fed by this body.
    pub fn tap(&self) -> &SharedTap {
        &self.tap
    }

    pub fn into_inner(self) -> B {
        self.inner
    }
}

impl<B> Body for CapturedBody<B>
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
        let this = self.project();

        match ready!(this.inner.poll_frame(cx)) {
            Some(Ok(frame)) => {
                let frame = frame.map_data(|mut data| data.copy_to_bytes(data.remaining()));
                if let Some(data) = frame.data_ref() {
                    this.tap.lock().observe(data);
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Some(Err(err)) => {
                this.tap.lock().record_error(&err);
                Poll::Ready(Some(Err(err)))
            }
            None => Poll::Ready(None),
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, io};

    use http::{HeaderMap, HeaderValue};
    use http_body_util::BodyExt;

    use super::*;
    use crate::capture::Tap;

    struct Frames(VecDeque<Result<Frame<Bytes>, io::Error>>);

    impl Frames {
        fn data(chunks: &[&'static [u8]]) -> Self {
            Self(
                chunks
                    .iter()
                    .map(|chunk| Ok(Frame::data(Bytes::from_static(chunk))))
                    .collect(),
            )
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
    }

    fn json_tap(metadata_only: bool) -> SharedTap {
        let json = HeaderValue::from_static("application/json");
        SharedTap::new(Tap::new(Some(&json), metadata_only))
    }

    #[tokio::test]
    async fn forwards_and_captures_chunks() {
        let tap = json_tap(false);
        let body = CapturedBody::new(Frames::data(&[b"{\"a\"", b":", b"1}"]), tap.clone());

        let collected = body.collect().await.unwrap().to_bytes();

        assert_eq!(&collected[..], b"{\"a\":1}");
        assert_eq!(tap.captured(), b"{\"a\":1}");
        assert_eq!(tap.lock().observed(), 7);
    }

    #[tokio::test]
    async fn metadata_only_forwards_without_capturing() {
        let tap = json_tap(true);
        let body = CapturedBody::new(Frames::data(&[b"secret"]), tap.clone());

        let collected = body.collect().await.unwrap().to_bytes();

        assert_eq!(&collected[..], b"secret");
        assert!(tap.captured().is_empty());
        assert_eq!(tap.lock().observed(), 6);
    }

    #[tokio::test]
    async fn trailers_are_not_captured() {
        let mut trailers = HeaderMap::new();
        trailers.insert("grpc-status", HeaderValue::from_static("0"));
        let mut frames = Frames::data(&[b"payload"]);
        frames.0.push_back(Ok(Frame::trailers(trailers)));

        let tap = json_tap(false);
        let collected = CapturedBody::new(frames, tap.clone())
            .collect()
            .await
            .unwrap();

        assert!(collected.trailers().is_some());
        assert_eq!(tap.captured(), b"payload");
    }

    #[tokio::test]
    async fn errors_are_forwarded_and_remembered() {
        let mut frames = Frames::data(&[b"par"]);
        frames
            .0
            .push_back(Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")));

        let tap = json_tap(false);
        let err = CapturedBody::new(frames, tap.clone())
            .collect()
            .await
            .unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
        assert_eq!(tap.captured(), b"par");
        assert_eq!(tap.lock().last_error(), Some("reset"));
    }
}
