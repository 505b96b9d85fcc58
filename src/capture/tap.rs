//! Byte accumulation behind every captured stream.

use std::{
    fmt::Display,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use http::HeaderValue;

use super::content_type;

/// Mirror of the bytes flowing through one request or response body.
///
/// Every observed chunk is counted; it is also appended to the buffer when
/// capture is enabled, that is when metadata-only mode is off and the content
/// type is capturable. The decision is taken once, at construction.
#[derive(Debug)]
pub struct Tap {
    buffer: Vec<u8>,
    observed: u64,
    last_error: Option<String>,
    content_type: Option<HeaderValue>,
    capture: bool,
}

impl Tap {
    /// Creates a tap for a stream carrying the given content type.
    pub fn new(content_type: Option<&HeaderValue>, metadata_only: bool) -> Self {
        let mut tap = Self {
            buffer: Vec::new(),
            observed: 0,
            last_error: None,
            content_type: None,
            capture: false,
        };
        tap.reset(content_type, metadata_only);
        tap
    }

    /// Records a chunk that went through the stream. A successful read clears
    /// the error left by an earlier one.
    pub fn observe(&mut self, chunk: &[u8]) {
        self.last_error = None;
        self.observed += chunk.len() as u64;
        if self.capture && !chunk.is_empty() {
            self.buffer.extend_from_slice(chunk);
        }
    }

    /// Remembers the error returned by the latest read.
    pub fn record_error(&mut self, err: &dyn Display) {
        self.last_error = Some(err.to_string());
    }

    /// Bytes captured so far.
    pub fn captured(&self) -> &[u8] {
        &self.buffer
    }

    /// Number of bytes that went through the stream, captured or not.
    pub fn observed(&self) -> u64 {
        self.observed
    }

    /// Error returned by the latest read, if it failed.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn content_type(&self) -> Option<&HeaderValue> {
        self.content_type.as_ref()
    }

    /// Whether observed bytes are appended to the buffer.
    pub fn is_capturing(&self) -> bool {
        self.capture
    }

    /// Starts over for a new stream, keeping the buffer allocation.
    pub(crate) fn reset(&mut self, content_type: Option<&HeaderValue>, metadata_only: bool) {
        self.buffer.clear();
        self.observed = 0;
        self.last_error = None;
        self.content_type = content_type.cloned();
        self.capture = !metadata_only && content_type::is_capturable(content_type);
    }

    /// Drops everything tied to the last stream.
    pub(crate) fn clear(&mut self) {
        self.reset(None, true);
    }
}

/// [`Tap`] shared between a body handed to another task and the code that
/// reports on it once the exchange is over.
#[derive(Clone, Debug)]
pub struct SharedTap(Arc<Mutex<Tap>>);

impl SharedTap {
    pub fn new(tap: Tap) -> Self {
        Self(Arc::new(Mutex::new(tap)))
    }

    /// Locks the tap. A panic in another holder does not leave the
    /// accumulated bytes in an inconsistent state, so poisoning is ignored.
    pub fn lock(&self) -> MutexGuard<'_, Tap> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the bytes captured so far.
    pub fn captured(&self) -> Vec<u8> {
        self.lock().captured().to_vec()
    }
}
