use std::fmt::Display;

use http::{HeaderValue, StatusCode};

use super::{
    pool::{Pool, Pooled, Recycle},
    Tap,
};

/// Server-side view of a response being written.
///
/// The first status written wins; writing data without a status first keeps
/// the default `200 OK`. Data goes through the same capture rules as a [`Tap`].
#[derive(Debug)]
pub struct Recorder {
    tap: Tap,
    status: StatusCode,
    written: bool,
    metadata_only: bool,
}

/// Pool of [`Recorder`]s shared by the requests of a server.
pub type RecorderPool = Pool<Recorder>;

/// A [`Recorder`] bound to one response, returned to its pool on drop.
pub type PooledRecorder = Pooled<Recorder>;

impl Recorder {
    /// Records the response status, unless something was already written.
    pub fn write_header(&mut self, status: StatusCode) {
        if !self.written {
            self.written = true;
            self.status = status;
        }
    }

    /// Records a chunk of the response body.
    pub fn write(&mut self, chunk: &[u8]) {
        self.written = true;
        self.tap.observe(chunk);
    }

    pub fn record_error(&mut self, err: &dyn Display) {
        self.tap.record_error(err);
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Whether a status or some data has been written.
    pub fn is_written(&self) -> bool {
        self.written
    }

    pub fn is_metadata_only(&self) -> bool {
        self.metadata_only
    }

    /// Response bytes captured so far.
    pub fn captured(&self) -> &[u8] {
        self.tap.captured()
    }

    /// Number of response bytes written.
    pub fn written_bytes(&self) -> u64 {
        self.tap.observed()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.tap.last_error()
    }
}

impl Default for Recorder {
    fn default() -> Self {
        Self {
            tap: Tap::new(None, true),
            status: StatusCode::OK,
            written: false,
            metadata_only: true,
        }
    }
}

impl Recycle for Recorder {
    fn reset(&mut self) {
        self.tap.clear();
        self.status = StatusCode::OK;
        self.written = false;
        self.metadata_only = false;
    }

    fn clear(&mut self) {
        self.tap.clear();
    }
}

impl RecorderPool {
    /// Hands out a recorder for a response with the given content type.
    pub fn acquire_recorder(
        &self,
        content_type: Option<&HeaderValue>,
        metadata_only: bool,
    ) -> PooledRecorder {
        let mut recorder = self.acquire();
        recorder.metadata_only = metadata_only;
        recorder.tap.reset(content_type, metadata_only);
        recorder
    }
}
