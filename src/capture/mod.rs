//! Body capture shared by every adapter.
//!
//! Bytes are mirrored as they flow through request and response bodies,
//! filtered by content type, and recorded on spans only after going through a
//! [`Redactor`]. When the configuration is metadata-only nothing is buffered
//! and no header or body attribute is ever recorded.

use std::{fmt, sync::Arc};

#[doc(inline)]
pub use self::{
    body::CapturedBody,
    content_type::{is_capturable, should_skip, ContentTypeError},
    pool::{Pool, Pooled, Recycle},
    recorder::{PooledRecorder, Recorder, RecorderPool},
    redact::{record_redacted, redacted_attribute, NoopRedactor, Redactor},
    tap::{SharedTap, Tap},
};

mod body;
pub mod content_type;
pub mod pool;
mod recorder;
mod redact;
mod tap;

/// Environment variable turning metadata-only capture on when set to `true`.
pub const METADATA_ONLY_ENV: &str = "HS_METADATA_ONLY";

/// Capture settings handed to a layer when it is built.
#[derive(Clone)]
pub struct CaptureConfig {
    metadata_only: bool,
    redactor: Arc<dyn Redactor>,
}

impl CaptureConfig {
    /// Captures headers and bodies, recording them unredacted.
    pub fn new() -> Self {
        Self {
            metadata_only: false,
            redactor: Arc::new(NoopRedactor),
        }
    }

    /// Reads [`METADATA_ONLY_ENV`] once.
    pub fn from_env() -> Self {
        let value = std::env::var(METADATA_ONLY_ENV).ok();
        Self::new().metadata_only(metadata_only_from(value.as_deref()))
    }

    /// Only structural metadata is recorded: no header, no body.
    pub fn metadata_only(mut self, metadata_only: bool) -> Self {
        self.metadata_only = metadata_only;
        self
    }

    /// Every captured header and body attribute goes through `redactor`.
    pub fn with_redactor<R>(mut self, redactor: R) -> Self
    where
        R: Redactor + 'static,
    {
        self.redactor = Arc::new(redactor);
        self
    }

    /// Whether header and body content is kept off the spans.
    pub fn is_metadata_only(&self) -> bool {
        self.metadata_only
    }

    /// The redactor applied to captured content.
    pub fn redactor(&self) -> &dyn Redactor {
        self.redactor.as_ref()
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CaptureConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureConfig")
            .field("metadata_only", &self.metadata_only)
            .finish_non_exhaustive()
    }
}

fn metadata_only_from(value: Option<&str>) -> bool {
    value == Some("true")
}
