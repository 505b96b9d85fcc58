//! OpenTelemetry middleware for HTTP servers, HTTP clients and function
//! handlers, recording request and response bodies on the spans they produce.
//!
//! Spans are created with [`tracing`] and exported through
//! [`tracing-opentelemetry`]; install a subscriber with an OpenTelemetry layer
//! to ship them.
//!
//! ```no_run
//! use tower_otel_capture::{capture::CaptureConfig, trace::HttpLayer};
//! use tracing::Level;
//!
//! let layer = HttpLayer::server(Level::INFO).with_capture(CaptureConfig::from_env());
//! ```
//!
//! Bodies are captured as they stream through the service. The span of a
//! request ends once its response body has been fully produced (server) or
//! consumed (client), so that both bodies can be attached to it. Media,
//! multipart payloads and front-end assets are never captured, see
//! [`capture::should_skip`].
//!
//! [`tracing-opentelemetry`]: https://docs.rs/tracing-opentelemetry

pub mod capture;
pub mod trace;
mod util;
