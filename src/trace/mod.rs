//! Middleware that adds tracing to a [`Service`].
//!
//! [`Service`]: tower_service::Service

#[doc(inline)]
pub use self::{
    body::ResponseBody,
    faas::{Faas, FaasLayer, Invocation, InvocationFuture},
    http::{Http, HttpLayer, ResponseFuture},
    span::SpanGuard,
};
pub use crate::util::http::RoutePattern;

mod body;
pub mod faas;
pub mod http;
mod propagation;
mod span;
