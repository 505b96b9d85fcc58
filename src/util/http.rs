use std::borrow::Cow;

use http::{Method, Request, Version};

/// String representation of HTTP method
pub fn http_method(method: &Method) -> &'static str {
    match *method {
        Method::GET => "GET",
        Method::POST => "POST",
        Method::PUT => "PUT",
        Method::DELETE => "DELETE",
        Method::HEAD => "HEAD",
        Method::OPTIONS => "OPTIONS",
        Method::CONNECT => "CONNECT",
        Method::PATCH => "PATCH",
        Method::TRACE => "TRACE",
        _ => "_OTHER",
    }
}

/// String representation of network protocol version
pub fn http_version(version: Version) -> Option<&'static str> {
    match version {
        Version::HTTP_09 => Some("0.9"),
        Version::HTTP_10 => Some("1.0"),
        Version::HTTP_11 => Some("1.1"),
        Version::HTTP_2 => Some("2"),
        Version::HTTP_3 => Some("3"),
        _ => None,
    }
}

/// Get the url scheme from the request.
pub fn http_url_scheme<B>(req: &Request<B>) -> Option<&'static str> {
    if let Some(scheme) = req.uri().scheme_str() {
        if scheme.eq_ignore_ascii_case("https") {
            return Some("https");
        }
        if scheme.eq_ignore_ascii_case("http") {
            return Some("http");
        }
    }

    let x_forwarded_proto = req
        .headers()
        .get("x-forwarded-proto")
        .and_then(|v| match v.to_str() {
            Ok(value) if value.eq_ignore_ascii_case("http") => Some("http"),
            Ok(value) if value.eq_ignore_ascii_case("https") => Some("https"),
            _ => None,
        });
    if let Some(x_forwarded_proto) = x_forwarded_proto {
        return Some(x_forwarded_proto);
    }

    req.headers()
        .get("forwarded")
        .and_then(|v| extract_proto_from_forwarded_header(v.as_bytes()))
}

fn extract_proto_from_forwarded_header(header_value: &[u8]) -> Option<&'static str> {
    for value_per_proxy in header_value.split(|c| *c == b',') {
        for directive in value_per_proxy.split(|c| *c == b';') {
            let directive = directive.trim_ascii().to_ascii_lowercase();

            if let Some(proto) = directive.strip_prefix(b"proto=") {
                return match proto {
                    b"http" => Some("http"),
                    b"https" => Some("https"),
                    _ => None,
                };
            }
        }
    }
    None
}

/// Route pattern of the request, for routers other than axum.
///
/// Insert it in the request extensions before the tracing layer runs and it
/// names the server span when no matched path template is available.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutePattern(pub Cow<'static, str>);

impl RoutePattern {
    pub fn new(pattern: impl Into<Cow<'static, str>>) -> Self {
        Self(pattern.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Route of the request: the matched path template, then a route pattern.
pub fn http_route<B>(req: &Request<B>) -> Option<&str> {
    matched_path(req).or_else(|| {
        req.extensions()
            .get::<RoutePattern>()
            .map(RoutePattern::as_str)
    })
}

/// Name of the server span: the route, or a label saying there was none.
pub fn route_name<B>(req: &Request<B>) -> Cow<'_, str> {
    match http_route(req) {
        Some(route) if !route.is_empty() => Cow::Borrowed(route),
        _ => Cow::Owned(format!("HTTP {} route not found", http_method(req.method()))),
    }
}

/// Address of the client: the first `X-Forwarded-For` entry, then the peer
/// address when the framework exposes it.
pub fn client_address<B>(req: &Request<B>) -> Option<String> {
    let forwarded_for = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(forwarded_for) = forwarded_for {
        return Some(forwarded_for.to_owned());
    }

    peer_address(req)
}

cfg_if::cfg_if! {
    if #[cfg(feature = "axum")] {
        fn matched_path<B>(req: &Request<B>) -> Option<&str> {
            use axum::extract::MatchedPath;
            req.extensions().get::<MatchedPath>().map(|matched_path| matched_path.as_str())
        }

        fn peer_address<B>(req: &Request<B>) -> Option<String> {
            use axum::extract::ConnectInfo;
            req.extensions()
                .get::<ConnectInfo<std::net::SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        }
    } else {
        fn matched_path<B>(_req: &Request<B>) -> Option<&str> {
            None
        }

        fn peer_address<B>(_req: &Request<B>) -> Option<String> {
            None
        }
    }
}
