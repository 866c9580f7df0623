//! Request handling.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4) for correlation
//! - Extract routing-relevant information (host, path, visitor metadata)
//!   into an immutable `RequestContext`
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - `X-Forwarded-*` headers are ignored unless explicitly trusted

use std::net::{IpAddr, SocketAddr};

use axum::extract::ConnectInfo;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

use crate::routing::RequestContext;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Request ID generator for `SetRequestIdLayer`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuidV4;

impl MakeRequestId for MakeRequestUuidV4 {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string()).ok().map(RequestId::new)
    }
}

/// The request ID assigned by the layer, or `"unknown"`.
pub fn request_id<B>(request: &Request<B>) -> String {
    request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

fn header_str<'a>(headers: &'a HeaderMap, name: impl header::AsHeaderName) -> &'a str {
    headers.get(name).and_then(|v| v.to_str().ok()).unwrap_or_default()
}

/// Build the routing input for `request`.
pub fn request_context<B>(request: &Request<B>, trust_forwarded_for: bool) -> RequestContext {
    let headers = request.headers();
    let uri = request.uri();

    let host = match header_str(headers, header::HOST) {
        "" => uri.authority().map(|a| a.as_str()).unwrap_or_default(),
        host => host,
    };

    let forwarded_proto = trust_forwarded_for
        .then(|| header_str(headers, X_FORWARDED_PROTO))
        .filter(|p| matches!(*p, "http" | "https"));
    let scheme = forwarded_proto.or(uri.scheme_str()).unwrap_or("http");

    RequestContext {
        scheme: scheme.to_string(),
        host: host.to_string(),
        path: uri.path().to_string(),
        query: uri.query().map(String::from),
        client_ip: client_ip(request, trust_forwarded_for).map(|ip| ip.to_string()).unwrap_or_default(),
        user_agent: header_str(headers, header::USER_AGENT).to_string(),
        referer: header_str(headers, header::REFERER).to_string(),
    }
}

fn client_ip<B>(request: &Request<B>, trust_forwarded_for: bool) -> Option<IpAddr> {
    if trust_forwarded_for {
        let forwarded = header_str(request.headers(), X_FORWARDED_FOR)
            .split(',')
            .next()
            .and_then(|first| first.trim().parse().ok());
        if forwarded.is_some() {
            return forwarded;
        }
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}
