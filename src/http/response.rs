//! Response construction for routing decisions.
//!
//! # Responsibilities
//! - Turn redirect decisions into `Location` responses
//! - Annotate in-place serves with a canonical `Link` header
//! - Map upstream failures to gateway errors

use axum::body::Body;
use axum::http::{header, HeaderValue, Response, StatusCode};
use axum::response::IntoResponse;

use crate::routing::RedirectDecision;

pub fn redirect(decision: &RedirectDecision) -> Response<Body> {
    let status = StatusCode::from_u16(decision.status.as_u16()).unwrap_or(StatusCode::MOVED_PERMANENTLY);
    match HeaderValue::try_from(decision.location.as_str()) {
        Ok(location) => (status, [(header::LOCATION, location)]).into_response(),
        Err(_) => {
            tracing::error!(location = %decision.location, "Redirect target is not a valid header value");
            (StatusCode::INTERNAL_SERVER_ERROR, "Invalid redirect target").into_response()
        }
    }
}

/// `Link: <url>; rel="canonical"`
pub fn canonical_link(url: &str) -> Option<HeaderValue> {
    HeaderValue::try_from(format!("<{url}>; rel=\"canonical\"")).ok()
}

/// Attach the canonical link to a forwarded response.
pub fn with_canonical(mut response: Response<Body>, url: &str) -> Response<Body> {
    if let Some(value) = canonical_link(url) {
        response.headers_mut().append(header::LINK, value);
    }
    response
}

pub fn bad_gateway() -> Response<Body> {
    (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
}
