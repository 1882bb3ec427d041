//! Request handlers for the session surface.
//!
//! Engine calls block (lock waits, spill I/O), so every handler runs them on
//! the blocking thread pool.

mod lob;
mod row;
mod session;

pub use lob::*;
pub use row::*;
pub use session::*;

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, Response, StatusCode};
use chrono::Utc;

use crate::context::{format_http_date, RequestContext};
use crate::error::{LobError, LobResult, SqlState};

/// Creates common response headers.
pub fn common_headers(ctx: &RequestContext) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(v) = HeaderValue::from_str(&ctx.request_id) {
        headers.insert("x-lob-request-id", v);
    }
    if let Ok(v) = HeaderValue::from_str(&format_http_date(&Utc::now())) {
        headers.insert("Date", v);
    }
    headers.insert(
        "server",
        HeaderValue::from_static(concat!("lobstore-rs/", env!("CARGO_PKG_VERSION"))),
    );
    headers
}

/// Builds a response with the given status, headers, and body.
pub fn build_response(status: StatusCode, headers: HeaderMap, body: Body) -> Response<Body> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Builds an XML response.
pub fn xml_response(ctx: &RequestContext, status: StatusCode, xml: String) -> Response<Body> {
    let mut headers = common_headers(ctx);
    headers.insert("Content-Type", HeaderValue::from_static("application/xml"));
    build_response(status, headers, Body::from(xml))
}

/// Runs a blocking engine call on the blocking thread pool.
pub async fn run_blocking<T, F>(f: F) -> LobResult<T>
where
    F: FnOnce() -> LobResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        LobError::with_message(SqlState::InternalError, format!("Engine task failed: {}", e))
    })?
}
