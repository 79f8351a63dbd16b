use std::time::Instant;

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use tracing::{Instrument, debug, error, info_span, warn};
use uuid::Uuid;

use crate::application::error::ErrorReport;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Run the request inside a span carrying its id, echo the id on the response,
/// and log the outcome. Error responses are logged with the [`ErrorReport`]
/// chain the handler attached.
pub async fn trace_requests(request: Request<Body>, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map_or_else(|| Uuid::new_v4().to_string(), str::to_string);
    let span = info_span!(
        "admin_request",
        request_id = %request_id,
        method = %request.method(),
        path = %request.uri().path(),
    );

    let start = Instant::now();
    let mut response = next.run(request).instrument(span.clone()).await;
    let elapsed_ms = start.elapsed().as_millis();
    let status = response.status();

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    let report = response.extensions_mut().remove::<ErrorReport>();
    span.in_scope(|| log_outcome(status, elapsed_ms, report));
    response
}

fn log_outcome(status: StatusCode, elapsed_ms: u128, report: Option<ErrorReport>) {
    let Some(report) = report else {
        if status.is_server_error() {
            error!(target = "inkbridge::http", status = status.as_u16(), elapsed_ms, "request failed");
        } else {
            debug!(target = "inkbridge::http", status = status.as_u16(), elapsed_ms, "request completed");
        }
        return;
    };

    let detail = report.messages.first().map_or("", String::as_str);
    if status.is_server_error() {
        error!(
            target = "inkbridge::http",
            status = status.as_u16(),
            elapsed_ms,
            source = report.source,
            detail,
            chain = ?report.messages,
            "request failed"
        );
    } else {
        warn!(
            target = "inkbridge::http",
            status = status.as_u16(),
            elapsed_ms,
            source = report.source,
            detail,
            "request rejected"
        );
    }
}
