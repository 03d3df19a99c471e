//! Edge middleware: request context propagation, process-time headers, and
//! the per-address token bucket.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderValue, StatusCode, header::HeaderName};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{Instrument, info_span, warn};

use locarank_context::RequestScope;

use crate::error::ErrorBody;
use crate::state::AppState;

pub const CORRELATION_HEADER: &str = "x-correlation-id";
pub const USER_HEADER: &str = "x-user-id";
pub const SESSION_HEADER: &str = "x-session-id";

fn header_string(request: &Request, name: &str) -> Option<String> {
    request
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

/// Install the ambient request scope from the standard headers (generating
/// a correlation id when absent), open the request span every downstream
/// log line inherits, and echo the correlation id on the response.
pub async fn request_context(request: Request, next: Next) -> Response {
    let correlation_id = header_string(&request, CORRELATION_HEADER)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let user_id = header_string(&request, USER_HEADER);
    let session_id = header_string(&request, SESSION_HEADER);

    let scope = RequestScope::new(correlation_id.clone())
        .with_user(user_id.clone())
        .with_session(session_id.clone());

    let span = info_span!(
        "request",
        correlation_id = %correlation_id,
        user_id = user_id.as_deref().unwrap_or("-"),
        session_id = session_id.as_deref().unwrap_or("-"),
        method = %request.method(),
        path = %request.uri().path(),
    );

    let mut response = locarank_context::scope(scope, next.run(request))
        .instrument(span)
        .await;

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(CORRELATION_HEADER), value);
    }
    response
}

/// Stamp `X-Process-Time` (seconds) and `X-Process-Time-Ms` on every
/// response.
pub async fn process_time(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let mut response = next.run(request).await;
    let elapsed = started.elapsed();

    let seconds = format!("{:.3}", elapsed.as_secs_f64());
    let millis = format!("{:.2}", elapsed.as_secs_f64() * 1000.0);
    if let Ok(value) = HeaderValue::from_str(&seconds) {
        response
            .headers_mut()
            .insert(HeaderName::from_static("x-process-time"), value);
    }
    if let Ok(value) = HeaderValue::from_str(&millis) {
        response
            .headers_mut()
            .insert(HeaderName::from_static("x-process-time-ms"), value);
    }
    response
}

/// Per-remote-address token bucket. Requests without a resolvable peer
/// address (e.g. in-process tests) pass through.
pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip());

    if let Some(ip) = peer {
        if state.limiter.check_key(&ip).is_err() {
            warn!(%ip, "rate limit exceeded");
            let body = ErrorBody {
                error: "rate limit exceeded".to_string(),
                detail: Some(format!(
                    "limited to {} requests per {} seconds",
                    state.config.api.rate_limit_requests,
                    state.config.api.rate_limit_window_seconds
                )),
                status_code: StatusCode::TOO_MANY_REQUESTS.as_u16(),
            };
            return (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
        }
    }

    next.run(request).await
}
