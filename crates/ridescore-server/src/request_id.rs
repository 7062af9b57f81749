//! Request correlation and per-route metrics
//!
//! Every request runs inside a `request` span carrying its id, so scoring
//! logs can be tied back to the HTTP call. The id is taken from an incoming
//! `X-Request-ID` header when present, generated otherwise, and always echoed
//! on the response.
//!
//! ```bash
//! curl -i -H "X-Request-ID: ride-123" -H 'content-type: application/json' \
//!      -d '{"driver": 17, "customer_id": 42}' http://localhost:8000/score
//! ```

use crate::metrics::RequestTimer;
use axum::{
    body::Body,
    extract::{MatchedPath, Request},
    http::{header::HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;

pub static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

fn incoming_request_id(request: &Request<Body>) -> Option<String> {
    request
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub async fn request_id_middleware(request: Request<Body>, next: Next) -> Response {
    let request_id =
        incoming_request_id(&request).unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let span = tracing::info_span!("request", id = %request_id);
    tracing::debug!(
        parent: &span,
        method = %request.method(),
        path = %request.uri().path(),
        "Incoming request"
    );

    let mut response = next.run(request).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .insert(REQUEST_ID_HEADER.clone(), value);
    }

    response
}

/// Records latency and status per matched route
///
/// Requests that match no route share the `unmatched` label.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let timer = RequestTimer::new(request.method().to_string(), endpoint);
    let response = next.run(request).await;
    timer.observe(response.status().as_u16());

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{middleware, routing::get, Router};
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route("/ping", get(|| async { "pong" }))
            .layer(middleware::from_fn(request_id_middleware))
    }

    #[tokio::test]
    async fn test_incoming_id_is_echoed() {
        let request = Request::builder()
            .uri("/ping")
            .header("x-request-id", "  ride-7  ")
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.headers()["x-request-id"], "ride-7");
    }

    #[tokio::test]
    async fn test_blank_id_is_replaced() {
        let request = Request::builder()
            .uri("/ping")
            .header("x-request-id", "")
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        let id = response.headers()["x-request-id"].to_str().unwrap();
        assert!(uuid::Uuid::parse_str(id).is_ok());
    }
}
