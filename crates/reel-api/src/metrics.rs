//! Prometheus metrics for the API server.

use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return the handle `/metrics` renders.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "reel_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "reel_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "reel_http_requests_in_flight";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Collapse job ids and static file names so label cardinality stays bounded.
fn sanitize_path(path: &str) -> String {
    if path.starts_with("/static/") {
        return "/static/*".to_string();
    }
    let mut previous = "";
    let mut segments = Vec::new();
    for segment in path.split('/') {
        let is_id = matches!(previous, "generations" | "merges")
            && !segment.is_empty()
            && segment != "localize";
        segments.push(if is_id { ":id" } else { segment });
        previous = segment;
    }
    segments.join("/")
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);
    let response = next.run(request).await;
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    record_http_request(
        &method,
        &path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(
            sanitize_path("/api/generations/550e8400-e29b-41d4-a716-446655440000"),
            "/api/generations/:id"
        );
        assert_eq!(
            sanitize_path("/api/generations/abc/cancel"),
            "/api/generations/:id/cancel"
        );
        assert_eq!(sanitize_path("/api/generations/localize"), "/api/generations/localize");
        assert_eq!(sanitize_path("/api/merges"), "/api/merges");
        assert_eq!(sanitize_path("/static/videos/a.mp4"), "/static/*");
    }
}
