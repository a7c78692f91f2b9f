//! Prometheus metrics for signoff-server.
//!
//! Exposes server metrics in Prometheus format at the `/metrics` endpoint.

use std::sync::OnceLock;
use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder and return a handle for rendering.
///
/// The recorder is process-global; later calls return the same handle.
pub fn init_metrics() -> PrometheusHandle {
    HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            describe_counter!(
                "signoff_http_requests_total",
                "Total number of HTTP requests processed"
            );
            describe_histogram!(
                "signoff_http_request_duration_seconds",
                "Duration of HTTP requests in seconds"
            );
            describe_counter!(
                "signoff_links_issued_total",
                "Magic links issued to supervisors"
            );
            describe_counter!(
                "signoff_signoffs_total",
                "Evidence records signed off, by channel"
            );
            describe_counter!(
                "signoff_link_refusals_total",
                "Magic link presentations refused, by reason"
            );

            handle
        })
        .clone()
}

/// Record a completed HTTP request.
pub fn record_http_request(route: String, status: u16, duration: std::time::Duration) {
    let class = match status {
        200..=399 => "ok",
        400..=499 => "client_error",
        _ => "server_error",
    };
    counter!("signoff_http_requests_total", "route" => route.clone(), "status" => class)
        .increment(1);
    histogram!("signoff_http_request_duration_seconds", "route" => route)
        .record(duration.as_secs_f64());
}

pub fn record_link_issued() {
    counter!("signoff_links_issued_total").increment(1);
}

/// `channel` is `magic_link` or `in_app`.
pub fn record_signoff(channel: &'static str) {
    counter!("signoff_signoffs_total", "channel" => channel).increment(1);
}

pub fn record_link_refusal(reason: &'static str) {
    counter!("signoff_link_refusals_total", "reason" => reason).increment(1);
}

/// Times a request and records metrics on completion.
pub struct RequestTimer {
    route: String,
    start: Instant,
}

impl RequestTimer {
    pub fn new(route: String) -> Self {
        Self {
            route,
            start: Instant::now(),
        }
    }

    pub fn finish(self, status: u16) {
        record_http_request(self.route, status, self.start.elapsed());
    }
}

/// Router middleware: one timer per request, labelled with the matched route template.
pub async fn track_requests(req: Request, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let timer = RequestTimer::new(route);
    let response = next.run(req).await;
    timer.finish(response.status().as_u16());
    response
}
