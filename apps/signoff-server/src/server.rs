use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use signoff_workflow::{Clock, Workflow};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::backend::StoreBackend;
use crate::config::ServerConfig;
use crate::email::Mailer;
use crate::handlers::{evidence, magic_links};
use crate::metrics::track_requests;

/// Shared handler state. Cheap to clone; everything mutable lives in the store.
#[derive(Clone)]
pub struct AppState {
    pub workflow: Workflow<StoreBackend>,
    /// `None` when no provider is configured; links are issued but not delivered.
    pub mailer: Option<Arc<Mailer>>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(
        backend: StoreBackend,
        config: ServerConfig,
        mailer: Option<Arc<Mailer>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let workflow = Workflow::new(Arc::new(backend), clock, config.workflow_settings());
        Self {
            workflow,
            mailer,
            config: Arc::new(config),
        }
    }
}

/// The public API: magic-link endpoints plus the authenticated in-app path.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/create-magic-link", post(magic_links::create))
        .route("/validate-magic-link", post(magic_links::validate))
        .route("/submit-magic-link-form", post(magic_links::submit))
        .route("/evidence", post(evidence::create))
        .route("/evidence/:id", get(evidence::get).patch(evidence::save))
        .route("/evidence/:id/sign-off", post(evidence::sign_off))
        .route("/evidence/:id/decline", post(evidence::decline))
        .route("/evidence/:id/withdraw", post(evidence::withdraw))
        .route("/evidence/:id/links", post(evidence::link))
        .route("/evidence/:id/magic-links", get(evidence::magic_links))
        .route(
            "/evidence/:id/edit-requests",
            post(evidence::request_edit).get(evidence::edit_requests),
        )
        .route("/edit-requests/:id/approve", post(evidence::approve_edit))
        .route("/edit-requests/:id/deny", post(evidence::deny_edit))
        .route_layer(middleware::from_fn(track_requests))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Clone)]
pub struct ReadinessCheck {
    ready: tokio::sync::watch::Receiver<bool>,
    metrics: PrometheusHandle,
}

impl ReadinessCheck {
    pub fn new(ready: tokio::sync::watch::Receiver<bool>, metrics: PrometheusHandle) -> Self {
        Self { ready, metrics }
    }
}

/// Liveness, readiness and Prometheus scrape endpoints, served on their own listener.
pub fn build_health_router(check: ReadinessCheck) -> Router {
    Router::new()
        .route("/healthz", get(health_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(check)
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn readiness_handler(State(check): State<ReadinessCheck>) -> Result<&'static str, StatusCode> {
    if *check.ready.borrow() {
        Ok("ok")
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}

async fn metrics_handler(State(check): State<ReadinessCheck>) -> String {
    check.metrics.render()
}
