use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::{Extension, Json, Router};
use hr_pipeline::workflows::kanban::kanban_router;
use hr_pipeline::workflows::pipeline::{pipeline_router, AuditSink, PipelineRepository};
use hr_pipeline::workflows::request::RequestService;
use hr_pipeline::workflows::response::ResponseService;
use serde_json::json;
use std::sync::Arc;

pub(crate) const REQUESTS_PATH: &str = "/api/v1/requests";
pub(crate) const RESPONSES_PATH: &str = "/api/v1/responses";

pub(crate) fn with_pipeline_routes<R, A>(
    requests: Arc<RequestService<R, A>>,
    responses: Arc<ResponseService<R, A>>,
) -> Router
where
    R: PipelineRepository + 'static,
    A: AuditSink + 'static,
{
    pipeline_router(REQUESTS_PATH, requests)
        .merge(pipeline_router(RESPONSES_PATH, responses.clone()))
        .merge(kanban_router(responses))
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
