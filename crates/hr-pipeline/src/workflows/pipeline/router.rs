use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Map, Value};

use super::definition::PipelineStage;
use super::record::{AuditSink, EntityId, PipelineRepository};
use super::service::{PipelineService, PipelineServiceError};

type SharedService<S, R, A> = Arc<PipelineService<S, R, A>>;

/// Router exposing create/read/transition/delete for one workflow under `base_path`.
pub fn pipeline_router<S, R, A>(base_path: &str, service: SharedService<S, R, A>) -> Router
where
    S: PipelineStage,
    R: PipelineRepository + 'static,
    A: AuditSink + 'static,
{
    Router::new()
        .route(base_path, post(create_handler::<S, R, A>))
        .route(
            &format!("{base_path}/:entity_id"),
            get(get_handler::<S, R, A>)
                .patch(patch_handler::<S, R, A>)
                .delete(delete_handler::<S, R, A>),
        )
        .route(
            &format!("{base_path}/:entity_id/next"),
            get(next_handler::<S, R, A>),
        )
        .with_state(service)
}

pub(crate) fn error_response(error: PipelineServiceError) -> Response {
    match error {
        PipelineServiceError::NotFound { .. } => {
            let payload = json!({ "error": error.to_string() });
            (StatusCode::NOT_FOUND, Json(payload)).into_response()
        }
        PipelineServiceError::InvalidTransition { from, to, reason } => {
            let payload = json!({
                "error": reason.message(),
                "from": from,
                "to": to,
            });
            (StatusCode::CONFLICT, Json(payload)).into_response()
        }
        other => {
            let payload = json!({ "error": other.to_string() });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
        }
    }
}

fn unprocessable(message: String) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({ "error": message })),
    )
        .into_response()
}

/// Split a PATCH body into the requested stage and the remaining fields.
fn split_patch<S: PipelineStage>(
    stage_field: &str,
    mut body: Map<String, Value>,
) -> Result<(Option<S>, BTreeMap<String, Value>), String> {
    let target = match body.remove(stage_field) {
        None | Some(Value::Null) => None,
        Some(Value::String(raw)) => Some(
            S::from_key(&raw).ok_or_else(|| format!("unknown {stage_field} '{raw}'"))?,
        ),
        Some(other) => return Err(format!("{stage_field} must be a string, found {other}")),
    };

    Ok((target, body.into_iter().collect()))
}

pub(crate) async fn create_handler<S, R, A>(
    State(service): State<SharedService<S, R, A>>,
    Json(body): Json<Map<String, Value>>,
) -> Response
where
    S: PipelineStage,
    R: PipelineRepository + 'static,
    A: AuditSink + 'static,
{
    let stage_field = service.definition().stage_field();
    if body.contains_key(stage_field) {
        return unprocessable(format!(
            "{stage_field} is assigned by the pipeline and cannot be set on create"
        ));
    }

    match service.create(body.into_iter().collect()) {
        Ok(snapshot) => (StatusCode::CREATED, Json(snapshot)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn get_handler<S, R, A>(
    State(service): State<SharedService<S, R, A>>,
    Path(entity_id): Path<String>,
) -> Response
where
    S: PipelineStage,
    R: PipelineRepository + 'static,
    A: AuditSink + 'static,
{
    match service.get(&EntityId(entity_id)) {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn patch_handler<S, R, A>(
    State(service): State<SharedService<S, R, A>>,
    Path(entity_id): Path<String>,
    Json(body): Json<Map<String, Value>>,
) -> Response
where
    S: PipelineStage,
    R: PipelineRepository + 'static,
    A: AuditSink + 'static,
{
    let (target, fields) = match split_patch::<S>(service.definition().stage_field(), body) {
        Ok(parts) => parts,
        Err(message) => return unprocessable(message),
    };

    match service.apply_transition(&EntityId(entity_id), target, fields) {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn delete_handler<S, R, A>(
    State(service): State<SharedService<S, R, A>>,
    Path(entity_id): Path<String>,
) -> Response
where
    S: PipelineStage,
    R: PipelineRepository + 'static,
    A: AuditSink + 'static,
{
    match service.delete(&EntityId(entity_id)) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn next_handler<S, R, A>(
    State(service): State<SharedService<S, R, A>>,
    Path(entity_id): Path<String>,
) -> Response
where
    S: PipelineStage,
    R: PipelineRepository + 'static,
    A: AuditSink + 'static,
{
    match service.next_stages(&EntityId(entity_id)) {
        Ok(stages) => (StatusCode::OK, Json(json!({ "next_stages": stages }))).into_response(),
        Err(error) => error_response(error),
    }
}
