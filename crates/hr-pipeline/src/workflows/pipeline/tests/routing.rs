use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use super::common::{build_request_service, build_response_service, read_json_body, seed};
use crate::workflows::kanban::kanban_router;
use crate::workflows::pipeline::pipeline_router;

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

#[tokio::test]
async fn create_returns_entity_at_entry_stage() {
    let (service, _repository, _audit) = build_request_service();
    let app = pipeline_router("/api/v1/requests", Arc::new(service));

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/v1/requests",
            json!({ "title": "Rust backend engineer" }),
        ))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = read_json_body(response).await;
    assert_eq!(body["status"], "new");
    assert_eq!(body["high_water_mark"], 0);
    assert_eq!(body["fields"]["title"], "Rust backend engineer");
}

#[tokio::test]
async fn create_refuses_caller_supplied_stage() {
    let (service, _repository, audit) = build_response_service();
    let app = pipeline_router("/api/v1/responses", Arc::new(service));

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/v1/responses",
            json!({ "stage": "on_project" }),
        ))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(audit.events().is_empty());
}

#[tokio::test]
async fn patch_applies_allowed_transition() {
    let (service, repository, _audit) = build_request_service();
    seed(&repository, "request-000001", Some("new"), Some(0));
    let app = pipeline_router("/api/v1/requests", Arc::new(service));

    let response = app
        .oneshot(json_request(
            "PATCH",
            "/api/v1/requests/request-000001",
            json!({ "status": "cv_search", "owner": "recruiting" }),
        ))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::OK);

    let body = read_json_body(response).await;
    assert_eq!(body["status"], "cv_search");
    assert_eq!(body["high_water_mark"], 1);
    assert_eq!(body["fields"]["owner"], "recruiting");
}

#[tokio::test]
async fn patch_reports_rejection_reason_as_conflict() {
    let (service, repository, _audit) = build_request_service();
    seed(&repository, "request-000002", Some("cv_search"), Some(1));
    let app = pipeline_router("/api/v1/requests", Arc::new(service));

    let response = app
        .oneshot(json_request(
            "PATCH",
            "/api/v1/requests/request-000002",
            json!({ "status": "client_review" }),
        ))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let body = read_json_body(response).await;
    assert_eq!(body["error"], "transition not permitted by pipeline graph");
    assert_eq!(body["from"], "cv_search");
    assert_eq!(body["to"], "client_review");
}

#[tokio::test]
async fn patch_rejects_unknown_stage_key() {
    let (service, repository, _audit) = build_response_service();
    seed(&repository, "response-000001", Some("cv_sent"), Some(2));
    let app = pipeline_router("/api/v1/responses", Arc::new(service));

    let response = app
        .oneshot(json_request(
            "PATCH",
            "/api/v1/responses/response-000001",
            json!({ "stage": "hired" }),
        ))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = read_json_body(response).await;
    assert_eq!(body["error"], "unknown stage 'hired'");
}

#[tokio::test]
async fn unknown_entity_returns_not_found() {
    let (service, _repository, _audit) = build_request_service();
    let app = pipeline_router("/api/v1/requests", Arc::new(service));

    let response = app
        .oneshot(empty_request("GET", "/api/v1/requests/request-404404"))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn next_lists_reachable_stages() {
    let (service, repository, _audit) = build_response_service();
    seed(&repository, "response-000003", Some("interview_3"), Some(8));
    let app = pipeline_router("/api/v1/responses", Arc::new(service));

    let response = app
        .oneshot(empty_request("GET", "/api/v1/responses/response-000003/next"))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::OK);

    let body = read_json_body(response).await;
    assert_eq!(
        body["next_stages"],
        json!(["wait_decision", "cancelled_by_us", "rejected"])
    );
}

#[tokio::test]
async fn delete_returns_no_content() {
    let (service, repository, _audit) = build_request_service();
    seed(&repository, "request-000005", Some("precheck"), Some(5));
    let app = pipeline_router("/api/v1/requests", Arc::new(service));

    let response = app
        .clone()
        .oneshot(empty_request("DELETE", "/api/v1/requests/request-000005"))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let again = app
        .oneshot(empty_request("DELETE", "/api/v1/requests/request-000005"))
        .await
        .expect("router responds");
    assert_eq!(again.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn kanban_filters_by_request() {
    let (service, repository, _audit) = build_response_service();
    let service = Arc::new(service);
    let first = service
        .create(
            [("request_id".to_string(), Value::from("request-000001"))]
                .into_iter()
                .collect(),
        )
        .expect("create response");
    service
        .create(
            [("request_id".to_string(), Value::from("request-000002"))]
                .into_iter()
                .collect(),
        )
        .expect("create response");
    seed(&repository, "response-000099", Some("rejected"), Some(3));

    let app: Router = kanban_router(service);
    let response = app
        .oneshot(empty_request(
            "GET",
            "/api/v1/kanban?request_id=request-000001",
        ))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::OK);

    let body = read_json_body(response).await;
    let columns = body["columns"].as_array().expect("columns array");
    assert_eq!(columns.len(), 12);
    assert_eq!(columns[0]["stage"], "cv_selected");

    let cards = columns[0]["cards"].as_array().expect("cards array");
    assert_eq!(cards.len(), 1);
    assert_eq!(cards[0]["id"], first.id.0.as_str());
    assert_eq!(cards[0]["allowed_stages"][0], "cv_sent");

    let total: usize = columns
        .iter()
        .map(|column| column["cards"].as_array().map_or(0, Vec::len))
        .sum();
    assert_eq!(total, 1);
}

#[tokio::test]
async fn patch_requires_exact_stage_key() {
    let (service, repository, audit) = build_request_service();
    seed(&repository, "request-000006", Some("new"), Some(0));
    let app = pipeline_router("/api/v1/requests", Arc::new(service));

    let response = app
        .oneshot(json_request(
            "PATCH",
            "/api/v1/requests/request-000006",
            json!({ "status": " cv_search" }),
        ))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(audit.events().is_empty());
}
