//! Stage and orchestrator HTTP API tests, driven through the routers
//! directly with `tower::ServiceExt::oneshot`.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use docpipe_core::CapabilityKind;
use docpipe_models::{ModelCatalog, UnknownModelPolicy};
use docpipe_orchestrator::{
    HttpStageClient, OrchestratorConfig, PipelineOrchestrator, StageEndpoints,
};
use docpipe_server::api::{
    create_orchestrator_router, create_stage_router, OrchestratorState, StageState,
};
use docpipe_stage::{InferenceStage, StageRole};

fn postprocess_router() -> Router {
    let catalog = ModelCatalog::new(CapabilityKind::Rule, UnknownModelPolicy::Strict);
    let state = Arc::new(StageState {
        stage: InferenceStage::new(StageRole::Postprocess, Arc::new(catalog)),
        start_time: Instant::now(),
    });
    create_stage_router(state)
}

fn orchestrator_router() -> Router {
    let client = HttpStageClient::new(StageEndpoints::default()).unwrap();
    let state = Arc::new(OrchestratorState {
        orchestrator: Arc::new(PipelineOrchestrator::new(
            Arc::new(client),
            OrchestratorConfig::default(),
        )),
        start_time: Instant::now(),
    });
    create_orchestrator_router(state)
}

async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .expect("request builder should not fail"),
        )
        .await
        .expect("handler should respond");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("response body must be readable")
        .to_bytes();
    let value = serde_json::from_slice(bytes.as_ref()).expect("response must be valid JSON");
    (status, value)
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(uri)
                .body(Body::empty())
                .expect("request builder should not fail"),
        )
        .await
        .expect("handler should respond");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("response body must be readable")
        .to_bytes();
    let value = serde_json::from_slice(bytes.as_ref()).expect("response must be valid JSON");
    (status, value)
}

#[tokio::test]
async fn health_reports_service_and_loaded_models() {
    let app = postprocess_router();
    let (status, body) = get_json(app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "postprocessing");
    assert_eq!(body["loaded_models"], json!([]));
}

#[tokio::test]
async fn load_model_is_idempotent_over_http() {
    let app = postprocess_router();
    let body = json!({ "model_name": "invoice_fields_v1" });

    let (status, reply) = post_json(app.clone(), "/load_model", body.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["status"], "loaded");

    let (status, reply) = post_json(app.clone(), "/load_model", body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["status"], "already_loaded");

    let (_, health) = get_json(app, "/health").await;
    assert_eq!(health["loaded_models"], json!(["invoice_fields_v1"]));
}

#[tokio::test]
async fn unknown_model_name_is_rejected_with_400() {
    let app = postprocess_router();
    let (status, reply) =
        post_json(app, "/load_model", json!({ "model_name": "no_such_model" })).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(reply["error"].as_str().unwrap().contains("no_such_model"));
}

#[tokio::test]
async fn process_against_unloaded_model_is_400() {
    let app = postprocess_router();
    let (status, reply) = post_json(
        app,
        "/process",
        json!({
            "model_name": "invoice_fields_v1",
            "recognition": { "mode": "whole_image", "full_text": "x", "regions": [] }
        }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(reply["error"].as_str().unwrap().contains("not loaded"));
}

#[tokio::test]
async fn process_extracts_fields_and_predict_is_an_alias() {
    let app = postprocess_router();
    post_json(app.clone(), "/load_model", json!({ "model_name": "invoice_fields_v1" })).await;

    let body = json!({
        "model_name": "invoice_fields_v1",
        "recognition": {
            "mode": "whole_image",
            "full_text": "Invoice No: A-77 Total: 90.50",
            "regions": []
        }
    });

    for route in ["/process", "/predict"] {
        let (status, reply) = post_json(app.clone(), route, body.clone()).await;
        assert_eq!(status, StatusCode::OK, "route {route}");
        assert_eq!(reply["data"]["kind"], "fields");
        assert_eq!(reply["data"]["fields"]["invoice_number"], "A-77");
    }
}

#[tokio::test]
async fn unload_model_reports_outcome() {
    let app = postprocess_router();
    post_json(app.clone(), "/load_model", json!({ "model_name": "invoice_fields_v1" })).await;

    let body = json!({ "model_name": "invoice_fields_v1" });
    let (status, reply) = post_json(app.clone(), "/unload_model", body.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["status"], "unloaded");

    let (status, reply) = post_json(app, "/unload_model", body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["status"], "not_found");
}

#[tokio::test]
async fn trigger_without_artifact_is_accepted_then_fails_validation() {
    let app = orchestrator_router();

    let (status, reply) = post_json(app.clone(), "/runs", json!({})).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let run_id = reply["run_id"].as_str().unwrap().to_string();

    // The run fails in validation before any stage call, so it reaches a
    // terminal state without talking to the (absent) stage services.
    let run = loop {
        let (status, run) = get_json(app.clone(), &format!("/runs/{run_id}")).await;
        assert_eq!(status, StatusCode::OK);
        if run["state"]["state"] == "failed" || run["state"]["state"] == "succeeded" {
            break run;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    };

    assert_eq!(run["state"]["state"], "failed");
    assert!(run["state"]["step"].is_null());
    assert!(run["state"]["cause"]
        .as_str()
        .unwrap()
        .contains("artifact_reference"));
}

#[tokio::test]
async fn unknown_run_id_is_404() {
    let app = orchestrator_router();
    let (status, reply) =
        get_json(app, "/runs/00000000-0000-0000-0000-000000000000").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(reply["error"].as_str().unwrap().contains("unknown run id"));
}
