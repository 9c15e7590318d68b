use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use docpipe_core::{ModelConfig, PipelineError, PipelineRun, StageOutput, StagePayload};
use docpipe_orchestrator::{PipelineOrchestrator, TriggerConfig};
use docpipe_stage::{InferenceStage, LoadOutcome, UnloadOutcome};

/// Shared state of one stage service.
pub struct StageState {
    pub stage: InferenceStage,
    pub start_time: Instant,
}

/// Shared state of the orchestrator service.
pub struct OrchestratorState {
    pub orchestrator: Arc<PipelineOrchestrator>,
    pub start_time: Instant,
}

/// POST /load_model request body: the model name plus its config, flat.
#[derive(Deserialize)]
pub struct LoadModelRequest {
    pub model_name: String,
    #[serde(flatten)]
    pub config: ModelConfig,
}

#[derive(Serialize)]
pub struct LoadModelResponse {
    pub status: &'static str,
    pub model_name: String,
}

/// POST /process request body: model name plus the stage payload, flat.
#[derive(Deserialize)]
pub struct ProcessRequest {
    pub model_name: String,
    #[serde(flatten)]
    pub payload: StagePayload,
}

#[derive(Serialize)]
pub struct ProcessResponse {
    pub status: &'static str,
    pub model_name: String,
    pub data: StageOutput,
}

#[derive(Deserialize)]
pub struct UnloadModelRequest {
    pub model_name: String,
}

#[derive(Serialize)]
pub struct UnloadModelResponse {
    pub status: &'static str,
    pub model_name: String,
}

/// GET /health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub uptime_secs: f64,
    pub loaded_models: Vec<String>,
}

#[derive(Serialize)]
pub struct TriggerResponse {
    pub run_id: Uuid,
}

/// Error response body.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn create_stage_router(state: Arc<StageState>) -> Router {
    Router::new()
        .route("/health", get(stage_health))
        .route("/load_model", post(load_model))
        .route("/process", post(process))
        // Compatibility alias kept for older callers of the recognition
        // service.
        .route("/predict", post(process))
        .route("/unload_model", post(unload_model))
        .with_state(state)
}

pub fn create_orchestrator_router(state: Arc<OrchestratorState>) -> Router {
    Router::new()
        .route("/health", get(orchestrator_health))
        .route("/runs", post(trigger_run))
        .route("/runs/{id}", get(run_status))
        .with_state(state)
}

/// GET /health — liveness plus which models are resident.
async fn stage_health(State(state): State<Arc<StageState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: state.stage.role().service_name(),
        uptime_secs: state.start_time.elapsed().as_secs_f64(),
        loaded_models: state.stage.registry().resident(),
    })
}

/// POST /load_model — idempotent: loading a resident model is a no-op.
async fn load_model(
    State(state): State<Arc<StageState>>,
    Json(req): Json<LoadModelRequest>,
) -> Result<Json<LoadModelResponse>, ApiError> {
    let outcome = state
        .stage
        .load_model(&req.model_name, &req.config)
        .map_err(pipeline_error)?;

    metrics::counter!("stage_model_loads_total").increment(1);

    Ok(Json(LoadModelResponse {
        status: match outcome {
            LoadOutcome::Loaded => "loaded",
            LoadOutcome::AlreadyLoaded => "already_loaded",
        },
        model_name: req.model_name,
    }))
}

/// POST /process — run one inference against a resident model.
async fn process(
    State(state): State<Arc<StageState>>,
    Json(req): Json<ProcessRequest>,
) -> Result<Json<ProcessResponse>, ApiError> {
    let started = Instant::now();
    let data = state
        .stage
        .run(&req.model_name, &req.payload)
        .map_err(pipeline_error)?;

    metrics::counter!("stage_requests_total").increment(1);
    metrics::histogram!("stage_latency_ms").record(started.elapsed().as_secs_f64() * 1000.0);

    Ok(Json(ProcessResponse {
        status: "success",
        model_name: req.model_name,
        data,
    }))
}

/// POST /unload_model — idempotent: absent names report `not_found`.
async fn unload_model(
    State(state): State<Arc<StageState>>,
    Json(req): Json<UnloadModelRequest>,
) -> Json<UnloadModelResponse> {
    let outcome = state.stage.unload_model(&req.model_name);
    Json(UnloadModelResponse {
        status: match outcome {
            UnloadOutcome::Unloaded => "unloaded",
            UnloadOutcome::NotFound => "not_found",
        },
        model_name: req.model_name,
    })
}

async fn orchestrator_health(State(state): State<Arc<OrchestratorState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "orchestrator",
        uptime_secs: state.start_time.elapsed().as_secs_f64(),
        loaded_models: vec![],
    })
}

/// POST /runs — start a run in the background, return its id for polling.
async fn trigger_run(
    State(state): State<Arc<OrchestratorState>>,
    Json(trigger): Json<TriggerConfig>,
) -> (StatusCode, Json<TriggerResponse>) {
    let run_id = state.orchestrator.spawn(trigger);
    metrics::counter!("pipeline_runs_total").increment(1);
    (StatusCode::ACCEPTED, Json(TriggerResponse { run_id }))
}

/// GET /runs/{id} — poll a run's state machine.
async fn run_status(
    State(state): State<Arc<OrchestratorState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<PipelineRun>, ApiError> {
    state
        .orchestrator
        .status(id)
        .map(Json)
        .ok_or_else(|| not_found(format!("unknown run id: {id}")))
}

/// Caller mistakes are 400s; everything else is on us.
fn pipeline_error(err: PipelineError) -> ApiError {
    match err {
        PipelineError::InvalidPayload(_)
        | PipelineError::ModelNotLoaded(_)
        | PipelineError::UnknownModel(_) => bad_request(err.to_string()),
        _ => internal_error(err.to_string()),
    }
}

fn bad_request(msg: String) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: msg }))
}

fn not_found(msg: String) -> ApiError {
    (StatusCode::NOT_FOUND, Json(ErrorResponse { error: msg }))
}

fn internal_error(msg: String) -> ApiError {
    tracing::error!(error = %msg, "internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse { error: msg }),
    )
}
