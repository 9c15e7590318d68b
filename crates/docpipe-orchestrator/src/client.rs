use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use docpipe_core::{PipelineError, Result, StageOutput, StagePayload, StepName};

use crate::config::StageEndpoints;

/// Outcome of a stage `load_model` call, as reported over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Loaded,
    AlreadyLoaded,
}

/// Transport seam between the orchestrator and the stage services.
///
/// The orchestrator never talks HTTP directly; tests substitute scripted
/// clients here.
#[async_trait]
pub trait StageClient: Send + Sync {
    async fn load_model(&self, step: StepName, model: &str) -> Result<LoadStatus>;

    async fn process(&self, step: StepName, model: &str, payload: StagePayload)
        -> Result<StageOutput>;
}

#[derive(Serialize)]
struct LoadModelBody<'a> {
    model_name: &'a str,
}

#[derive(Deserialize)]
struct LoadModelReply {
    status: String,
}

#[derive(Serialize)]
struct ProcessBody<'a> {
    model_name: &'a str,
    #[serde(flatten)]
    payload: &'a StagePayload,
}

#[derive(Deserialize)]
struct ProcessReply {
    data: StageOutput,
}

#[derive(Deserialize, Default)]
struct ErrorReply {
    #[serde(default)]
    error: String,
}

/// JSON-over-HTTP client for the stage services.
pub struct HttpStageClient {
    http: reqwest::Client,
    endpoints: StageEndpoints,
}

impl HttpStageClient {
    pub fn new(endpoints: StageEndpoints) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| PipelineError::Transport(e.to_string()))?;
        Ok(Self { http, endpoints })
    }

    /// POST a JSON body; connection-level failures come back as retryable
    /// `Transport` errors, HTTP error replies as whatever `on_http_error`
    /// classifies them as.
    async fn post<T: DeserializeOwned>(
        &self,
        url: String,
        body: &impl Serialize,
        on_http_error: impl Fn(bool, String) -> PipelineError,
    ) -> Result<T> {
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| PipelineError::Transport(format!("{url}: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| PipelineError::Transport(format!("{url}: bad reply: {e}")));
        }

        let reply: ErrorReply = response.json().await.unwrap_or_default();
        let message = if reply.error.is_empty() {
            format!("{url}: HTTP {status}")
        } else {
            reply.error
        };
        Err(on_http_error(status.is_client_error(), message))
    }
}

#[async_trait]
impl StageClient for HttpStageClient {
    async fn load_model(&self, step: StepName, model: &str) -> Result<LoadStatus> {
        let url = format!("{}/load_model", self.endpoints.base_url(step));
        let reply: LoadModelReply = self
            .post(url, &LoadModelBody { model_name: model }, |_, msg| {
                // Any structured refusal to load is a load failure,
                // regardless of status class. Not retryable.
                PipelineError::LoadError(msg)
            })
            .await?;

        match reply.status.as_str() {
            "already_loaded" => Ok(LoadStatus::AlreadyLoaded),
            _ => Ok(LoadStatus::Loaded),
        }
    }

    async fn process(
        &self,
        step: StepName,
        model: &str,
        payload: StagePayload,
    ) -> Result<StageOutput> {
        let url = format!("{}/process", self.endpoints.base_url(step));
        let reply: ProcessReply = self
            .post(
                url,
                &ProcessBody {
                    model_name: model,
                    payload: &payload,
                },
                |client_error, msg| {
                    if client_error {
                        PipelineError::InvalidPayload(msg)
                    } else {
                        PipelineError::InferenceError(msg)
                    }
                },
            )
            .await?;
        Ok(reply.data)
    }
}
