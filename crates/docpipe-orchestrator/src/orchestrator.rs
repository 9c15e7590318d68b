use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use docpipe_core::{
    PipelineError, PipelineRun, PreprocessOutput, Result, RunState, StageOutput, StagePayload,
    StepName, StepStatus,
};

use crate::client::StageClient;
use crate::config::OrchestratorConfig;

/// What the external caller hands us to start a run.
///
/// Model names default to the stock catalog entries; the artifact reference
/// has no sane default and its absence fails the run before any step starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    #[serde(default)]
    pub artifact_reference: Option<String>,
    #[serde(default = "default_preprocess_model")]
    pub preprocess_model: String,
    #[serde(default = "default_recognition_model")]
    pub recognition_model: String,
    #[serde(default = "default_postprocess_model")]
    pub postprocess_model: String,
}

fn default_preprocess_model() -> String {
    "default_binarize".to_string()
}

fn default_recognition_model() -> String {
    "ocr_v1".to_string()
}

fn default_postprocess_model() -> String {
    "invoice_fields_v1".to_string()
}

impl TriggerConfig {
    /// Trigger for one artifact with the stock model names.
    pub fn for_artifact(artifact: impl Into<String>) -> Self {
        Self {
            artifact_reference: Some(artifact.into()),
            preprocess_model: default_preprocess_model(),
            recognition_model: default_recognition_model(),
            postprocess_model: default_postprocess_model(),
        }
    }

    pub fn model_for(&self, step: StepName) -> &str {
        match step {
            StepName::Preprocess => &self.preprocess_model,
            StepName::Recognize => &self.recognition_model,
            StepName::Postprocess => &self.postprocess_model,
        }
    }
}

/// Drives runs through the three-stage state machine.
///
/// Each run: per step, an idempotent `load_model` then a `process` call with
/// the previous step's output as input. Step calls are bounded by the
/// configured timeout; transport-class failures retry up to the configured
/// count; everything else fails the run on the spot. Steps are strictly
/// sequential within a run, runs are fully concurrent with each other.
pub struct PipelineOrchestrator {
    client: Arc<dyn StageClient>,
    config: OrchestratorConfig,
    runs: RwLock<HashMap<Uuid, PipelineRun>>,
}

impl PipelineOrchestrator {
    pub fn new(client: Arc<dyn StageClient>, config: OrchestratorConfig) -> Self {
        Self {
            client,
            config,
            runs: RwLock::new(HashMap::new()),
        }
    }

    /// Snapshot of a run for polling. `None` for ids we never issued.
    pub fn status(&self, id: Uuid) -> Option<PipelineRun> {
        self.runs.read().get(&id).cloned()
    }

    /// Start a run in the background and return its id immediately.
    pub fn spawn(self: &Arc<Self>, trigger: TriggerConfig) -> Uuid {
        let id = self.register();
        let orchestrator = self.clone();
        tokio::spawn(async move {
            orchestrator.drive(id, trigger).await;
        });
        id
    }

    /// Run to completion and return the terminal run record.
    pub async fn execute(&self, trigger: TriggerConfig) -> PipelineRun {
        let id = self.register();
        self.drive(id, trigger).await;
        self.status(id).expect("run registered above")
    }

    fn register(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.runs.write().insert(id, PipelineRun::new(id));
        id
    }

    fn update(&self, id: Uuid, apply: impl FnOnce(&mut PipelineRun)) {
        if let Some(run) = self.runs.write().get_mut(&id) {
            apply(run);
        }
    }

    fn fail(&self, id: Uuid, step: StepName, error: PipelineError) {
        tracing::warn!(run = %id, step = %step, error = %error, "run failed");
        self.update(id, |run| {
            let record = run.step_mut(step);
            record.status = StepStatus::Failed;
            record.error = Some(error.to_string());
            run.state = RunState::Failed {
                step: Some(step),
                cause: error.to_string(),
            };
        });
    }

    async fn drive(&self, id: Uuid, trigger: TriggerConfig) {
        // Trigger validation happens while the run is still Pending; no step
        // starts for an unusable trigger.
        let artifact = trigger
            .artifact_reference
            .as_deref()
            .filter(|a| !a.is_empty())
            .map(str::to_string);
        let Some(artifact) = artifact else {
            let cause = "missing 'artifact_reference' in trigger configuration".to_string();
            tracing::warn!(run = %id, "rejecting trigger: {cause}");
            self.update(id, |run| {
                run.state = RunState::Failed { step: None, cause };
            });
            return;
        };

        tracing::info!(run = %id, artifact = %artifact, "run started");

        let mut payload = StagePayload {
            image_path: Some(artifact),
            ..Default::default()
        };

        for step in StepName::ALL {
            let model = trigger.model_for(step);
            self.update(id, |run| {
                run.state = RunState::running(step);
                run.step_mut(step).status = StepStatus::Running;
            });

            if let Err(error) = self
                .with_retry(step, "load_model", || self.client.load_model(step, model))
                .await
            {
                self.fail(id, step, error);
                return;
            }

            let output = match self
                .with_retry(step, "process", || {
                    self.client.process(step, model, payload.clone())
                })
                .await
            {
                Ok(output) => output,
                Err(error) => {
                    self.fail(id, step, error);
                    return;
                }
            };

            let recorded = serde_json::to_value(&output).unwrap_or(serde_json::Value::Null);
            payload = match next_payload(step, output) {
                Ok(next) => next,
                Err(error) => {
                    self.fail(id, step, error);
                    return;
                }
            };

            self.update(id, |run| {
                let record = run.step_mut(step);
                record.status = StepStatus::Success;
                record.output = Some(recorded);
            });
            tracing::info!(run = %id, step = %step, model, "step complete");
        }

        self.update(id, |run| run.state = RunState::Succeeded);
        tracing::info!(run = %id, "run succeeded");
    }

    /// Bound one stage call by the step timeout; retry transport-class
    /// failures up to `max_retries` extra attempts, nothing else.
    async fn with_retry<T, Fut>(
        &self,
        step: StepName,
        op: &'static str,
        mut call: impl FnMut() -> Fut,
    ) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.config.max_retries + 1;
        for attempt in 1..=attempts {
            let outcome = tokio::time::timeout(self.config.step_timeout(), call()).await;
            let error = match outcome {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(error)) => error,
                Err(_) => PipelineError::Timeout(self.config.step_timeout()),
            };

            if error.is_retryable() && attempt < attempts {
                tracing::warn!(
                    step = %step,
                    op,
                    attempt,
                    error = %error,
                    "stage call failed, retrying"
                );
                continue;
            }
            return Err(error);
        }
        unreachable!("retry loop always returns")
    }
}

/// Thread step N's output into step N+1's input, verbatim.
fn next_payload(step: StepName, output: StageOutput) -> Result<StagePayload> {
    match (step, output) {
        (StepName::Preprocess, StageOutput::Preprocess(PreprocessOutput { output_path, detection })) => {
            Ok(StagePayload {
                image_path: Some(output_path),
                detection,
                recognition: None,
            })
        }
        (StepName::Recognize, StageOutput::Recognition(result)) => Ok(StagePayload {
            image_path: None,
            detection: None,
            recognition: Some(result),
        }),
        // Postprocess output is terminal; nothing consumes it downstream.
        (StepName::Postprocess, StageOutput::Fields(_)) => Ok(StagePayload::default()),
        (step, output) => Err(PipelineError::InferenceError(format!(
            "stage returned mismatched output for step {step}: {output:?}"
        ))),
    }
}
