//! Orchestrator state-machine tests against a scripted stage client:
//! output threading between steps, retry and timeout behavior, and
//! trigger validation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use docpipe_core::{
    BBox, DetectedRegion, DetectionResult, DocumentFields, PipelineError, PreprocessOutput,
    RecognitionResult, RegionResult, Result, RunState, StageOutput, StagePayload, StepName,
    StepStatus,
};
use docpipe_orchestrator::{
    LoadStatus, OrchestratorConfig, PipelineOrchestrator, StageClient, TriggerConfig,
};

/// Scripted stage client. Records every call; individual steps can be told
/// to fail with a transport error N times, sleep, reject the payload, or
/// refuse the load.
#[derive(Default)]
struct MockClient {
    loads: Mutex<Vec<(StepName, String)>>,
    processes: Mutex<Vec<(StepName, StagePayload)>>,
    transport_failures: Mutex<HashMap<StepName, u32>>,
    delay: Mutex<HashMap<StepName, Duration>>,
    invalid_at: Mutex<Option<StepName>>,
    load_fail_at: Mutex<Option<StepName>>,
}

impl MockClient {
    fn fail_transport(&self, step: StepName, times: u32) {
        self.transport_failures.lock().insert(step, times);
    }

    fn delay(&self, step: StepName, by: Duration) {
        self.delay.lock().insert(step, by);
    }

    fn reject_payload_at(&self, step: StepName) {
        *self.invalid_at.lock() = Some(step);
    }

    fn fail_load_at(&self, step: StepName) {
        *self.load_fail_at.lock() = Some(step);
    }

    fn process_count(&self, step: StepName) -> usize {
        self.processes.lock().iter().filter(|(s, _)| *s == step).count()
    }

    fn payload_for(&self, step: StepName) -> StagePayload {
        self.processes
            .lock()
            .iter()
            .find(|(s, _)| *s == step)
            .map(|(_, p)| p.clone())
            .expect("step was called")
    }
}

#[async_trait]
impl StageClient for MockClient {
    async fn load_model(&self, step: StepName, model: &str) -> Result<LoadStatus> {
        self.loads.lock().push((step, model.to_string()));
        if *self.load_fail_at.lock() == Some(step) {
            return Err(PipelineError::LoadError(format!(
                "weights for {model} unavailable"
            )));
        }
        Ok(LoadStatus::Loaded)
    }

    async fn process(
        &self,
        step: StepName,
        _model: &str,
        payload: StagePayload,
    ) -> Result<StageOutput> {
        self.processes.lock().push((step, payload.clone()));

        let delay = self.delay.lock().get(&step).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let remaining = {
            let mut failures = self.transport_failures.lock();
            match failures.get_mut(&step) {
                Some(n) if *n > 0 => {
                    *n -= 1;
                    true
                }
                _ => false,
            }
        };
        if remaining {
            return Err(PipelineError::Transport("connection refused".to_string()));
        }

        if *self.invalid_at.lock() == Some(step) {
            return Err(PipelineError::InvalidPayload("missing image_path".to_string()));
        }

        Ok(match step {
            StepName::Preprocess => {
                let input = payload.image_path.expect("preprocess gets an image path");
                StageOutput::Preprocess(PreprocessOutput {
                    output_path: format!("{input}.clean.png"),
                    detection: Some(DetectionResult {
                        height: 40,
                        width: 100,
                        regions: vec![
                            DetectedRegion {
                                bbox: BBox::new(0.0, 0.0, 30.0, 20.0),
                                confidence: 0.9,
                                label: "text".to_string(),
                            },
                            DetectedRegion {
                                bbox: BBox::new(35.0, 0.0, 70.0, 20.0),
                                confidence: 0.8,
                                label: "text".to_string(),
                            },
                        ],
                    }),
                })
            }
            StepName::Recognize => {
                let detection = payload.detection.expect("recognize gets detection boxes");
                let regions = detection
                    .regions
                    .iter()
                    .enumerate()
                    .map(|(index, region)| RegionResult {
                        index,
                        bbox: region.bbox,
                        detection_confidence: region.confidence,
                        text: if index == 0 { "AAA" } else { "BBB" }.to_string(),
                        sub_regions: vec![],
                    })
                    .collect();
                StageOutput::Recognition(RecognitionResult::from_regions(regions))
            }
            StepName::Postprocess => {
                let recognition = payload.recognition.expect("postprocess gets recognition");
                let mut fields = DocumentFields::default();
                fields
                    .fields
                    .insert("full_text".to_string(), recognition.full_text().to_string());
                StageOutput::Fields(fields)
            }
        })
    }
}

fn orchestrator(client: Arc<MockClient>) -> PipelineOrchestrator {
    PipelineOrchestrator::new(client, OrchestratorConfig::default())
}

fn trigger() -> TriggerConfig {
    serde_json::from_str(r#"{"artifact_reference": "/data/inv1.jpg"}"#).unwrap()
}

#[tokio::test]
async fn successful_run_threads_each_output_into_the_next_step() {
    let client = Arc::new(MockClient::default());
    let run = orchestrator(client.clone()).execute(trigger()).await;

    assert_eq!(run.state, RunState::Succeeded);
    assert!(run.steps.iter().all(|s| s.status == StepStatus::Success));

    // One idempotent load per step, default model names from the trigger.
    let loads = client.loads.lock().clone();
    assert_eq!(
        loads,
        vec![
            (StepName::Preprocess, "default_binarize".to_string()),
            (StepName::Recognize, "ocr_v1".to_string()),
            (StepName::Postprocess, "invoice_fields_v1".to_string()),
        ]
    );

    // Recognize sees the cleaned artifact and the detection boxes.
    let recognize_in = client.payload_for(StepName::Recognize);
    assert_eq!(recognize_in.image_path.as_deref(), Some("/data/inv1.jpg.clean.png"));
    assert_eq!(recognize_in.detection.unwrap().regions.len(), 2);

    // Postprocess sees the aggregated text in detection order.
    let post_in = client.payload_for(StepName::Postprocess);
    assert_eq!(post_in.recognition.unwrap().full_text(), "AAA BBB");

    // The recorded step output is exactly what the next step received.
    let recorded = run.steps[0].output.as_ref().unwrap();
    assert_eq!(recorded["output_path"], "/data/inv1.jpg.clean.png");
}

#[tokio::test]
async fn transient_transport_failure_is_retried_and_recovers() {
    let client = Arc::new(MockClient::default());
    client.fail_transport(StepName::Recognize, 1);

    let run = orchestrator(client.clone()).execute(trigger()).await;

    assert_eq!(run.state, RunState::Succeeded);
    assert_eq!(client.process_count(StepName::Recognize), 2);
}

#[tokio::test]
async fn persistent_transport_failure_exhausts_retries_and_fails_the_run() {
    let client = Arc::new(MockClient::default());
    client.fail_transport(StepName::Recognize, 10);

    let run = orchestrator(client.clone()).execute(trigger()).await;

    match &run.state {
        RunState::Failed { step, cause } => {
            assert_eq!(*step, Some(StepName::Recognize));
            assert!(cause.contains("transport"), "cause: {cause}");
        }
        other => panic!("expected failed run, got {other:?}"),
    }

    // One retry on top of the first attempt, then give up.
    assert_eq!(client.process_count(StepName::Recognize), 2);
    // The downstream step never starts.
    assert_eq!(client.process_count(StepName::Postprocess), 0);

    assert_eq!(run.steps[0].status, StepStatus::Success);
    assert_eq!(run.steps[1].status, StepStatus::Failed);
    assert_eq!(run.steps[2].status, StepStatus::Pending);
}

#[tokio::test(start_paused = true)]
async fn slow_stage_call_times_out_and_the_timeout_is_retried() {
    let client = Arc::new(MockClient::default());
    // Longer than the 300s step timeout, so every attempt times out.
    client.delay(StepName::Recognize, Duration::from_secs(400));

    let run = orchestrator(client.clone()).execute(trigger()).await;

    match &run.state {
        RunState::Failed { step, cause } => {
            assert_eq!(*step, Some(StepName::Recognize));
            assert!(cause.contains("timed out"), "cause: {cause}");
        }
        other => panic!("expected failed run, got {other:?}"),
    }
    // Timeouts count as retryable: first attempt plus one retry.
    assert_eq!(client.process_count(StepName::Recognize), 2);
}

#[tokio::test]
async fn invalid_payload_is_not_retried() {
    let client = Arc::new(MockClient::default());
    client.reject_payload_at(StepName::Preprocess);

    let run = orchestrator(client.clone()).execute(trigger()).await;

    match &run.state {
        RunState::Failed { step, .. } => assert_eq!(*step, Some(StepName::Preprocess)),
        other => panic!("expected failed run, got {other:?}"),
    }
    assert_eq!(client.process_count(StepName::Preprocess), 1);
}

#[tokio::test]
async fn missing_artifact_fails_before_any_stage_call() {
    let client = Arc::new(MockClient::default());
    let run = orchestrator(client.clone())
        .execute(serde_json::from_str("{}").unwrap())
        .await;

    match &run.state {
        RunState::Failed { step, cause } => {
            assert_eq!(*step, None);
            assert!(cause.contains("artifact_reference"), "cause: {cause}");
        }
        other => panic!("expected failed run, got {other:?}"),
    }
    assert!(client.loads.lock().is_empty());
    assert!(client.processes.lock().is_empty());
    assert!(run.steps.iter().all(|s| s.status == StepStatus::Pending));
}

#[tokio::test]
async fn load_failure_fails_the_step_without_calling_process() {
    let client = Arc::new(MockClient::default());
    client.fail_load_at(StepName::Recognize);

    let run = orchestrator(client.clone()).execute(trigger()).await;

    match &run.state {
        RunState::Failed { step, cause } => {
            assert_eq!(*step, Some(StepName::Recognize));
            assert!(cause.contains("load failed"), "cause: {cause}");
        }
        other => panic!("expected failed run, got {other:?}"),
    }
    assert_eq!(client.process_count(StepName::Recognize), 0);
}

#[tokio::test]
async fn spawned_run_is_pollable_until_terminal() {
    let client = Arc::new(MockClient::default());
    let orchestrator = Arc::new(orchestrator(client));

    let id = orchestrator.spawn(trigger());
    assert!(orchestrator.status(id).is_some());

    let run = loop {
        let run = orchestrator.status(id).unwrap();
        if run.state.is_terminal() {
            break run;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    };
    assert_eq!(run.state, RunState::Succeeded);

    // Unknown ids stay unknown.
    assert!(orchestrator.status(uuid::Uuid::new_v4()).is_none());
}
