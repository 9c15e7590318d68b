use std::time::Duration;

use serde::{Deserialize, Serialize};

use docpipe_core::StepName;

/// Base URLs of the three stage services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageEndpoints {
    pub preprocess: String,
    pub recognize: String,
    pub postprocess: String,
}

impl StageEndpoints {
    pub fn base_url(&self, step: StepName) -> &str {
        match step {
            StepName::Preprocess => &self.preprocess,
            StepName::Recognize => &self.recognize,
            StepName::Postprocess => &self.postprocess,
        }
    }
}

impl Default for StageEndpoints {
    /// Matches the compose deployment: one port per stage service.
    fn default() -> Self {
        Self {
            preprocess: "http://127.0.0.1:5000".to_string(),
            recognize: "http://127.0.0.1:5001".to_string(),
            postprocess: "http://127.0.0.1:5002".to_string(),
        }
    }
}

/// Orchestrator runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Per-attempt bound on a stage call. Five minutes by default — model
    /// loads and heavyweight inference are slow.
    pub step_timeout_secs: u64,
    /// Extra attempts after the first, for transport-class failures only.
    pub max_retries: u32,
    pub endpoints: StageEndpoints,
}

impl OrchestratorConfig {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            step_timeout_secs: 300,
            max_retries: 1,
            endpoints: StageEndpoints::default(),
        }
    }
}
