//! Wire-level types shared by the stage services and the orchestrator.
//!
//! These travel as JSON bodies; the stage API wraps them in its own
//! request/response envelopes.

use serde::{Deserialize, Serialize};

use crate::types::{DetectionResult, DocumentFields, RecognitionResult};

/// One named regex rule for field extraction. The pattern's first capture
/// group becomes the field value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldRule {
    pub field: String,
    pub pattern: String,
}

/// Capability configuration passed alongside `load_model`.
///
/// Every field is optional; built-in backends fall back to their defaults,
/// mirroring how the original services treated the load body as a loose
/// config bag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model weights location, for backends that read files.
    pub weights_path: Option<String>,
    /// Companion config file (e.g. a graph definition).
    pub config_path: Option<String>,
    /// Detector confidence cutoff.
    pub confidence_threshold: Option<f32>,
    /// Recognition languages.
    #[serde(default)]
    pub languages: Vec<String>,
    /// Field extraction rules for rule-kind models.
    #[serde(default)]
    pub rules: Vec<FieldRule>,
}

/// Input to a stage `run` call. Which fields are required depends on the
/// stage role; the stage validates before touching the registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StagePayload {
    /// Path to the image artifact in the shared store.
    pub image_path: Option<String>,
    /// Detection output from the previous step, if any.
    pub detection: Option<DetectionResult>,
    /// Recognition output from the previous step (postprocess input).
    pub recognition: Option<RecognitionResult>,
}

/// Output of the preprocess step: the (possibly cleaned) artifact path plus
/// whatever structured boxes the model produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessOutput {
    pub output_path: String,
    pub detection: Option<DetectionResult>,
}

/// Typed stage output, tagged so the orchestrator can thread it into the
/// next step without guessing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageOutput {
    Preprocess(PreprocessOutput),
    Recognition(RecognitionResult),
    Fields(DocumentFields),
}
