use crate::error::Result;
use crate::protocol::ModelConfig;
use crate::types::{CapabilityKind, DetectionResult, DocumentFields, RawImage, RecognitionResult, TextReading};

/// Detection-kind capability: optional page cleanup plus text block detection.
///
/// Implementations must be safe to call concurrently; the registry only
/// guarantees that inference never overlaps a load or unload of the same name.
pub trait DetectionModel: Send + Sync {
    /// Clean the page before detection. `None` means the input is already
    /// good enough and the original artifact path stays in circulation.
    fn clean(&self, image: &RawImage) -> Result<Option<RawImage>> {
        let _ = image;
        Ok(None)
    }

    /// Detect text blocks. `None` means this model produces no structured
    /// boxes (a clean-only preprocessor), which is distinct from an empty
    /// region list.
    fn detect(&self, image: &RawImage) -> Result<Option<DetectionResult>> {
        let _ = image;
        Ok(None)
    }

    /// Release hook, invoked once on unload.
    fn release(&self) {}
}

/// Recognition-kind capability: read text out of an image or crop.
pub trait RecognitionModel: Send + Sync {
    fn recognize(&self, image: &RawImage) -> Result<TextReading>;

    fn release(&self) {}
}

/// Rule-kind capability: pull structured fields out of recognized text.
pub trait RuleModel: Send + Sync {
    fn extract(&self, recognition: &RecognitionResult) -> Result<DocumentFields>;

    fn release(&self) {}
}

/// A loaded capability instance, tagged by kind.
///
/// `Skeleton` is the explicit replacement for the old "model_info dict
/// without an instance key" shape: a placeholder that the stage dispatches
/// on deliberately, never by accident.
pub enum ModelInstance {
    Detection(Box<dyn DetectionModel>),
    Recognition(Box<dyn RecognitionModel>),
    Rule(Box<dyn RuleModel>),
    Skeleton { kind: CapabilityKind },
}

impl ModelInstance {
    pub fn kind(&self) -> CapabilityKind {
        match self {
            ModelInstance::Detection(_) => CapabilityKind::Detection,
            ModelInstance::Recognition(_) => CapabilityKind::Recognition,
            ModelInstance::Rule(_) => CapabilityKind::Rule,
            ModelInstance::Skeleton { kind } => *kind,
        }
    }

    pub fn is_skeleton(&self) -> bool {
        matches!(self, ModelInstance::Skeleton { .. })
    }

    pub fn release(&self) {
        match self {
            ModelInstance::Detection(m) => m.release(),
            ModelInstance::Recognition(m) => m.release(),
            ModelInstance::Rule(m) => m.release(),
            ModelInstance::Skeleton { .. } => {}
        }
    }
}

impl std::fmt::Debug for ModelInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ModelInstance::{}", self.kind().as_str())
    }
}

/// Builds capability instances from model names and configuration.
///
/// The registry calls this exactly once per successful load; failures
/// propagate as `LoadError` and leave the name unresident.
pub trait ModelLoader: Send + Sync {
    fn build(&self, name: &str, config: &ModelConfig) -> Result<ModelInstance>;
}
