use std::path::Path;
use std::sync::Arc;

use docpipe_core::{
    CapabilityKind, DocumentFields, ModelConfig, ModelInstance, ModelLoader, PipelineError,
    PreprocessOutput, RecognitionResult, Result, StageOutput, StagePayload, TextReading,
};

use crate::imageio;
use crate::region::RegionPipeline;
use crate::registry::{LoadOutcome, ModelRegistry, UnloadOutcome};

/// Which of the three pipeline services this process is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageRole {
    Preprocess,
    Recognize,
    Postprocess,
}

impl StageRole {
    pub fn capability(&self) -> CapabilityKind {
        match self {
            StageRole::Preprocess => CapabilityKind::Detection,
            StageRole::Recognize => CapabilityKind::Recognition,
            StageRole::Postprocess => CapabilityKind::Rule,
        }
    }

    pub fn service_name(&self) -> &'static str {
        match self {
            StageRole::Preprocess => "preprocessing",
            StageRole::Recognize => "recognition",
            StageRole::Postprocess => "postprocessing",
        }
    }
}

/// One stage worker: a registry plus the typed `run` contract.
///
/// The stage validates the payload, checks residency, and dispatches on the
/// capability variant. It never retries — retry policy lives in the
/// orchestrator — and it never swallows an error.
pub struct InferenceStage {
    role: StageRole,
    registry: ModelRegistry,
}

impl InferenceStage {
    pub fn new(role: StageRole, loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            role,
            registry: ModelRegistry::new(loader),
        }
    }

    pub fn role(&self) -> StageRole {
        self.role
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn load_model(&self, name: &str, config: &ModelConfig) -> Result<LoadOutcome> {
        self.registry.load(name, config)
    }

    pub fn unload_model(&self, name: &str) -> UnloadOutcome {
        self.registry.unload(name)
    }

    pub fn run(&self, name: &str, payload: &StagePayload) -> Result<StageOutput> {
        match self.role {
            StageRole::Preprocess => self.run_preprocess(name, payload),
            StageRole::Recognize => self.run_recognize(name, payload),
            StageRole::Postprocess => self.run_postprocess(name, payload),
        }
    }

    fn run_preprocess(&self, name: &str, payload: &StagePayload) -> Result<StageOutput> {
        let image_path = require_image_path(payload)?;

        self.registry.process(name, |handle| {
            let model = match &handle.instance {
                ModelInstance::Detection(m) => m,
                ModelInstance::Skeleton { .. } => {
                    // Skeleton preprocess: pass the artifact through untouched.
                    return Ok(StageOutput::Preprocess(PreprocessOutput {
                        output_path: image_path.to_string(),
                        detection: None,
                    }));
                }
                other => return Err(kind_mismatch(name, other, self.role)),
            };

            let input = Path::new(image_path);
            let image = imageio::load_rgb(input)?;

            let (work_image, output_path) = match model.clean(&image)? {
                Some(cleaned) => {
                    let path = imageio::cleaned_path(input);
                    imageio::save_png(&path, &cleaned)?;
                    tracing::debug!(output = %path.display(), "wrote cleaned page");
                    (cleaned, path.to_string_lossy().into_owned())
                }
                None => (image, image_path.to_string()),
            };

            let detection = model.detect(&work_image)?;
            Ok(StageOutput::Preprocess(PreprocessOutput {
                output_path,
                detection,
            }))
        })
    }

    fn run_recognize(&self, name: &str, payload: &StagePayload) -> Result<StageOutput> {
        let image_path = require_image_path(payload)?;

        self.registry.process(name, |handle| {
            let model = match &handle.instance {
                ModelInstance::Recognition(m) => m,
                ModelInstance::Skeleton { .. } => {
                    return Ok(StageOutput::Recognition(RecognitionResult::whole_image(
                        TextReading::default(),
                    )));
                }
                other => return Err(kind_mismatch(name, other, self.role)),
            };

            let image = imageio::load_rgb(Path::new(image_path))?;
            let result =
                RegionPipeline::new(model.as_ref()).recognize(&image, payload.detection.as_ref())?;
            Ok(StageOutput::Recognition(result))
        })
    }

    fn run_postprocess(&self, name: &str, payload: &StagePayload) -> Result<StageOutput> {
        let recognition = payload.recognition.as_ref().ok_or_else(|| {
            PipelineError::InvalidPayload("missing 'recognition' field".to_string())
        })?;

        self.registry.process(name, |handle| {
            let model = match &handle.instance {
                ModelInstance::Rule(m) => m,
                ModelInstance::Skeleton { .. } => {
                    return Ok(StageOutput::Fields(DocumentFields::default()));
                }
                other => return Err(kind_mismatch(name, other, self.role)),
            };

            let fields = model.extract(recognition)?;
            Ok(StageOutput::Fields(fields))
        })
    }
}

fn require_image_path(payload: &StagePayload) -> Result<&str> {
    payload
        .image_path
        .as_deref()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| PipelineError::InvalidPayload("missing 'image_path' field".to_string()))
}

fn kind_mismatch(name: &str, instance: &ModelInstance, role: StageRole) -> PipelineError {
    PipelineError::InvalidPayload(format!(
        "model {name} is a {} model but the {} stage hosts {} models",
        instance.kind().as_str(),
        role.service_name(),
        role.capability().as_str()
    ))
}
