use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Axis-aligned bounding box in pixel coordinates, corner form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Clamp the box to an image of the given dimensions.
    pub fn clamped(&self, width: u32, height: u32) -> BBox {
        let w = width as f32;
        let h = height as f32;
        BBox {
            x1: self.x1.clamp(0.0, w),
            y1: self.y1.clamp(0.0, h),
            x2: self.x2.clamp(0.0, w),
            y2: self.y2.clamp(0.0, h),
        }
    }
}

/// What a capability does, and which stage may host it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityKind {
    Detection,
    Recognition,
    Rule,
}

impl CapabilityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CapabilityKind::Detection => "detection",
            CapabilityKind::Recognition => "recognition",
            CapabilityKind::Rule => "rule",
        }
    }
}

/// One detected text block on a page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedRegion {
    pub bbox: BBox,
    /// Detector confidence in [0, 1].
    pub confidence: f32,
    pub label: String,
}

/// Output of the detection capability for one image.
///
/// Immutable after creation; the recognition stage consumes it to select
/// crop regions in this exact order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionResult {
    pub height: u32,
    pub width: u32,
    pub regions: Vec<DetectedRegion>,
}

/// A recognized span of text with its polygon outline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextRegion {
    pub polygon: Vec<(f32, f32)>,
    pub text: String,
    pub confidence: f32,
}

/// Recognition output for one detected region: the detection metadata plus
/// what the recognizer read inside the crop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionResult {
    /// Position in detection order.
    pub index: usize,
    pub bbox: BBox,
    pub detection_confidence: f32,
    pub text: String,
    pub sub_regions: Vec<TextRegion>,
}

/// What a recognition capability reads out of one image (or crop).
#[derive(Debug, Clone, Default)]
pub struct TextReading {
    pub text: String,
    pub regions: Vec<TextRegion>,
}

/// Recognition stage output.
///
/// `full_text` is always the space-joined text of `regions` in their stored
/// order; the constructors enforce this, so deserialized values from our own
/// stages uphold it too.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RecognitionResult {
    WholeImage {
        full_text: String,
        regions: Vec<TextRegion>,
    },
    Regions {
        full_text: String,
        regions: Vec<RegionResult>,
    },
}

impl RecognitionResult {
    pub fn whole_image(reading: TextReading) -> Self {
        RecognitionResult::WholeImage {
            full_text: reading.text,
            regions: reading.regions,
        }
    }

    pub fn from_regions(regions: Vec<RegionResult>) -> Self {
        let full_text = regions
            .iter()
            .map(|r| r.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        RecognitionResult::Regions { full_text, regions }
    }

    pub fn full_text(&self) -> &str {
        match self {
            RecognitionResult::WholeImage { full_text, .. } => full_text,
            RecognitionResult::Regions { full_text, .. } => full_text,
        }
    }
}

/// Structured fields pulled out of recognized text by a rule model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentFields {
    pub fields: std::collections::BTreeMap<String, String>,
}

/// Raw RGB image data (HWC, u8) at the capability trait boundary.
#[derive(Debug, Clone)]
pub struct RawImage {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub channels: u32,
}

/// The three pipeline steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    Preprocess,
    Recognize,
    Postprocess,
}

impl StepName {
    pub const ALL: [StepName; 3] = [
        StepName::Preprocess,
        StepName::Recognize,
        StepName::Postprocess,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepName::Preprocess => "preprocess",
            StepName::Recognize => "recognize",
            StepName::Postprocess => "postprocess",
        }
    }
}

impl std::fmt::Display for StepName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Success,
    Failed,
}

/// Per-step record inside a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step: StepName,
    pub status: StepStatus,
    /// Output artifact, verbatim what the next step received as input.
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl StepResult {
    pub fn pending(step: StepName) -> Self {
        Self {
            step,
            status: StepStatus::Pending,
            output: None,
            error: None,
        }
    }
}

/// Run state machine. `Failed` absorbs from any running state; a run that
/// never passed trigger validation fails with `step: None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Pending,
    PreprocessRunning,
    RecognizeRunning,
    PostprocessRunning,
    Succeeded,
    Failed {
        step: Option<StepName>,
        cause: String,
    },
}

impl RunState {
    pub fn running(step: StepName) -> Self {
        match step {
            StepName::Preprocess => RunState::PreprocessRunning,
            StepName::Recognize => RunState::RecognizeRunning,
            StepName::Postprocess => RunState::PostprocessRunning,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Failed { .. })
    }
}

/// One end-to-end execution of the three-stage pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub state: RunState,
    pub steps: Vec<StepResult>,
}

impl PipelineRun {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            state: RunState::Pending,
            steps: StepName::ALL.iter().map(|s| StepResult::pending(*s)).collect(),
        }
    }

    pub fn step_mut(&mut self, step: StepName) -> &mut StepResult {
        self.steps
            .iter_mut()
            .find(|s| s.step == step)
            .expect("run always holds all three steps")
    }
}
