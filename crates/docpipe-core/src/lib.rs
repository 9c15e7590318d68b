pub mod error;
pub mod protocol;
pub mod traits;
pub mod types;

pub use error::{PipelineError, Result};
pub use protocol::{FieldRule, ModelConfig, PreprocessOutput, StageOutput, StagePayload};
pub use traits::{DetectionModel, ModelInstance, ModelLoader, RecognitionModel, RuleModel};
pub use types::*;
