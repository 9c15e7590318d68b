pub mod imageio;
pub mod region;
pub mod registry;
pub mod stage;

pub use region::RegionPipeline;
pub use registry::{LoadOutcome, ModelHandle, ModelRegistry, UnloadOutcome};
pub use stage::{InferenceStage, StageRole};
