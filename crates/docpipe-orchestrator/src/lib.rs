//! Pipeline orchestration: drives documents through the preprocess,
//! recognize, and postprocess stage services in order, with per-step
//! timeouts and bounded retries for transport failures.

pub mod client;
pub mod config;
pub mod orchestrator;

pub use client::{HttpStageClient, LoadStatus, StageClient};
pub use config::{OrchestratorConfig, StageEndpoints};
pub use orchestrator::{PipelineOrchestrator, TriggerConfig};
