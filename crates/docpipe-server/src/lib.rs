//! HTTP surface of the pipeline: stage services (one per pipeline step)
//! and the orchestrator trigger/poll API.

pub mod api;
pub mod cli;
