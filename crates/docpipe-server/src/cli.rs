use std::path::PathBuf;

use clap::{Parser, Subcommand};

use docpipe_stage::StageRole;

#[derive(Parser)]
#[command(name = "docpipe", about = "Document pipeline — stage services and orchestrator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start one stage service.
    Serve {
        /// Which stage this process hosts.
        #[arg(long, value_enum)]
        role: Role,
        /// Host to bind to.
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        /// Port to bind to. Defaults to the stage's conventional port.
        #[arg(long)]
        port: Option<u16>,
        /// Accept unknown model names as inert pass-through models instead
        /// of rejecting them.
        #[arg(long)]
        allow_skeleton_models: bool,
    },
    /// Start the orchestrator service.
    Orchestrate {
        /// Host to bind to.
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        /// Port to bind to.
        #[arg(long, default_value = "5050")]
        port: u16,
        /// Path to orchestrator config file (JSON).
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Drive one document through already-running stage services and print
    /// the run record.
    Run {
        /// Artifact reference in the shared store.
        #[arg(required = true)]
        artifact: String,
        /// Path to orchestrator config file (JSON).
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum Role {
    Preprocess,
    Recognize,
    Postprocess,
}

impl Role {
    pub fn stage_role(&self) -> StageRole {
        match self {
            Role::Preprocess => StageRole::Preprocess,
            Role::Recognize => StageRole::Recognize,
            Role::Postprocess => StageRole::Postprocess,
        }
    }

    /// Conventional port for each stage, matching the compose deployment.
    pub fn default_port(&self) -> u16 {
        match self {
            Role::Preprocess => 5000,
            Role::Recognize => 5001,
            Role::Postprocess => 5002,
        }
    }
}
