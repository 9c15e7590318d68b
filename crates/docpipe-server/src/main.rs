use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use clap::Parser;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use docpipe_models::{ModelCatalog, UnknownModelPolicy};
use docpipe_orchestrator::{HttpStageClient, OrchestratorConfig, PipelineOrchestrator, TriggerConfig};
use docpipe_stage::InferenceStage;

use docpipe_server::api;
use docpipe_server::cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();

    tracing::info!("docpipe v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Serve {
            role,
            host,
            port,
            allow_skeleton_models,
        } => {
            let policy = if allow_skeleton_models {
                UnknownModelPolicy::Skeleton
            } else {
                UnknownModelPolicy::Strict
            };
            let stage_role = role.stage_role();
            let catalog = ModelCatalog::new(stage_role.capability(), policy);
            let state = Arc::new(api::StageState {
                stage: InferenceStage::new(stage_role, Arc::new(catalog)),
                start_time: Instant::now(),
            });

            tracing::info!(service = stage_role.service_name(), "starting stage service");
            serve(
                api::create_stage_router(state),
                &host,
                port.unwrap_or_else(|| role.default_port()),
            )
            .await?;
        }
        Command::Orchestrate { host, port, config } => {
            let config = load_config(config.as_deref())?;
            let client = HttpStageClient::new(config.endpoints.clone())?;
            let state = Arc::new(api::OrchestratorState {
                orchestrator: Arc::new(PipelineOrchestrator::new(Arc::new(client), config)),
                start_time: Instant::now(),
            });

            tracing::info!("starting orchestrator service");
            serve(api::create_orchestrator_router(state), &host, port).await?;
        }
        Command::Run { artifact, config } => {
            let config = load_config(config.as_deref())?;
            let client = HttpStageClient::new(config.endpoints.clone())?;
            let orchestrator = PipelineOrchestrator::new(Arc::new(client), config);

            let run = orchestrator.execute(TriggerConfig::for_artifact(artifact)).await;

            println!("{}", serde_json::to_string_pretty(&run)?);
            if !matches!(run.state, docpipe_core::RunState::Succeeded) {
                anyhow::bail!("run did not succeed");
            }
        }
    }

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<OrchestratorConfig> {
    match path {
        Some(path) => {
            let data = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&data)?)
        }
        None => Ok(OrchestratorConfig::default()),
    }
}

async fn serve(router: Router, host: &str, port: u16) -> anyhow::Result<()> {
    // Initialize Prometheus metrics exporter.
    let metrics_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    metrics_builder
        .install_recorder()
        .expect("failed to install metrics recorder");

    let app = router
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive());

    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    tracing::info!(%addr, "starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
