//! FireWatch Node (fwn-node) - Main entry point
//!
//! Edge monitoring node fusing environmental sensors, a camera feed, and an
//! on-device object detector into a fire-risk assessment, with escalation to
//! an external analysis service.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fwn_common::config::NodeConfig;
use fwn_common::events::EventBus;
use fwn_node::analysis::{AnalysisOrchestrator, LlmClient};
use fwn_node::api::{build_router, AppState};
use fwn_node::fusion::FusionEngine;
use fwn_node::hardware::{SimulatedCamera, SimulatedSensors};
use fwn_node::state::SharedState;
use fwn_node::vision::VisionDetector;

/// Command-line arguments for fwn-node
#[derive(Parser, Debug)]
#[command(name = "fwn-node")]
#[command(about = "FireWatch edge monitoring node")]
#[command(version)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "FWN_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides configuration)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fwn_node=debug,fwn_common=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config =
        NodeConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.server.port = port;
    }

    info!("Starting FireWatch node on port {}", config.server.port);

    // Shared snapshot + event bus
    let events = EventBus::new(100);
    let shared = Arc::new(SharedState::new(events.clone()));

    // Analysis orchestration
    let client = LlmClient::from_config(&config.analysis)
        .context("Failed to initialize analysis client")?;
    info!("Analysis client initialized (model: {})", client.model());
    let orchestrator = Arc::new(AnalysisOrchestrator::new(
        client,
        Arc::clone(&shared),
        events.clone(),
        &config,
    ));

    // Detector: decoding is built in, the inference runtime is pluggable.
    // No runtime ships in this build, so a configured model only logs.
    if let Some(path) = &config.vision.model_path {
        warn!(
            "Model configured at {} but no inference backend is available in this build; \
             detector disabled",
            path.display()
        );
    }
    let detector = VisionDetector::new(&config.vision, None);

    // Hardware sources; device-backed implementations plug in here
    let sensors = SimulatedSensors::new();
    let camera = SimulatedCamera::default();

    let engine = FusionEngine::new(
        sensors,
        camera,
        detector,
        Arc::clone(&orchestrator),
        Arc::clone(&shared),
        &config,
    );
    let engine_handle = engine.start();
    info!("Fusion engine running");

    let app = build_router(AppState {
        shared,
        orchestrator,
    });

    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    info!("Listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    engine_handle.stop().await;
    info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
