//! Pondwatch - pond water-quality monitor
//!
//! Samples the pond probes, scores water quality, drives the aeration pump,
//! the indicator LEDs and the buzzer, escalates sustained critical conditions
//! to SMS recipients and uploads readings to a ThingSpeak-style channel.
//!
//! # Usage
//!
//! ```bash
//! # Run with simulated sensors (nominal pond)
//! cargo run --release
//!
//! # Reproduce an acidic pond
//! cargo run --release -- --simulate acidic
//!
//! # Print one classification report and exit
//! cargo run --release -- --once --simulate nutrient
//!
//! # Write the built-in defaults to a file for editing
//! cargo run --release -- --write-default-config pond_config.toml
//! ```
//!
//! # Environment Variables
//!
//! - `POND_CONFIG`: Path to the TOML configuration file
//! - `POND_SERVER_ADDR`: Status API bind address (default: `0.0.0.0:8080`)
//! - `POND_TELEMETRY_API_KEY`: Telemetry channel write key
//! - `POND_CORS_ORIGINS`: Comma-separated origins allowed to call the status API
//! - `RUST_LOG`: Log filter (default: `info`)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use pondwatch::api::{self, ApiState};
use pondwatch::config::PondConfig;
use pondwatch::hardware::simulated::{
    LoggingDisplay, LoggingHardware, LoggingNotifier, Scenario, SimulatedSensors,
};
use pondwatch::pipeline::{classify_once, Collaborators, Orchestrator};
use pondwatch::telemetry::{
    BackupQueue, Connectivity, SystemConnectivity, TelemetryUploader, ThingSpeakClient,
};
use pondwatch::types::{LoopName, SystemState};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "pondwatch")]
#[command(about = "Pond water-quality monitor")]
#[command(version)]
struct CliArgs {
    /// Path to a TOML configuration file (overrides the POND_CONFIG search)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Pond condition reproduced by the simulated sensors
    #[arg(long, value_enum, default_value_t = Scenario::Nominal)]
    simulate: Scenario,

    /// Write the built-in default configuration to PATH and exit
    #[arg(long, value_name = "PATH")]
    write_default_config: Option<PathBuf>,

    /// Fill the history once, print the classification as JSON and exit
    #[arg(long)]
    once: bool,

    /// Do not start the status API
    #[arg(long)]
    no_server: bool,
}

fn load_config(path: Option<&PathBuf>) -> PondConfig {
    let mut config = match path {
        Some(path) => match PondConfig::load_from_file(path) {
            Ok(config) => {
                info!(path = %path.display(), site = %config.site.name, "Loaded pond config");
                config
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load config, using defaults");
                PondConfig::default()
            }
        },
        None => PondConfig::load(),
    };

    if let Ok(addr) = std::env::var("POND_SERVER_ADDR") {
        if !addr.trim().is_empty() {
            config.server.addr = addr;
        }
    }
    config
}

/// Build the uploader, or `None` when telemetry is disabled or unkeyed.
fn build_telemetry(config: &PondConfig) -> Result<Option<TelemetryUploader>> {
    if !config.telemetry.enabled {
        info!("[Telemetry] Disabled in configuration");
        return Ok(None);
    }
    let Some(api_key) = config.telemetry.resolved_api_key() else {
        warn!("[Telemetry] No API key configured (set POND_TELEMETRY_API_KEY), uploads disabled");
        return Ok(None);
    };

    let backup = BackupQueue::open(
        &config.telemetry.backup_path,
        config.telemetry.backup_max_records,
    )
    .context("Failed to open telemetry backup queue")?;
    let client = ThingSpeakClient::new(
        &config.telemetry.endpoint,
        &api_key,
        config.telemetry.request_timeout(),
    )
    .context("Failed to build telemetry client")?;

    info!(
        endpoint = %client.endpoint(),
        backup = %backup.path().display(),
        "[Telemetry] Uploader configured"
    );
    Ok(Some(TelemetryUploader::new(
        Arc::new(client),
        Arc::new(SystemConnectivity::from_config(&config.network)),
        backup,
        &config.telemetry,
        &config.network,
    )))
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    if let Some(path) = &args.write_default_config {
        PondConfig::default()
            .save_to_file(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(path = %path.display(), "Default configuration written");
        return Ok(());
    }

    let config = Arc::new(load_config(args.config.as_ref()));

    if args.once {
        let mut sensors = SimulatedSensors::new(args.simulate);
        let status = classify_once(&config, &mut sensors).await;
        println!(
            "{}",
            serde_json::to_string_pretty(&status).context("Failed to serialize report")?
        );
        return Ok(());
    }

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  Pondwatch - pond water-quality monitor");
    info!("  Site: {}", config.site.name);
    info!("  Sensors: simulated ({})", args.simulate);
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let telemetry = build_telemetry(&config)?;

    let connectivity = SystemConnectivity::from_config(&config.network);
    if connectivity.probe().await {
        info!(target_addr = %config.network.probe_addr, "Network reachable");
    } else {
        warn!(target_addr = %config.network.probe_addr, "Network unreachable at startup, readings will queue");
    }

    // Graceful shutdown via Ctrl+C
    let cancel = CancellationToken::new();
    let shutdown_token = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    let state = SystemState::shared();
    let mut orchestrator = Orchestrator::new(Arc::clone(&config), Arc::clone(&state), cancel);

    if config.server.enabled && !args.no_server {
        let listener = tokio::net::TcpListener::bind(&config.server.addr)
            .await
            .with_context(|| format!("Failed to bind to {}", config.server.addr))?;
        let app = api::create_app(ApiState {
            state,
            config: Arc::clone(&config),
        });
        info!("Status API listening on http://{}/api/v1/status", config.server.addr);
        orchestrator.spawn_service(
            LoopName::HttpServer,
            api::serve(listener, app, orchestrator.cancel_token()),
        );
    }

    let collaborators = Collaborators {
        sensor: Box::new(SimulatedSensors::new(args.simulate)),
        hardware: Arc::new(LoggingHardware::new(config.hardware.clone())),
        display: Arc::new(LoggingDisplay::new()),
        notifier: Arc::new(LoggingNotifier::new(&config.hardware)),
        telemetry,
    };
    orchestrator.run(collaborators).await;

    info!("Pondwatch shutdown complete");
    Ok(())
}
