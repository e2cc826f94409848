//! Rescuer Alarm (rescuer-alarm) - Main entry point
//!
//! Runs the emergency monitoring service and its HTTP/SSE control surface.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rescuer_common::config::{CompiledDefaults, ConfigResolver};
use rescuer_common::EventStream;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rescuer_alarm::api::{self, AppContext};
use rescuer_alarm::platform::HostPlatform;
use rescuer_alarm::{AlarmConfig, SessionController};

/// Command-line arguments for rescuer-alarm
#[derive(Parser, Debug)]
#[command(name = "rescuer-alarm")]
#[command(about = "Emergency monitoring and alarm service for rescue operators")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "RESCUER_PORT")]
    port: Option<u16>,

    /// Config file (overrides RESCUER_CONFIG and the default locations)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Alert sound file
    #[arg(long, env = "RESCUER_ALERT_SOUND")]
    alert_sound: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config is loaded before tracing so the file can set the log level
    let toml_config = ConfigResolver::new(args.config.clone())
        .load()
        .context("Failed to load configuration")?;
    let config = AlarmConfig::resolve(
        args.port,
        args.alert_sound.clone(),
        toml_config,
        CompiledDefaults::for_current_platform(),
    )
    .context("Invalid configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new(&config.log_level))
                .unwrap_or_else(|_| "rescuer_alarm=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Rescuer Alarm on port {}", config.port);
    info!("Alert sound: {}", config.alert_sound.display());

    let host = HostPlatform::new(&config);
    let events = Arc::new(EventStream::new(config.event_buffer));
    let controller = Arc::new(SessionController::new(
        host.platform(),
        events,
        config.coordinator_settings(),
    ));

    if let Err(e) = controller.initialize() {
        // The UI retries initialize; the server still starts
        warn!("Initialization failed: {}", e);
    }

    let ctx = AppContext {
        controller: Arc::clone(&controller),
        notifier: Arc::clone(host.notifier()),
        feed: host.feed().clone(),
        port: config.port,
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    api::serve(listener, ctx, shutdown_signal())
        .await
        .context("Server error")?;

    // Already done on the signal; covers a server that exited on its own
    controller
        .stop_monitoring()
        .await
        .context("Failed to stop monitoring")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
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
