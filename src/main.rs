//! Vigil sensor agent.
//!
//! Wires the interception pipeline together and drains its two dispatch
//! channels. Without a connected decision service the agent runs
//! standalone: authorization events are logged and resolved to Defer so
//! no intercepted operation ever hangs, and notifications are emitted as
//! JSON lines.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vigil_sensor::{
    ChannelDispatcher, Config, LocalScopeRegistry, MemoryCacheStore, Sensor, Verdict,
};

#[derive(Parser, Debug)]
#[command(name = "vigil-sensor")]
#[command(about = "Endpoint security sensor agent")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/vigil/sensor.yaml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Vigil sensor");

    let config = Config::load(&args.config).context("Failed to load configuration")?;
    info!(
        auth_timeout_ms = config.sensor.auth_timeout_ms,
        "Configuration loaded"
    );

    if !is_root() {
        warn!("Running without root privileges - kernel scopes may be unavailable");
    }

    let (dispatcher, mut auth_events, mut notify_events) = ChannelDispatcher::new(
        config.channels.auth_capacity,
        config.channels.notify_capacity,
    );
    let sensor = Arc::new(Sensor::new(
        &config.sensor,
        Arc::new(MemoryCacheStore::new()),
        Arc::new(dispatcher),
        Arc::new(LocalScopeRegistry::new()),
    ));

    sensor
        .start_interception()
        .context("Failed to register interception scopes")?;

    // Standalone drain: resolve every authorization to Defer so blocked
    // operations fall through to the OS default.
    let responder = Arc::clone(&sensor);
    tokio::spawn(async move {
        while let Some(event) = auth_events.recv().await {
            info!(identity = %event.identity, pid = event.process.pid, "authorization request");
            responder.post_verdict(event.identity, Verdict::Defer);
        }
    });

    tokio::spawn(async move {
        while let Some(event) = notify_events.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!("Failed to encode event: {}", e),
            }
        }
    });

    info!("Sensor running - press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;

    info!("Shutting down sensor");
    sensor.stop_interception();

    Ok(())
}

fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}
