//! fleet-router: category-addressed forwarding with health supervision.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use fleet_router::config::watcher::ConfigWatcher;
use fleet_router::config::{load_config, FleetConfig};
use fleet_router::lifecycle::signals::spawn_signal_handler;
use fleet_router::observability::{logging, metrics};
use fleet_router::{Fleet, Supervisor};

#[derive(Parser)]
#[command(name = "fleet-router", version, about = "Route requests across a supervised instance fleet")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Do not reload the instance set when the config file changes.
    #[arg(long)]
    no_watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => FleetConfig::default(),
    };

    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "fleet-router starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        instances = config.instances.len(),
        probe_interval_secs = config.health_check.interval_secs,
        forward_timeout_ms = config.timeouts.forward_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let traffic = TcpListener::bind(&config.listener.bind_address).await?;
    let admin = if config.admin.enabled {
        Some(TcpListener::bind(&config.admin.bind_address).await?)
    } else {
        None
    };

    let fleet = Arc::new(Fleet::from_config(config)?);
    let mut supervisor = Supervisor::new(fleet);
    supervisor.spawn_background();

    // Keep the watcher alive for the life of the process.
    let _watcher = match (&args.config, args.no_watch) {
        (Some(path), false) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            supervisor.spawn_reload_listener(updates);
            Some(watcher.run()?)
        }
        _ => None,
    };

    spawn_signal_handler(supervisor.shutdown().clone());
    supervisor.serve(traffic, admin).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
