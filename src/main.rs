//! Topology status service

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

use topology_status::{config::Args, logging, server, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    logging::init(&args.log_level, args.log_json);

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Topology Status Service");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("Backend: {}", args.backend_url);
    info!(
        "Probe pool: {} worker(s), queue {}",
        args.probe_workers, args.probe_queue_size
    );
    info!("Probe timeout: {}ms", args.probe_timeout_ms);
    info!(
        "Session tracking: {} (cookie {})",
        args.session_tracking, args.session_cookie_name
    );
    info!("======================================");

    let state = Arc::new(AppState::new(args)?);
    server::run(state).await?;

    Ok(())
}
