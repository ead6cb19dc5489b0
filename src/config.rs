//! Configuration for the topology status service
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

use crate::channel::SessionTracking;
use crate::worker::PoolConfig;

/// Live topology status service
///
/// Answers reachability checks for connectors and resources over a WebSocket push channel.
#[derive(Parser, Debug, Clone)]
#[command(name = "topology-status")]
#[command(about = "Live reachability status for connectors and resources")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,

    /// Base URL of the management backend REST API
    /// Targets are read from {BACKEND_URL}/connectors/{key} and {BACKEND_URL}/resources/{key}
    #[arg(long, env = "BACKEND_URL", default_value = "http://localhost:9080/api")]
    pub backend_url: String,

    /// Number of background probe workers
    #[arg(long, env = "PROBE_WORKERS", default_value = "4")]
    pub probe_workers: usize,

    /// Maximum queued probes before new ones are rejected
    #[arg(long, env = "PROBE_QUEUE_SIZE", default_value = "1000")]
    pub probe_queue_size: usize,

    /// Timeout for each backend call made by a probe, in milliseconds
    #[arg(long, env = "PROBE_TIMEOUT_MS", default_value = "30000")]
    pub probe_timeout_ms: u64,

    /// Session tracking modes in effect: "url", "cookie" or "url,cookie"
    #[arg(long, env = "SESSION_TRACKING", default_value = "cookie")]
    pub session_tracking: SessionTracking,

    /// Name of the session cookie
    #[arg(long, env = "SESSION_COOKIE_NAME", default_value = "SESSIONID")]
    pub session_cookie_name: String,

    /// Enable development mode (channels may attach without a session)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,
}

impl Args {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            worker_count: self.probe_workers,
            max_queue_size: self.probe_queue_size,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.probe_workers == 0 {
            return Err("PROBE_WORKERS must be at least 1".to_string());
        }

        if self.probe_queue_size == 0 {
            return Err("PROBE_QUEUE_SIZE must be at least 1".to_string());
        }

        if self.probe_timeout_ms == 0 {
            return Err("PROBE_TIMEOUT_MS must be greater than 0".to_string());
        }

        if self.session_cookie_name.trim().is_empty() {
            return Err("SESSION_COOKIE_NAME must not be empty".to_string());
        }

        if !(self.backend_url.starts_with("http://") || self.backend_url.starts_with("https://")) {
            return Err(format!("BACKEND_URL must be an http(s) URL: {}", self.backend_url));
        }

        Ok(())
    }
}
