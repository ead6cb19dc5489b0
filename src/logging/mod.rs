//! Logging infrastructure
//!
//! Structured `tracing` output. `RUST_LOG` wins over the configured level.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when `RUST_LOG` is unset
pub fn default_filter(log_level: &str) -> String {
    format!("topology_status={},info", log_level)
}

/// Install the global subscriber. Call once, at startup.
pub fn init(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(log_level)));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
