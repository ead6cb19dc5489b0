//! Topology status - live reachability for connectors and resources
//!
//! A topology view asks, per node, whether the backing connector or resource is reachable.
//! Checks arrive over a WebSocket push channel and are answered immediately from a shared
//! status cache; the actual probe runs in the background, at most once per target at a time.
//! Clients poll the batch endpoint until every node they drew has a completed check.
//!
//! ## Components
//!
//! - **Topology**: status cache, in-flight coalescing, probe coordinator, directory and prober
//! - **Channel**: inbound frame protocol, dispatcher, session correlation, channel registry
//! - **Worker**: bounded probe pool
//! - **Server**: hyper HTTP server with WebSocket upgrade

pub mod channel;
pub mod config;
pub mod logging;
pub mod routes;
pub mod server;
pub mod topology;
pub mod types;
pub mod worker;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{Result, TopologyError};
