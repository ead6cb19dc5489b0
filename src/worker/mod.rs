//! Worker module - background execution for probes

pub mod pool;

pub use pool::{PoolConfig, PoolMetrics, ProbeJob, ProbePool};
