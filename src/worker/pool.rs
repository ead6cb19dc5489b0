//! Bounded background pool for probe tasks
//!
//! Fire-and-forget: `submit` never waits for a job to run and there is no return channel.
//! A fixed number of worker tasks pull jobs from one bounded queue. A job that panics is
//! contained and logged; its worker keeps serving the queue.

use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info};

use crate::types::{Result, TopologyError};

/// A unit of background work
pub type ProbeJob = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Configuration for the probe pool
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of worker tasks
    pub worker_count: usize,
    /// Maximum queued jobs
    pub max_queue_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            max_queue_size: 1000,
        }
    }
}

/// Counters shared between the pool handle and its workers
#[derive(Debug, Default)]
struct PoolCounters {
    busy: AtomicUsize,
    completed: AtomicU64,
    panicked: AtomicU64,
}

/// Snapshot of pool activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolMetrics {
    pub worker_count: usize,
    pub busy_workers: usize,
    pub queue_depth: usize,
    pub completed: u64,
    pub panicked: u64,
}

/// In-process pool that runs probe jobs off the request path.
///
/// Must be created inside a tokio runtime. Dropping the pool closes the queue; workers finish
/// the jobs already queued and exit.
pub struct ProbePool {
    job_tx: mpsc::Sender<ProbeJob>,
    counters: Arc<PoolCounters>,
    worker_count: usize,
}

impl ProbePool {
    /// Create and start a new pool
    pub fn new(config: PoolConfig) -> Self {
        let worker_count = config.worker_count.max(1);
        let (job_tx, job_rx) = mpsc::channel::<ProbeJob>(config.max_queue_size.max(1));
        let job_rx = Arc::new(Mutex::new(job_rx));
        let counters = Arc::new(PoolCounters::default());

        for i in 0..worker_count {
            let job_rx = Arc::clone(&job_rx);
            let counters = Arc::clone(&counters);
            tokio::spawn(async move {
                worker_task(i, job_rx, counters).await;
            });
        }

        info!(
            workers = worker_count,
            max_queue = config.max_queue_size,
            "Probe pool started"
        );

        Self {
            job_tx,
            counters,
            worker_count,
        }
    }

    /// Queue a job without waiting.
    ///
    /// On failure the job is dropped unrun, which drops everything it owns.
    pub fn submit<F>(&self, job: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.job_tx.try_send(Box::pin(job)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                TopologyError::Internal("Probe queue full".into())
            }
            mpsc::error::TrySendError::Closed(_) => {
                TopologyError::Internal("Probe pool closed".into())
            }
        })
    }

    /// Jobs waiting for a worker
    pub fn queue_depth(&self) -> usize {
        self.job_tx.max_capacity() - self.job_tx.capacity()
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn metrics(&self) -> PoolMetrics {
        PoolMetrics {
            worker_count: self.worker_count,
            busy_workers: self.counters.busy.load(Ordering::Relaxed),
            queue_depth: self.queue_depth(),
            completed: self.counters.completed.load(Ordering::Relaxed),
            panicked: self.counters.panicked.load(Ordering::Relaxed),
        }
    }
}

async fn worker_task(
    worker_id: usize,
    job_rx: Arc<Mutex<mpsc::Receiver<ProbeJob>>>,
    counters: Arc<PoolCounters>,
) {
    debug!("Probe worker {} started", worker_id);

    loop {
        let job = {
            let mut rx = job_rx.lock().await;
            match rx.recv().await {
                Some(job) => job,
                None => {
                    debug!("Probe worker {} shutting down (queue closed)", worker_id);
                    return;
                }
            }
        };

        counters.busy.fetch_add(1, Ordering::Relaxed);
        if AssertUnwindSafe(job).catch_unwind().await.is_err() {
            counters.panicked.fetch_add(1, Ordering::Relaxed);
            error!("Probe worker {} contained a panicking job", worker_id);
        }
        counters.busy.fetch_sub(1, Ordering::Relaxed);
        counters.completed.fetch_add(1, Ordering::Relaxed);
    }
}
