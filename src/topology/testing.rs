//! Mock collaborators shared by unit tests

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

use super::probe::{Directory, Prober, TargetDescriptor};
use super::{ProbeContext, ProbeCoordinator, TargetKind};
use crate::types::{Result, TopologyError};
use crate::worker::{PoolConfig, ProbePool};

/// Directory that knows a fixed set of keys
pub struct MapDirectory {
    known: HashSet<String>,
    pub reads: AtomicUsize,
}

impl MapDirectory {
    pub fn new<'a>(keys: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            known: keys.into_iter().map(str::to_string).collect(),
            reads: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl Directory for MapDirectory {
    async fn read(&self, kind: TargetKind, key: &str) -> Result<TargetDescriptor> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.known.contains(key) {
            Ok(TargetDescriptor {
                kind,
                key: key.to_string(),
                body: serde_json::json!({ "key": key }),
            })
        } else {
            Err(TopologyError::NotFound(key.to_string()))
        }
    }
}

/// What a [`GatedProber`] answers once released
#[derive(Clone, Copy)]
pub enum Answer {
    Reachable,
    Unreachable,
    Error,
    /// Fault inside the service rather than at the target
    Internal,
    Panic,
}

/// Prober that blocks every check until a permit is released
pub struct GatedProber {
    gate: Semaphore,
    answer: Mutex<Answer>,
    pub calls: AtomicUsize,
    pub domains: Mutex<Vec<Option<String>>>,
}

impl GatedProber {
    pub fn new(answer: Answer) -> Self {
        Self {
            gate: Semaphore::new(0),
            answer: Mutex::new(answer),
            calls: AtomicUsize::new(0),
            domains: Mutex::new(Vec::new()),
        }
    }

    /// Prober that never blocks
    pub fn open(answer: Answer) -> Self {
        let prober = Self::new(answer);
        prober.gate.add_permits(Semaphore::MAX_PERMITS / 2);
        prober
    }

    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub fn set_answer(&self, answer: Answer) {
        *self.answer.lock().unwrap() = answer;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Prober for GatedProber {
    async fn check(&self, descriptor: &TargetDescriptor) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.domains
            .lock()
            .unwrap()
            .push(ProbeContext::current().map(|c| c.domain));

        self.gate
            .acquire()
            .await
            .map_err(|_| TopologyError::Internal("gate closed".into()))?
            .forget();

        let answer = *self.answer.lock().unwrap();
        match answer {
            Answer::Reachable => Ok(true),
            Answer::Unreachable => Ok(false),
            Answer::Error => Err(TopologyError::Probe {
                target: descriptor.key.clone(),
                reason: "credentials rejected".into(),
            }),
            Answer::Internal => Err(TopologyError::Internal("credential store unavailable".into())),
            Answer::Panic => panic!("prober exploded"),
        }
    }
}

pub fn coordinator(directory: Arc<MapDirectory>, prober: Arc<GatedProber>) -> ProbeCoordinator {
    ProbeCoordinator::new(
        directory,
        prober,
        ProbePool::new(PoolConfig {
            worker_count: 2,
            max_queue_size: 64,
        }),
    )
}

/// Wait until the probe for `key` in `domain` has finished
pub async fn settle(coordinator: &ProbeCoordinator, domain: &str, kind: TargetKind, key: &str) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while coordinator.in_flight().contains(domain, kind, key) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("probe did not finish in time");
}
