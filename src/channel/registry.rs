//! Live push connections indexed by session and page
//!
//! One connection per `(session, page)`. A reconnect from the same page replaces the previous
//! connection, which is told to close. Other pages of the same session (browser tabs) keep their
//! own connections. A connection that names no page never supersedes anything.

use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::debug;
use uuid::Uuid;

/// Registry key: owning session plus the page the connection serves
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelKey {
    pub session: String,
    pub page: String,
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.session, self.page)
    }
}

/// Entry for one attached connection
struct ChannelEntry {
    id: Uuid,
    /// Fired when a newer connection takes this key
    close_tx: oneshot::Sender<()>,
    connected_at: Instant,
}

/// Registration handed back to the connection task
pub struct ChannelHandle {
    pub key: ChannelKey,
    pub id: Uuid,
    /// Resolves when this connection has been superseded
    pub superseded: oneshot::Receiver<()>,
}

#[derive(Default)]
pub struct ChannelRegistry {
    channels: DashMap<ChannelKey, ChannelEntry>,
    replaced: AtomicU64,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for `session`, superseding an earlier one from the same page
    pub fn attach(&self, session: &str, page: Option<&str>) -> ChannelHandle {
        let (close_tx, superseded) = oneshot::channel();
        let id = Uuid::new_v4();
        let key = ChannelKey {
            session: session.to_string(),
            page: page.map_or_else(|| format!("conn-{id}"), str::to_string),
        };
        let entry = ChannelEntry {
            id,
            close_tx,
            connected_at: Instant::now(),
        };

        if let Some(previous) = self.channels.insert(key.clone(), entry) {
            self.replaced.fetch_add(1, Ordering::Relaxed);
            debug!(
                key = %key,
                previous = %previous.id,
                age_secs = previous.connected_at.elapsed().as_secs(),
                "Channel superseded by reconnect"
            );
            let _ = previous.close_tx.send(());
        }

        ChannelHandle {
            key,
            id,
            superseded,
        }
    }

    /// Remove a connection, unless a newer one already owns the key
    pub fn detach(&self, key: &ChannelKey, id: Uuid) {
        self.channels.remove_if(key, |_, entry| entry.id == id);
    }

    pub fn is_attached(&self, key: &ChannelKey) -> bool {
        self.channels.contains_key(key)
    }

    /// Connections currently attached for one session
    pub fn session_connections(&self, session: &str) -> usize {
        self.channels
            .iter()
            .filter(|entry| entry.key().session == session)
            .count()
    }

    pub fn connection_count(&self) -> usize {
        self.channels.len()
    }

    /// Connections replaced by a reconnect so far
    pub fn replaced_count(&self) -> u64 {
        self.replaced.load(Ordering::Relaxed)
    }
}
