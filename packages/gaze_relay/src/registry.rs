//! Connected-client bookkeeping.
//!
//! Membership never touches the cache; it exists for logging, health output
//! and the idle policy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Opaque per-connection identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(Uuid);

impl ClientId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: ClientId,
    pub remote: Option<SocketAddr>,
    pub connected_at: DateTime<Utc>,
    pub commands: u64,
}

#[derive(Debug)]
struct Sessions {
    by_id: HashMap<ClientId, SessionInfo>,
    /// When the registry last dropped to zero clients (or was created).
    empty_since: Option<Instant>,
}

#[derive(Debug)]
pub struct SessionRegistry {
    inner: RwLock<Sessions>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Sessions {
                by_id: HashMap::new(),
                empty_since: Some(Instant::now()),
            }),
        }
    }

    /// Add a newly connected client. Returns its id and the new client count.
    pub async fn register(&self, remote: Option<SocketAddr>) -> (ClientId, usize) {
        let id = ClientId::new();
        let mut inner = self.inner.write().await;
        inner.by_id.insert(
            id,
            SessionInfo {
                id,
                remote,
                connected_at: Utc::now(),
                commands: 0,
            },
        );
        inner.empty_since = None;
        (id, inner.by_id.len())
    }

    /// Remove a client. Returns the session if it was registered.
    pub async fn unregister(&self, id: &ClientId) -> Option<SessionInfo> {
        let mut inner = self.inner.write().await;
        let removed = inner.by_id.remove(id);
        if removed.is_some() && inner.by_id.is_empty() {
            inner.empty_since = Some(Instant::now());
        }
        removed
    }

    pub async fn record_command(&self, id: &ClientId) {
        if let Some(session) = self.inner.write().await.by_id.get_mut(id) {
            session.commands += 1;
        }
    }

    pub async fn count(&self) -> usize {
        self.inner.read().await.by_id.len()
    }

    pub async fn list(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<_> = self.inner.read().await.by_id.values().cloned().collect();
        sessions.sort_by_key(|s| s.connected_at);
        sessions
    }

    /// When the last client left, or `None` while anyone is connected.
    pub async fn empty_since(&self) -> Option<Instant> {
        self.inner.read().await.empty_since
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
