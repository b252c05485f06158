// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Presence registry: ephemeral user → connection mapping, plus the per-user
//! broadcast groups used as the fallback delivery path.
//!
//! The registry is an owned object injected into the relay, mutated only by
//! the connection lifecycle (register on connect, unregister on disconnect).
//! Lookups during delivery tolerate staleness: a miss is not authoritative,
//! because the group broadcast still reaches anyone subscribed.

use std::collections::HashMap;

use tokio::sync::{broadcast, mpsc, RwLock};

use crate::events::ServerEvent;

/// Buffered events per group before slow subscribers start lagging.
const GROUP_CAPACITY: usize = 256;

/// Direct handle to one live connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    /// Distinguishes connections, so a stale disconnect cannot evict a newer
    /// registration by the same user.
    connection_id: String,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

impl ConnectionHandle {
    pub fn new(connection_id: String, tx: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self { connection_id, tx }
    }

    /// Queue an event on the connection. Returns false if the connection's
    /// event loop has already gone away.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

struct UserEntry {
    handle: Option<ConnectionHandle>,
    group: broadcast::Sender<ServerEvent>,
}

impl UserEntry {
    fn new() -> Self {
        let (group, _) = broadcast::channel(GROUP_CAPACITY);
        Self { handle: None, group }
    }
}

/// In-memory user → connection registry. Last-connect-wins, one handle per
/// user; no multi-device fan-out.
#[derive(Default)]
pub struct PresenceRegistry {
    users: RwLock<HashMap<String, UserEntry>>,
}

impl PresenceRegistry {
    /// Record a connection for the user, overwriting any prior handle, and
    /// join the user's own broadcast group. The returned receiver is the
    /// group subscription for this connection.
    pub async fn register(
        &self,
        user_id: &str,
        handle: ConnectionHandle,
    ) -> broadcast::Receiver<ServerEvent> {
        let mut users = self.users.write().await;
        let entry = users.entry(user_id.to_owned()).or_insert_with(UserEntry::new);
        entry.handle = Some(handle);
        entry.group.subscribe()
    }

    /// The direct handle for a user, if one is registered.
    pub async fn lookup(&self, user_id: &str) -> Option<ConnectionHandle> {
        self.users.read().await.get(user_id).and_then(|e| e.handle.clone())
    }

    /// Drop the user's handle, but only if it still belongs to the given
    /// connection. Group channels persist so reconnecting clients and late
    /// subscribers keep a delivery path.
    pub async fn unregister(&self, user_id: &str, connection_id: &str) {
        let mut users = self.users.write().await;
        if let Some(entry) = users.get_mut(user_id) {
            if entry.handle.as_ref().is_some_and(|h| h.connection_id == connection_id) {
                entry.handle = None;
            }
        }
    }

    /// The broadcast sender for a user's group, created on demand. Sending to
    /// a group with no subscribers is a silent no-op for callers.
    pub async fn group_sender(&self, user_id: &str) -> broadcast::Sender<ServerEvent> {
        let mut users = self.users.write().await;
        users.entry(user_id.to_owned()).or_insert_with(UserEntry::new).group.clone()
    }

    /// Number of users with an active direct handle.
    pub async fn online(&self) -> usize {
        self.users.read().await.values().filter(|e| e.handle.is_some()).count()
    }
}

#[cfg(test)]
#[path = "presence_tests.rs"]
mod tests;
