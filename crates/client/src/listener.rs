// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event listener registry.
//!
//! Listener identity belongs to the manager, not the transport: the registry
//! survives reconnects, so callbacks registered before (or during) an outage
//! keep firing on the next connection without re-registration by the caller.

use std::collections::HashMap;

use std::sync::Arc;

use uuid::Uuid;

/// Opaque handle for one registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

type Callback = Arc<dyn Fn(serde_json::Value) + Send + Sync>;

#[derive(Default)]
pub struct ListenerRegistry {
    listeners: HashMap<ListenerId, (String, Callback)>,
}

impl ListenerRegistry {
    pub fn add(
        &mut self,
        event: &str,
        callback: impl Fn(serde_json::Value) + Send + Sync + 'static,
    ) -> ListenerId {
        let id = ListenerId(Uuid::new_v4());
        self.listeners.insert(id, (event.to_owned(), Arc::new(callback)));
        id
    }

    /// Remove a listener. Removing an unknown or already-removed id is a
    /// no-op.
    pub fn remove(&mut self, id: ListenerId) {
        self.listeners.remove(&id);
    }

    /// Callbacks registered for an event. Returned as clones so the caller
    /// invokes them outside the registry lock; a callback that touches the
    /// registry (add/remove) must not deadlock.
    pub fn callbacks_for(&self, event: &str) -> Vec<Callback> {
        self.listeners
            .values()
            .filter(|(name, _)| name == event)
            .map(|(_, cb)| Arc::clone(cb))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
