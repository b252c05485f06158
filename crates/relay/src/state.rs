// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::RelayConfig;
use crate::presence::PresenceRegistry;
use crate::relay::Relay;
use crate::store::Store;

/// Shared relay state.
pub struct RelayState {
    pub config: RelayConfig,
    pub relay: Relay,
    pub store: Arc<dyn Store>,
    pub presence: Arc<PresenceRegistry>,
    pub shutdown: CancellationToken,
}

impl RelayState {
    pub fn new(config: RelayConfig, store: Arc<dyn Store>, shutdown: CancellationToken) -> Self {
        let presence = Arc::new(PresenceRegistry::default());
        let relay = Relay::new(Arc::clone(&store), Arc::clone(&presence));
        Self { config, relay, store, presence, shutdown }
    }
}
