// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parley relay: presence-tracking realtime message relay.

pub mod auth;
pub mod config;
pub mod error;
pub mod events;
pub mod model;
pub mod presence;
pub mod relay;
pub mod state;
pub mod store;
pub mod transport;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::RelayConfig;
use crate::state::RelayState;
use crate::store::memory::MemoryStore;
use crate::store::Store;
use crate::transport::build_router;

/// Run the relay until shutdown, backed by the in-memory store.
pub async fn run(config: RelayConfig) -> anyhow::Result<()> {
    run_with_store(config, Arc::new(MemoryStore::new())).await
}

/// Run the relay with an injected document store.
pub async fn run_with_store(config: RelayConfig, store: Arc<dyn Store>) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();

    let state = Arc::new(RelayState::new(config, store, shutdown.clone()));

    tracing::info!("parley relay listening on {addr}");
    let router = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    Ok(())
}
