// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end relay scenarios.
//!
//! Runs the real relay router on a real TCP port and talks to it over real
//! WebSocket connections.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use parley_relay::auth;
use parley_relay::config::RelayConfig;
use parley_relay::state::RelayState;
use parley_relay::store::memory::MemoryStore;
use parley_relay::transport::build_router;

pub const TEST_SECRET: &str = "specs-shared-secret";

/// Issue a token the relay under test will accept.
pub fn token_for(user: &str) -> String {
    auth::sign_token(&serde_json::json!({ "id": user }), TEST_SECRET)
}

/// A relay serving on a real ephemeral port, stopped on [`TestRelay::stop`]
/// or drop.
pub struct TestRelay {
    pub state: Arc<RelayState>,
    port: u16,
    shutdown: CancellationToken,
}

impl TestRelay {
    /// Start on an ephemeral port.
    pub async fn start() -> anyhow::Result<Self> {
        Self::start_on(0).await
    }

    /// Start on a specific port (0 = ephemeral). Retries the bind briefly so
    /// restart-on-the-same-port scenarios survive TIME_WAIT races.
    pub async fn start_on(port: u16) -> anyhow::Result<Self> {
        let config =
            RelayConfig { host: "127.0.0.1".into(), port, jwt_secret: TEST_SECRET.into() };
        let shutdown = CancellationToken::new();
        let state = Arc::new(RelayState::new(
            config,
            Arc::new(MemoryStore::new()),
            shutdown.clone(),
        ));
        let router = build_router(Arc::clone(&state));

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        let listener = loop {
            match tokio::net::TcpListener::bind(("127.0.0.1", port)).await {
                Ok(listener) => break listener,
                Err(e) if tokio::time::Instant::now() < deadline => {
                    tracing::debug!(err = %e, "bind failed, retrying");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
                Err(e) => return Err(e.into()),
            }
        };
        let port = listener.local_addr()?.port();

        let serve_shutdown = shutdown.clone();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router)
                .with_graceful_shutdown(serve_shutdown.cancelled_owned())
                .await;
        });

        Ok(Self { state, port, shutdown })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}/ws", self.port)
    }

    pub fn stop(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for TestRelay {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// A raw WebSocket client authenticated as one user.
pub struct WsClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsClient {
    pub async fn connect(relay: &TestRelay, user: &str) -> anyhow::Result<Self> {
        let url = format!("{}?token={}", relay.ws_url(), token_for(user));
        let (stream, _) = tokio_tungstenite::connect_async(&url).await?;
        Ok(Self { stream })
    }

    pub async fn send(&mut self, frame: &serde_json::Value) -> anyhow::Result<()> {
        self.stream.send(Message::Text(frame.to_string().into())).await?;
        Ok(())
    }

    /// Wait for the next frame tagged with `event`, skipping other frames.
    pub async fn expect_event(
        &mut self,
        event: &str,
        timeout: Duration,
    ) -> anyhow::Result<serde_json::Value> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let now = tokio::time::Instant::now();
            if now >= deadline {
                anyhow::bail!("timed out waiting for `{event}`");
            }
            let msg = tokio::time::timeout(deadline - now, self.stream.next())
                .await
                .map_err(|_| anyhow::anyhow!("timed out waiting for `{event}`"))?
                .ok_or_else(|| anyhow::anyhow!("stream ended waiting for `{event}`"))??;

            if let Message::Text(text) = msg {
                let frame: serde_json::Value = serde_json::from_str(&text)?;
                if frame["event"] == event {
                    return Ok(frame);
                }
            }
        }
    }
}
