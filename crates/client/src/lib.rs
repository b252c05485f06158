// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reconnecting WebSocket client for the Parley relay.
//!
//! The manager owns listener identity and connection lifecycle. Listeners are
//! registered against the manager, not the socket, so they survive reconnects
//! without caller involvement. A dropped transport that was not a deliberate
//! [`SocketManager::close`] triggers automatic reconnection: an ordered
//! fallback-URL probe cycle with a per-candidate timeout, then exponential
//! backoff, and when the backoff budget is spent the probe cycle restarts —
//! there is no permanent give-up.

pub mod backoff;
pub mod listener;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::bail;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::backoff::Backoff;
use crate::listener::{ListenerId, ListenerRegistry};

/// Observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Connection settings for the manager.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Ordered candidate URLs; probed first-to-last each cycle.
    pub urls: Vec<String>,
    /// Bearer token appended to the handshake URL.
    pub token: String,
    /// Per-candidate handshake timeout.
    pub probe_timeout: Duration,
    /// Base delay of the doubling backoff between probe cycles.
    pub backoff_base: Duration,
    /// Backoff attempts before the probe cycle restarts from the base delay.
    pub max_backoff_attempts: u32,
}

impl ClientConfig {
    pub fn new(urls: Vec<String>, token: impl Into<String>) -> Self {
        Self {
            urls,
            token: token.into(),
            probe_timeout: Duration::from_secs(3),
            backoff_base: Duration::from_millis(500),
            max_backoff_attempts: 5,
        }
    }
}

enum Command {
    Emit(String),
}

/// Client-side socket manager.
pub struct SocketManager {
    config: ClientConfig,
    status_tx: watch::Sender<Status>,
    listeners: Arc<Mutex<ListenerRegistry>>,
    command_tx: mpsc::UnboundedSender<Command>,
    command_rx: Mutex<Option<mpsc::UnboundedReceiver<Command>>>,
    cancel: CancellationToken,
}

impl SocketManager {
    pub fn new(config: ClientConfig) -> Self {
        let (status_tx, _) = watch::channel(Status::Disconnected);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        Self {
            config,
            status_tx,
            listeners: Arc::new(Mutex::new(ListenerRegistry::default())),
            command_tx,
            command_rx: Mutex::new(Some(command_rx)),
            cancel: CancellationToken::new(),
        }
    }

    /// Watch the connection state.
    pub fn status(&self) -> watch::Receiver<Status> {
        self.status_tx.subscribe()
    }

    /// Register a callback for a named server event. Works before or after
    /// the connection exists.
    pub fn add_listener(
        &self,
        event: &str,
        callback: impl Fn(serde_json::Value) + Send + Sync + 'static,
    ) -> ListenerId {
        lock_registry(&self.listeners).add(event, callback)
    }

    /// Remove a listener; unknown ids are a no-op.
    pub fn remove_listener(&self, id: ListenerId) {
        lock_registry(&self.listeners).remove(id);
    }

    /// Start the connection task. A missing token is a fatal configuration
    /// error, not something to retry.
    pub fn connect(&self) -> anyhow::Result<()> {
        if self.config.token.trim().is_empty() {
            self.status_tx.send_replace(Status::Error);
            bail!("cannot connect without a token");
        }
        if self.config.urls.is_empty() {
            self.status_tx.send_replace(Status::Error);
            bail!("cannot connect without at least one URL");
        }

        let Some(command_rx) = lock_option(&self.command_rx).take() else {
            bail!("already connected");
        };

        let config = self.config.clone();
        let status_tx = self.status_tx.clone();
        let listeners = Arc::clone(&self.listeners);
        let cancel = self.cancel.clone();
        tokio::spawn(run_connection(config, status_tx, listeners, command_rx, cancel));
        Ok(())
    }

    /// Deliberate shutdown. Unlike a transport drop, this does not trigger
    /// reconnection.
    pub fn close(&self) {
        self.cancel.cancel();
        self.status_tx.send_replace(Status::Disconnected);
    }

    /// Send a JSON event frame. Fails while not connected.
    pub fn emit(&self, event: &str, payload: serde_json::Value) -> anyhow::Result<()> {
        if *self.status_tx.borrow() != Status::Connected {
            bail!("cannot emit while not connected");
        }

        let mut frame = match payload {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => serde_json::Map::new(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("payload".to_owned(), other);
                map
            }
        };
        frame.insert("event".to_owned(), serde_json::Value::String(event.to_owned()));
        let text = serde_json::Value::Object(frame).to_string();

        if self.command_tx.send(Command::Emit(text)).is_err() {
            bail!("connection task has stopped");
        }
        Ok(())
    }
}

/// The connection task: probe, pump, reconnect.
async fn run_connection(
    config: ClientConfig,
    status_tx: watch::Sender<Status>,
    listeners: Arc<Mutex<ListenerRegistry>>,
    mut command_rx: mpsc::UnboundedReceiver<Command>,
    cancel: CancellationToken,
) {
    let mut backoff = Backoff::new(config.backoff_base, config.max_backoff_attempts);

    'reconnect: loop {
        if cancel.is_cancelled() {
            break;
        }
        // Status writes use send_replace: the stored value must advance even
        // while nobody holds a receiver, because `emit` gates on it.
        status_tx.send_replace(Status::Connecting);

        let Some(stream) = probe_endpoints(&config).await else {
            status_tx.send_replace(Status::Error);
            match backoff.next_delay() {
                Some(delay) => {
                    tokio::select! {
                        _ = cancel.cancelled() => break 'reconnect,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                // Budget spent: restart the probe cycle from the base delay.
                None => backoff.reset(),
            }
            continue;
        };

        backoff.reset();
        status_tx.send_replace(Status::Connected);
        tracing::debug!("socket connected");

        let (mut ws_tx, mut ws_rx) = stream.split();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break 'reconnect;
                }

                cmd = command_rx.recv() => {
                    match cmd {
                        Some(Command::Emit(text)) => {
                            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break 'reconnect,
                    }
                }

                msg = ws_rx.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => dispatch_text(&listeners, &text),
                        Some(Ok(Message::Close(_))) | None => {
                            tracing::debug!("socket closed by peer");
                            break;
                        }
                        Some(Err(e)) => {
                            tracing::debug!(err = %e, "socket error");
                            break;
                        }
                        _ => {}
                    }
                }
            }
        }
        // Not a deliberate close: fall through and reconnect.
    }

    status_tx.send_replace(Status::Disconnected);
}

/// Try every candidate URL in order with a per-candidate timeout. Returns the
/// first stream that completes a handshake.
async fn probe_endpoints(
    config: &ClientConfig,
) -> Option<tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>>
{
    for url in &config.urls {
        let target = append_token(url, &config.token);
        match tokio::time::timeout(config.probe_timeout, tokio_tungstenite::connect_async(&target))
            .await
        {
            Ok(Ok((stream, _))) => return Some(stream),
            Ok(Err(e)) => tracing::debug!(url = %url, err = %e, "handshake failed"),
            Err(_) => tracing::debug!(url = %url, "handshake timed out"),
        }
    }
    None
}

/// Parse one inbound frame and fan it out to listeners by its `event` tag.
fn dispatch_text(listeners: &Arc<Mutex<ListenerRegistry>>, text: &str) {
    let Ok(payload) = serde_json::from_str::<serde_json::Value>(text) else {
        tracing::debug!("dropping unparseable frame");
        return;
    };
    let Some(event) = payload.get("event").and_then(|v| v.as_str()).map(str::to_owned) else {
        tracing::debug!("dropping untagged frame");
        return;
    };

    let callbacks = lock_registry(listeners).callbacks_for(&event);
    for callback in callbacks {
        callback(payload.clone());
    }
}

/// Append the token query parameter to a candidate URL.
fn append_token(url: &str, token: &str) -> String {
    if url.contains('?') {
        format!("{url}&token={token}")
    } else {
        format!("{url}?token={token}")
    }
}

fn lock_registry(listeners: &Mutex<ListenerRegistry>) -> std::sync::MutexGuard<'_, ListenerRegistry> {
    listeners.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn lock_option<T>(slot: &Mutex<Option<T>>) -> std::sync::MutexGuard<'_, Option<T>> {
    slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
