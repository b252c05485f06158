// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket handler: the authenticated event stream for one connection.
//!
//! The token is verified BEFORE the upgrade completes; a bad handshake gets a
//! structured 401 and no socket. After the upgrade the connection registers
//! with the presence registry and pumps three sources into the socket: its
//! direct mpsc handle, its user's broadcast group, and shutdown.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::auth;
use crate::error::RelayError;
use crate::events::{ClientEvent, ServerEvent};
use crate::state::RelayState;

/// Query parameters for the WS upgrade.
#[derive(Debug, Clone, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// `GET /ws` — WebSocket upgrade, gated on a valid token.
pub async fn ws_handler(
    State(state): State<Arc<RelayState>>,
    Query(query): Query<WsQuery>,
    headers: axum::http::HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let query_str = query.token.as_ref().map(|t| format!("token={t}")).unwrap_or_default();
    let Some(token) = auth::extract_token(&headers, Some(&query_str)) else {
        return RelayError::Unauthorized.to_http_response("missing token").into_response();
    };

    let claims = match auth::verify_token(&token, &state.config.jwt_secret, auth::now_secs()) {
        Ok(c) => c,
        Err(e) => return e.to_http_response("invalid token").into_response(),
    };

    ws.on_upgrade(move |socket| handle_connection(socket, state, claims.id)).into_response()
}

/// Per-connection event loop.
async fn handle_connection(socket: WebSocket, state: Arc<RelayState>, user_id: String) {
    let connection_id = Uuid::new_v4().to_string();
    let (direct_tx, mut direct_rx) = mpsc::unbounded_channel();
    let handle = crate::presence::ConnectionHandle::new(connection_id.clone(), direct_tx);
    let mut group_rx = state.presence.register(&user_id, handle).await;

    tracing::info!(user = %user_id, connection = %connection_id, "client connected");

    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,

            // Direct deliveries addressed to this connection.
            event = direct_rx.recv() => {
                match event {
                    Some(event) => {
                        if send_event(&mut ws_tx, &event).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            // The user's broadcast group, the redundant delivery path.
            event = group_rx.recv() => {
                match event {
                    Ok(event) => {
                        if send_event(&mut ws_tx, &event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::debug!(user = %user_id, lagged = n, "group subscriber lagged, skipping");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            // Inbound events from the client.
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_event(&state, &user_id, &text, &mut ws_tx).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    state.presence.unregister(&user_id, &connection_id).await;
    tracing::info!(user = %user_id, connection = %connection_id, "client disconnected");
}

/// Parse and dispatch one inbound text frame. Failures go back to this
/// connection only, as a structured `error` event.
async fn handle_client_event(
    state: &RelayState,
    user_id: &str,
    text: &str,
    ws_tx: &mut SplitSink<WebSocket, Message>,
) {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::debug!(user = %user_id, err = %e, "unrecognized client frame");
            let error = ServerEvent::Error {
                code: RelayError::Validation.as_str().to_owned(),
                message: "unrecognized event".to_owned(),
            };
            let _ = send_event(ws_tx, &error).await;
            return;
        }
    };

    if let Err(e) = state.relay.handle_event(user_id, event).await {
        let _ = send_event(ws_tx, &e.to_event()).await;
    }
}

/// Serialize and send one server event on the socket.
async fn send_event(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> Result<(), axum::Error> {
    match serde_json::to_string(event) {
        Ok(text) => ws_tx.send(Message::Text(text.into())).await,
        Err(e) => {
            tracing::warn!(err = %e, "failed to serialize server event");
            Ok(())
        }
    }
}
