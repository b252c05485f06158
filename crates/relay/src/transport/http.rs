// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the relay.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::auth::{self, Claims};
use crate::error::RelayError;
use crate::state::RelayState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub online_count: usize,
}

/// Authenticate an HTTP request from its headers.
fn authenticate(state: &RelayState, headers: &HeaderMap) -> Result<Claims, RelayError> {
    let token =
        auth::extract_token(headers, None).ok_or(RelayError::Unauthorized)?;
    auth::verify_token(&token, &state.config.jwt_secret, auth::now_secs())
}

/// `GET /api/v1/health`
pub async fn health(State(s): State<Arc<RelayState>>) -> impl IntoResponse {
    let online_count = s.presence.online().await;
    Json(HealthResponse { status: "running".to_owned(), online_count })
}

/// `GET /api/v1/conversations` — the caller's inbox, newest activity first.
pub async fn list_conversations(
    State(s): State<Arc<RelayState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let claims = match authenticate(&s, &headers) {
        Ok(c) => c,
        Err(e) => return e.to_http_response("invalid or missing token").into_response(),
    };

    match s.relay.inbox(&claims.id).await {
        Ok(conversations) => Json(conversations).into_response(),
        Err(e) => e.to_http_response().into_response(),
    }
}

/// `GET /api/v1/conversations/{id}/messages` — conversation history, oldest
/// first. Fetching counts as reading: the caller's unread state resets.
pub async fn conversation_messages(
    State(s): State<Arc<RelayState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let claims = match authenticate(&s, &headers) {
        Ok(c) => c,
        Err(e) => return e.to_http_response("invalid or missing token").into_response(),
    };

    match s.relay.fetch_history(&claims.id, &id).await {
        Ok(messages) => Json(messages).into_response(),
        Err(e) => e.to_http_response().into_response(),
    }
}
