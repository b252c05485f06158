// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection gate: bearer token extraction and HS256 verification.
//!
//! Tokens are accepted from the `Authorization: Bearer` header or a `token`
//! query parameter (the WebSocket handshake path). Verification checks the
//! signature against the shared secret and the `exp` claim when present; a
//! failed handshake is fatal for that connection attempt.

use axum::http::HeaderMap;
use base64::Engine;
use ring::hmac;
use serde::Deserialize;

use crate::error::RelayError;

/// Decoded identity attached to an authenticated connection.
#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    pub id: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub exp: Option<u64>,
}

/// Extract a bearer token from an Authorization header or a query string.
pub fn extract_token(headers: &HeaderMap, query: Option<&str>) -> Option<String> {
    if let Some(header) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        if let Some(token) = header.strip_prefix("Bearer ") {
            return Some(token.to_owned());
        }
    }

    for pair in query.unwrap_or_default().split('&') {
        if let Some(value) = pair.strip_prefix("token=") {
            if !value.is_empty() {
                return Some(value.to_owned());
            }
        }
    }

    None
}

/// Verify an HS256 token against the shared secret and return its claims.
///
/// Signature comparison is constant-time via `ring::hmac::verify`. Anything
/// malformed maps to `Unauthorized` without detail, by design.
pub fn verify_token(token: &str, secret: &str, now_secs: u64) -> Result<Claims, RelayError> {
    let mut parts = token.split('.');
    let (Some(header), Some(payload), Some(signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(RelayError::Unauthorized);
    };

    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    let signed = format!("{header}.{payload}");
    let sig_bytes = decode_b64(signature)?;
    hmac::verify(&key, signed.as_bytes(), &sig_bytes).map_err(|_| RelayError::Unauthorized)?;

    let claims: Claims =
        serde_json::from_slice(&decode_b64(payload)?).map_err(|_| RelayError::Unauthorized)?;
    if claims.id.is_empty() {
        return Err(RelayError::Unauthorized);
    }
    if let Some(exp) = claims.exp {
        if exp <= now_secs {
            return Err(RelayError::Unauthorized);
        }
    }

    Ok(claims)
}

/// Issue an HS256 token for the given claims object.
///
/// The production issuer lives in the account service; this exists for local
/// tooling and tests.
pub fn sign_token(claims: &serde_json::Value, secret: &str) -> String {
    let engine = &base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let header = engine.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = engine.encode(claims.to_string());
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    let tag = hmac::sign(&key, format!("{header}.{payload}").as_bytes());
    format!("{header}.{payload}.{}", engine.encode(tag.as_ref()))
}

/// Return current epoch seconds.
pub fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn decode_b64(input: &str) -> Result<Vec<u8>, RelayError> {
    base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(input)
        .map_err(|_| RelayError::Unauthorized)
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
