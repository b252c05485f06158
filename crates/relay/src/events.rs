// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire-format event types for the relay WebSocket protocol.
//!
//! Every frame is a JSON object tagged by an `event` field. Both inbound
//! dialects (`sendMessage` and `newMessage`) are supported indefinitely; they
//! converge inside the relay engine, not here.

use serde::{Deserialize, Serialize};

use crate::model::{Conversation, Message};

/// Events a client may send after an authenticated handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ClientEvent {
    /// Direct-send dialect: addressed by recipient, conversation resolved
    /// server-side.
    #[serde(rename_all = "camelCase")]
    SendMessage {
        receiver_id: String,
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        attachments: Option<Vec<String>>,
    },
    /// Conversation-centric dialect: addressed by conversation id.
    #[serde(rename_all = "camelCase")]
    NewMessage {
        conversation_id: String,
        text: String,
    },
    /// Best-effort read marking.
    #[serde(rename_all = "camelCase")]
    MarkRead {
        message_ids: Vec<String>,
    },
}

/// Events the relay emits to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Acknowledgment to the sender (direct-send dialect).
    MessageSent { message: Message },
    /// Delivery to the recipient (direct-send dialect).
    ReceiveMessage { message: Message },
    /// Delivery/echo to both sides (conversation-centric dialect).
    NewMessage { message: Message },
    /// Inbox summary update; `unread_count` is the receiving side's view.
    #[serde(rename_all = "camelCase")]
    ConversationUpdated {
        conversation: Conversation,
        unread_count: u32,
    },
    /// Read receipt, emitted to the marking client only.
    #[serde(rename_all = "camelCase")]
    MessagesRead {
        message_ids: Vec<String>,
    },
    /// Structured application error for the originating client.
    Error { code: String, message: String },
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
