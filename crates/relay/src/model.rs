// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable document types: conversations, messages, and the unordered
//! participant pair they are keyed by.

use serde::{Deserialize, Serialize};

/// Preview text used for attachment-only messages.
pub const ATTACHMENT_PREVIEW: &str = "attachment";

/// Unordered participant pair, the lookup key for a 1:1 conversation.
///
/// Construction sorts the two ids, so `PairKey::new(a, b)` and
/// `PairKey::new(b, a)` are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PairKey(String, String);

impl PairKey {
    pub fn new(a: &str, b: &str) -> Self {
        if a <= b {
            Self(a.to_owned(), b.to_owned())
        } else {
            Self(b.to_owned(), a.to_owned())
        }
    }

    /// Whether a persisted participant list denotes this pair. Tolerant of
    /// ordering and duplicate entries, since historical documents vary.
    pub fn matches(&self, participants: &[String]) -> bool {
        !participants.is_empty()
            && participants.iter().all(|p| *p == self.0 || *p == self.1)
            && participants.iter().any(|p| *p == self.0)
            && participants.iter().any(|p| *p == self.1)
    }

    /// The canonical (sorted) participant list for new documents.
    pub fn participants(&self) -> [String; 2] {
        [self.0.clone(), self.1.clone()]
    }
}

/// Durable record of a two-party channel and its latest-activity summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub participants: Vec<String>,
    pub last_message_preview: String,
    pub last_message_sender_id: String,
    pub last_message_at: u64,
    pub unread_count: u32,
}

impl Conversation {
    /// The participant that is not `user_id`, if any.
    pub fn counterpart(&self, user_id: &str) -> Option<&str> {
        self.participants.iter().map(String::as_str).find(|p| *p != user_id)
    }

    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }
}

/// Durable record of one sent communication, text and/or attachments.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub conversation_id: Option<String>,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<String>,
    pub created_at: u64,
    pub read: bool,
    pub read_at: Option<u64>,
}

/// Inbox preview for a message: its trimmed content, or the fixed marker when
/// the message carries attachments only.
pub fn preview_text(content: &str, attachments: &[String]) -> String {
    let trimmed = content.trim();
    if trimmed.is_empty() && !attachments.is_empty() {
        ATTACHMENT_PREVIEW.to_owned()
    } else {
        trimmed.to_owned()
    }
}

/// Whether a client-supplied identifier is acceptable as a user id.
pub fn is_valid_user_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id.chars().all(|c| !c.is_whitespace() && !c.is_control())
}

/// Return current epoch millis.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod tests;
