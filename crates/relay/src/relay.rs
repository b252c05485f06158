// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message relay engine.
//!
//! Both inbound dialects are thin adapters over one internal
//! [`DeliverMessage`] operation: one persistence path, one conversation
//! upsert, one delivery step. The delivery step publishes over the direct
//! handle AND the recipient's broadcast group — deliberate redundancy so both
//! client generations receive events; clients de-duplicate by message id.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::RelayError;
use crate::events::{ClientEvent, ServerEvent};
use crate::model::{epoch_ms, is_valid_user_id, preview_text, Conversation, Message, PairKey};
use crate::presence::PresenceRegistry;
use crate::store::{LastMessage, Store};

/// Client-visible failure for one inbound event or fetch.
#[derive(Debug)]
pub struct EventError {
    pub code: RelayError,
    pub message: String,
}

impl EventError {
    fn new(code: RelayError, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn to_event(&self) -> ServerEvent {
        ServerEvent::Error { code: self.code.as_str().to_owned(), message: self.message.clone() }
    }

    pub fn to_http_response(
        &self,
    ) -> (axum::http::StatusCode, axum::Json<crate::error::ErrorResponse>) {
        self.code.to_http_response(self.message.clone())
    }
}

/// Which boundary shape a delivery was requested through. Controls only the
/// emitted event names, never the persistence path.
#[derive(Debug, Clone, Copy)]
enum Dialect {
    Direct,
    Conversation,
}

/// The single internal representation of "deliver one message".
struct DeliverMessage {
    sender_id: String,
    receiver_id: String,
    content: String,
    attachments: Vec<String>,
    /// Set when the conversation dialect already resolved the conversation;
    /// `None` means find-or-create for the participant pair.
    conversation_id: Option<String>,
    dialect: Dialect,
}

/// The relay engine: validates inbound events, persists through the store,
/// and fans deliveries out through the presence registry.
pub struct Relay {
    store: Arc<dyn Store>,
    presence: Arc<PresenceRegistry>,
}

impl Relay {
    pub fn new(store: Arc<dyn Store>, presence: Arc<PresenceRegistry>) -> Self {
        Self { store, presence }
    }

    /// Dispatch one authenticated inbound event. The returned error, if any,
    /// goes back to the originating connection only.
    pub async fn handle_event(
        &self,
        sender_id: &str,
        event: ClientEvent,
    ) -> Result<(), EventError> {
        match event {
            ClientEvent::SendMessage { receiver_id, content, attachments } => {
                self.handle_send_message(sender_id, &receiver_id, content, attachments).await
            }
            ClientEvent::NewMessage { conversation_id, text } => {
                self.handle_new_message(sender_id, &conversation_id, &text).await
            }
            ClientEvent::MarkRead { message_ids } => {
                self.handle_mark_read(sender_id, &message_ids).await;
                Ok(())
            }
        }
    }

    /// Direct-send dialect adapter.
    async fn handle_send_message(
        &self,
        sender_id: &str,
        receiver_id: &str,
        content: Option<String>,
        attachments: Option<Vec<String>>,
    ) -> Result<(), EventError> {
        let receiver_id = receiver_id.trim();
        if !is_valid_user_id(receiver_id) {
            return Err(EventError::new(RelayError::Validation, "receiverId is required"));
        }

        let content = content.unwrap_or_default().trim().to_owned();
        let attachments = attachments.unwrap_or_default();
        if content.is_empty() && attachments.is_empty() {
            return Err(EventError::new(
                RelayError::Validation,
                "message needs content or attachments",
            ));
        }

        self.deliver(DeliverMessage {
            sender_id: sender_id.to_owned(),
            receiver_id: receiver_id.to_owned(),
            content,
            attachments,
            conversation_id: None,
            dialect: Dialect::Direct,
        })
        .await
    }

    /// Conversation-centric dialect adapter.
    async fn handle_new_message(
        &self,
        sender_id: &str,
        conversation_id: &str,
        text: &str,
    ) -> Result<(), EventError> {
        let text = text.trim();
        if conversation_id.is_empty() || text.is_empty() {
            return Err(EventError::new(
                RelayError::Validation,
                "conversationId and text are required",
            ));
        }

        let conversation = self
            .store
            .find_conversation(conversation_id)
            .await
            .map_err(|e| EventError::new(RelayError::Store, format!("conversation lookup failed: {e}")))?
            .ok_or_else(|| {
                EventError::new(
                    RelayError::NotFound,
                    format!("conversation {conversation_id} not found"),
                )
            })?;

        if !conversation.has_participant(sender_id) {
            // Treated as absent rather than leaking someone else's channel.
            return Err(EventError::new(
                RelayError::NotFound,
                format!("conversation {conversation_id} not found"),
            ));
        }

        let receiver_id = conversation.counterpart(sender_id).ok_or_else(|| {
            EventError::new(RelayError::Validation, "conversation has no other participant")
        })?;

        self.deliver(DeliverMessage {
            sender_id: sender_id.to_owned(),
            receiver_id: receiver_id.to_owned(),
            content: text.to_owned(),
            attachments: vec![],
            conversation_id: Some(conversation.id),
            dialect: Dialect::Conversation,
        })
        .await
    }

    /// Best-effort read marking: store errors are logged, never surfaced.
    async fn handle_mark_read(&self, sender_id: &str, message_ids: &[String]) {
        match self.store.mark_messages_read(message_ids, epoch_ms()).await {
            Ok(updated) => {
                self.publish(sender_id, ServerEvent::MessagesRead { message_ids: updated }).await;
            }
            Err(e) => warn!(user = %sender_id, err = %e, "mark-read failed"),
        }
    }

    /// The one persistence + delivery path behind both dialects.
    async fn deliver(&self, cmd: DeliverMessage) -> Result<(), EventError> {
        let now = epoch_ms();
        let last = LastMessage {
            preview: preview_text(&cmd.content, &cmd.attachments),
            sender_id: cmd.sender_id.clone(),
            at: now,
        };

        // Resolve the conversation before the message is committed. The store
        // owns serialization of the pair upsert; a find-then-insert here would
        // reopen the duplicate-conversation window.
        let conversation = match &cmd.conversation_id {
            Some(id) => self.store.touch_conversation(id, last).await,
            None => {
                let pair = PairKey::new(&cmd.sender_id, &cmd.receiver_id);
                self.store.upsert_for_pair(&pair, last).await
            }
        }
        .map_err(|e| {
            EventError::new(RelayError::Store, format!("conversation update failed: {e}"))
        })?;

        let message = self
            .store
            .insert_message(Message {
                id: String::new(),
                conversation_id: Some(conversation.id.clone()),
                sender_id: cmd.sender_id.clone(),
                receiver_id: cmd.receiver_id.clone(),
                content: cmd.content.clone(),
                attachments: cmd.attachments.clone(),
                created_at: now,
                read: false,
                read_at: None,
            })
            .await
            .map_err(|e| EventError::new(RelayError::Store, format!("message save failed: {e}")))?;

        match cmd.dialect {
            Dialect::Direct => {
                self.publish(&cmd.receiver_id, ServerEvent::ReceiveMessage {
                    message: message.clone(),
                })
                .await;
                self.publish(&cmd.sender_id, ServerEvent::MessageSent { message }).await;
                self.publish(&cmd.sender_id, ServerEvent::ConversationUpdated {
                    conversation: conversation.clone(),
                    unread_count: 0,
                })
                .await;
                let unread_count = conversation.unread_count;
                self.publish(&cmd.receiver_id, ServerEvent::ConversationUpdated {
                    conversation,
                    unread_count,
                })
                .await;
            }
            Dialect::Conversation => {
                self.publish(&cmd.receiver_id, ServerEvent::NewMessage {
                    message: message.clone(),
                })
                .await;
                self.publish(&cmd.sender_id, ServerEvent::NewMessage { message }).await;
            }
        }

        Ok(())
    }

    /// Publish an event to a user over both delivery paths: the registered
    /// direct handle and the user's broadcast group. A miss on either path is
    /// not an error — durability comes from the persisted message.
    async fn publish(&self, user_id: &str, event: ServerEvent) {
        if let Some(handle) = self.presence.lookup(user_id).await {
            if !handle.send(event.clone()) {
                debug!(user = %user_id, "direct handle closed, relying on group broadcast");
            }
        }
        let _ = self.presence.group_sender(user_id).await.send(event);
    }

    /// Conversation history for a participant. Fetching is an implicit read:
    /// everything not sent by the viewer is marked read and the conversation's
    /// unread counter resets, whether or not the client ever marks-read.
    pub async fn fetch_history(
        &self,
        viewer: &str,
        conversation_id: &str,
    ) -> Result<Vec<Message>, EventError> {
        let conversation = self
            .store
            .find_conversation(conversation_id)
            .await
            .map_err(|e| EventError::new(RelayError::Store, format!("conversation lookup failed: {e}")))?
            .ok_or_else(|| {
                EventError::new(
                    RelayError::NotFound,
                    format!("conversation {conversation_id} not found"),
                )
            })?;

        if !conversation.has_participant(viewer) {
            return Err(EventError::new(
                RelayError::NotFound,
                format!("conversation {conversation_id} not found"),
            ));
        }

        // Best-effort: a failed reset still returns the history.
        if let Err(e) = self.store.mark_conversation_read(conversation_id, viewer, epoch_ms()).await
        {
            warn!(user = %viewer, conversation = %conversation_id, err = %e, "read reset failed");
        }

        self.store
            .messages_for_conversation(conversation_id)
            .await
            .map_err(|e| EventError::new(RelayError::Store, format!("history fetch failed: {e}")))
    }

    /// The viewer's inbox, newest activity first.
    pub async fn inbox(&self, viewer: &str) -> Result<Vec<Conversation>, EventError> {
        self.store
            .conversations_for_user(viewer)
            .await
            .map_err(|e| EventError::new(RelayError::Store, format!("inbox fetch failed: {e}")))
    }
}

#[cfg(test)]
#[path = "relay_tests.rs"]
mod tests;
