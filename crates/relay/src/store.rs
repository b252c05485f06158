// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Document store interface for conversations and messages.
//!
//! The relay never performs find-then-insert on conversations: the store owns
//! serialization of the find-or-create step via [`Store::upsert_for_pair`],
//! which is the only way a conversation document comes into existence. A real
//! deployment implements this trait over its document database (with indexes
//! on participants, lastMessageAt, conversationId, sender/receiver, and
//! createdAt); the in-memory implementation in [`memory`] is the binary
//! default and the test double.

pub mod memory;

use async_trait::async_trait;

use crate::model::{Conversation, Message, PairKey};

/// Summary fields applied to a conversation by a newly delivered message.
#[derive(Debug, Clone)]
pub struct LastMessage {
    pub preview: String,
    pub sender_id: String,
    pub at: u64,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Persist a new message. An empty id is replaced with a generated one;
    /// `conversation_id` must already be resolved by the caller.
    async fn insert_message(&self, message: Message) -> anyhow::Result<Message>;

    async fn find_conversation(&self, id: &str) -> anyhow::Result<Option<Conversation>>;

    /// Atomic find-or-create for an unordered pair: match an existing
    /// conversation regardless of stored participant order, else insert one.
    /// Always applies `last` and increments the unread counter by one.
    async fn upsert_for_pair(
        &self,
        pair: &PairKey,
        last: LastMessage,
    ) -> anyhow::Result<Conversation>;

    /// Apply `last` and increment the unread counter on an existing
    /// conversation. Errors if the conversation is gone.
    async fn touch_conversation(
        &self,
        id: &str,
        last: LastMessage,
    ) -> anyhow::Result<Conversation>;

    /// Mark exactly the given message ids read at `at`. Unknown ids are
    /// skipped; the returned list holds the ids actually updated.
    async fn mark_messages_read(&self, ids: &[String], at: u64) -> anyhow::Result<Vec<String>>;

    /// All messages in a conversation, oldest first.
    async fn messages_for_conversation(
        &self,
        conversation_id: &str,
    ) -> anyhow::Result<Vec<Message>>;

    /// Mark everything in the conversation not sent by `reader` as read and
    /// reset the conversation's unread counter to zero.
    async fn mark_conversation_read(
        &self,
        conversation_id: &str,
        reader: &str,
        at: u64,
    ) -> anyhow::Result<()>;

    /// Conversations the user participates in, newest activity first.
    async fn conversations_for_user(&self, user_id: &str) -> anyhow::Result<Vec<Conversation>>;
}
