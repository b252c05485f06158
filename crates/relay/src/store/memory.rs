// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory document store.

use anyhow::bail;
use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::model::{Conversation, Message, PairKey};
use crate::store::{LastMessage, Store};

/// Both collections live behind one lock so `upsert_for_pair` is atomic with
/// respect to concurrent senders — the find-or-create window never opens.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Collections>,
}

#[derive(Default)]
struct Collections {
    conversations: Vec<Conversation>,
    messages: Vec<Message>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn apply_last(conversation: &mut Conversation, last: &LastMessage) {
    conversation.last_message_preview = last.preview.clone();
    conversation.last_message_sender_id = last.sender_id.clone();
    conversation.last_message_at = last.at;
    conversation.unread_count += 1;
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_message(&self, mut message: Message) -> anyhow::Result<Message> {
        if message.id.is_empty() {
            message.id = Uuid::new_v4().to_string();
        }
        let mut inner = self.inner.lock().await;
        inner.messages.push(message.clone());
        Ok(message)
    }

    async fn find_conversation(&self, id: &str) -> anyhow::Result<Option<Conversation>> {
        let inner = self.inner.lock().await;
        Ok(inner.conversations.iter().find(|c| c.id == id).cloned())
    }

    async fn upsert_for_pair(
        &self,
        pair: &PairKey,
        last: LastMessage,
    ) -> anyhow::Result<Conversation> {
        let mut inner = self.inner.lock().await;
        if let Some(conversation) =
            inner.conversations.iter_mut().find(|c| pair.matches(&c.participants))
        {
            apply_last(conversation, &last);
            return Ok(conversation.clone());
        }

        let mut conversation = Conversation {
            id: Uuid::new_v4().to_string(),
            participants: pair.participants().to_vec(),
            last_message_preview: String::new(),
            last_message_sender_id: String::new(),
            last_message_at: 0,
            unread_count: 0,
        };
        apply_last(&mut conversation, &last);
        inner.conversations.push(conversation.clone());
        Ok(conversation)
    }

    async fn touch_conversation(
        &self,
        id: &str,
        last: LastMessage,
    ) -> anyhow::Result<Conversation> {
        let mut inner = self.inner.lock().await;
        match inner.conversations.iter_mut().find(|c| c.id == id) {
            Some(conversation) => {
                apply_last(conversation, &last);
                Ok(conversation.clone())
            }
            None => bail!("conversation {id} not found"),
        }
    }

    async fn mark_messages_read(&self, ids: &[String], at: u64) -> anyhow::Result<Vec<String>> {
        let mut inner = self.inner.lock().await;
        let mut updated = Vec::new();
        for message in inner.messages.iter_mut().filter(|m| ids.contains(&m.id)) {
            message.read = true;
            message.read_at = Some(at);
            updated.push(message.id.clone());
        }
        Ok(updated)
    }

    async fn messages_for_conversation(
        &self,
        conversation_id: &str,
    ) -> anyhow::Result<Vec<Message>> {
        let inner = self.inner.lock().await;
        let mut messages: Vec<Message> = inner
            .messages
            .iter()
            .filter(|m| m.conversation_id.as_deref() == Some(conversation_id))
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    async fn mark_conversation_read(
        &self,
        conversation_id: &str,
        reader: &str,
        at: u64,
    ) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().await;
        for message in inner.messages.iter_mut().filter(|m| {
            m.conversation_id.as_deref() == Some(conversation_id) && m.sender_id != reader
        }) {
            message.read = true;
            message.read_at = Some(at);
        }
        if let Some(conversation) =
            inner.conversations.iter_mut().find(|c| c.id == conversation_id)
        {
            conversation.unread_count = 0;
        }
        Ok(())
    }

    async fn conversations_for_user(&self, user_id: &str) -> anyhow::Result<Vec<Conversation>> {
        let inner = self.inner.lock().await;
        let mut conversations: Vec<Conversation> = inner
            .conversations
            .iter()
            .filter(|c| c.has_participant(user_id))
            .cloned()
            .collect();
        conversations.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
        Ok(conversations)
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
