use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    error::StoreError,
    models::{Chat, ChatId, ChatSummary, Message, MessageId, MessageStatus, MessageUpdate, NewMessage, UserId},
};

use super::{ChatDirectory, MessageStore, StoreResult, page_offset};

#[derive(Default)]
struct State {
    chats: HashMap<ChatId, String>,
    /// (chat, person) pairs in the order they joined.
    members: Vec<(ChatId, UserId)>,
    /// Messages in insertion order, deleted ones included.
    messages: Vec<Message>,
}

/// Process-local `MessageStore` + `ChatDirectory`. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn visible(message: &Message) -> bool {
    message.status != MessageStatus::Deleted
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn add(&self, NewMessage { person_id, chat_id, text }: NewMessage) -> StoreResult<Message> {
        let mut state = self.state.write();
        if !state.chats.contains_key(&chat_id) {
            return Err(StoreError::NotFound);
        }

        let message = Message {
            id: Uuid::now_v7(),
            person_id,
            chat_id,
            text,
            sending_time: OffsetDateTime::now_utc(),
            status: MessageStatus::NotRead,
        };
        state.messages.push(message.clone());
        Ok(message)
    }

    async fn get_by_chat(&self, chat_id: ChatId) -> StoreResult<Vec<Message>> {
        let state = self.state.read();
        Ok(state
            .messages
            .iter()
            .filter(|m| m.chat_id == chat_id && visible(m))
            .cloned()
            .collect())
    }

    async fn get_by_id(&self, id: MessageId) -> StoreResult<Message> {
        let state = self.state.read();
        state
            .messages
            .iter()
            .find(|m| m.id == id && visible(m))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update(&self, MessageUpdate { id, text, status }: MessageUpdate) -> StoreResult<()> {
        let mut state = self.state.write();
        let message = state
            .messages
            .iter_mut()
            .find(|m| m.id == id && visible(m))
            .ok_or(StoreError::NotFound)?;
        message.text = text;
        if let Some(status) = status {
            message.status = status;
        }
        Ok(())
    }

    async fn delete(&self, id: MessageId) -> StoreResult<()> {
        let mut state = self.state.write();
        let message = state
            .messages
            .iter_mut()
            .find(|m| m.id == id && visible(m))
            .ok_or(StoreError::NotFound)?;
        message.status = MessageStatus::Deleted;
        Ok(())
    }
}

#[async_trait]
impl ChatDirectory for MemoryStore {
    async fn create_chat(&self, chat: Chat, person_ids: &[UserId]) -> StoreResult<ChatId> {
        let mut state = self.state.write();
        state.chats.insert(chat.id, chat.name);
        for &person_id in person_ids {
            if !state.members.contains(&(chat.id, person_id)) {
                state.members.push((chat.id, person_id));
            }
        }
        Ok(chat.id)
    }

    async fn add_member(&self, chat_id: ChatId, person_id: UserId) -> StoreResult<()> {
        let mut state = self.state.write();
        if !state.chats.contains_key(&chat_id) {
            return Err(StoreError::NotFound);
        }
        if !state.members.contains(&(chat_id, person_id)) {
            state.members.push((chat_id, person_id));
        }
        Ok(())
    }

    async fn remove_member(&self, chat_id: ChatId, person_id: UserId) -> StoreResult<()> {
        self.state.write().members.retain(|&pair| pair != (chat_id, person_id));
        Ok(())
    }

    async fn get_user_chats(&self, user_id: UserId) -> StoreResult<Vec<ChatId>> {
        let state = self.state.read();
        Ok(state
            .members
            .iter()
            .filter(|(_, person_id)| *person_id == user_id)
            .map(|(chat_id, _)| *chat_id)
            .collect())
    }

    async fn get_chat_ids(&self, user_id: UserId, page: u32, page_size: u32) -> StoreResult<Vec<ChatId>> {
        let offset = usize::try_from(page_offset(page, page_size)).unwrap_or(usize::MAX);
        let chats = self.get_user_chats(user_id).await?;
        Ok(chats.into_iter().skip(offset).take(page_size as usize).collect())
    }

    async fn get_chat_summary(&self, chat_id: ChatId) -> StoreResult<ChatSummary> {
        let state = self.state.read();
        let name = state.chats.get(&chat_id).ok_or(StoreError::NotFound)?.clone();
        let last_message = state
            .messages
            .iter()
            .rev()
            .find(|m| m.chat_id == chat_id && visible(m))
            .cloned();
        Ok(ChatSummary { name, last_message })
    }

    async fn update_chat(&self, Chat { id, name }: Chat) -> StoreResult<()> {
        let mut state = self.state.write();
        let current = state.chats.get_mut(&id).ok_or(StoreError::NotFound)?;
        *current = name;
        Ok(())
    }

    async fn delete_chat(&self, chat_id: ChatId, user_id: UserId) -> StoreResult<()> {
        let mut state = self.state.write();
        if !state.members.contains(&(chat_id, user_id)) {
            return Err(StoreError::NotFound);
        }
        state.chats.remove(&chat_id);
        state.members.retain(|(id, _)| *id != chat_id);
        state.messages.retain(|m| m.chat_id != chat_id);
        Ok(())
    }
}
