use std::sync::Arc;

use async_trait::async_trait;
use moka::sync::Cache;
use parking_lot::Mutex;

use crate::models::{ChatId, Message, MessageId, MessageUpdate, NewMessage};

use super::{MessageStore, StoreResult};

/// Chats kept warm when no capacity is configured.
pub const DEFAULT_CACHED_CHATS: u64 = 1024;

/// Read-through cache of per-chat history in front of another `MessageStore`.
///
/// Every successful write invalidates instead of patching, and bumps a write
/// generation. A miss only fills the cache when no write finished while it was
/// reading the backing store.
pub struct CachedMessageStore {
    inner: Arc<dyn MessageStore>,
    by_chat: Cache<ChatId, Arc<Vec<Message>>>,
    generation: Mutex<u64>,
}

impl CachedMessageStore {
    pub fn new(inner: Arc<dyn MessageStore>, max_chats: u64) -> Self {
        Self {
            inner,
            by_chat: Cache::builder().max_capacity(max_chats).build(),
            generation: Mutex::new(0),
        }
    }

    fn invalidate_chat(&self, chat_id: ChatId) {
        let mut generation = self.generation.lock();
        *generation += 1;
        self.by_chat.invalidate(&chat_id);
    }

    fn invalidate_message(&self, id: MessageId) {
        let mut generation = self.generation.lock();
        *generation += 1;
        for (chat_id, history) in self.by_chat.iter() {
            if history.iter().any(|m| m.id == id) {
                self.by_chat.invalidate(&*chat_id);
            }
        }
    }
}

#[async_trait]
impl MessageStore for CachedMessageStore {
    async fn add(&self, message: NewMessage) -> StoreResult<Message> {
        let message = self.inner.add(message).await?;
        self.invalidate_chat(message.chat_id);
        Ok(message)
    }

    async fn get_by_chat(&self, chat_id: ChatId) -> StoreResult<Vec<Message>> {
        if let Some(history) = self.by_chat.get(&chat_id) {
            tracing::trace!(chat_id = %chat_id, "message cache hit");
            return Ok(history.as_ref().clone());
        }

        let seen = *self.generation.lock();
        let history = self.inner.get_by_chat(chat_id).await?;

        let generation = self.generation.lock();
        if *generation == seen {
            self.by_chat.insert(chat_id, Arc::new(history.clone()));
        }
        Ok(history)
    }

    async fn get_by_id(&self, id: MessageId) -> StoreResult<Message> {
        self.inner.get_by_id(id).await
    }

    async fn update(&self, update: MessageUpdate) -> StoreResult<()> {
        let id = update.id;
        self.inner.update(update).await?;
        self.invalidate_message(id);
        Ok(())
    }

    async fn delete(&self, id: MessageId) -> StoreResult<()> {
        self.inner.delete(id).await?;
        self.invalidate_message(id);
        Ok(())
    }

    async fn forget_chat(&self, chat_id: ChatId) {
        self.invalidate_chat(chat_id);
        self.inner.forget_chat(chat_id).await;
    }
}
