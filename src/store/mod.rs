//! Storage capabilities the delivery core depends on, with SQLite, in-memory and cached variants.

mod cache;
mod memory;
mod sqlite;

use async_trait::async_trait;

use crate::{
    error::StoreError,
    models::{Chat, ChatId, ChatSummary, Message, MessageId, MessageUpdate, NewMessage, UserId},
};

pub use cache::{CachedMessageStore, DEFAULT_CACHED_CHATS};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a new message, assigning its id and sending time.
    async fn add(&self, message: NewMessage) -> StoreResult<Message>;
    /// Visible (non-deleted) messages of a chat, oldest first.
    async fn get_by_chat(&self, chat_id: ChatId) -> StoreResult<Vec<Message>>;
    async fn get_by_id(&self, id: MessageId) -> StoreResult<Message>;
    async fn update(&self, update: MessageUpdate) -> StoreResult<()>;
    /// Soft delete: the row stays, reads stop returning it.
    async fn delete(&self, id: MessageId) -> StoreResult<()>;

    /// Drop anything held for a chat that no longer exists.
    async fn forget_chat(&self, _chat_id: ChatId) {}
}

#[async_trait]
pub trait ChatDirectory: Send + Sync {
    async fn create_chat(&self, chat: Chat, person_ids: &[UserId]) -> StoreResult<ChatId>;
    async fn add_member(&self, chat_id: ChatId, person_id: UserId) -> StoreResult<()>;
    async fn remove_member(&self, chat_id: ChatId, person_id: UserId) -> StoreResult<()>;
    /// Every chat the user belongs to.
    async fn get_user_chats(&self, user_id: UserId) -> StoreResult<Vec<ChatId>>;
    /// One page of the user's chats in membership order. `page` starts at 1.
    async fn get_chat_ids(&self, user_id: UserId, page: u32, page_size: u32) -> StoreResult<Vec<ChatId>>;
    async fn get_chat_summary(&self, chat_id: ChatId) -> StoreResult<ChatSummary>;
    async fn update_chat(&self, chat: Chat) -> StoreResult<()>;
    /// Delete a chat on behalf of one of its members.
    async fn delete_chat(&self, chat_id: ChatId, user_id: UserId) -> StoreResult<()>;
}

pub(crate) fn page_offset(page: u32, page_size: u32) -> u64 {
    u64::from(page.saturating_sub(1)) * u64::from(page_size)
}
