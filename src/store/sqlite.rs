use async_trait::async_trait;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    error::StoreError,
    models::{Chat, ChatId, ChatSummary, Message, MessageId, MessageStatus, MessageUpdate, NewMessage, UserId},
};

use super::{ChatDirectory, MessageStore, StoreResult, page_offset};

type MessageRow = (String, String, String, String, OffsetDateTime, String);

const MESSAGE_COLUMNS: &str = "id,person_id,chat_id,message,sending_time,status";

/// Chats, memberships and messages in one SQLite database.
#[derive(Clone)]
pub struct SqliteStore {
    db_pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(db_pool: SqlitePool) -> Self {
        Self { db_pool }
    }

    async fn chat_exists(&self, chat_id: ChatId) -> StoreResult<bool> {
        Ok(sqlx::query("SELECT 1 FROM chats WHERE id=?")
            .bind(chat_id.to_string())
            .fetch_optional(&self.db_pool)
            .await?
            .is_some())
    }
}

fn parse_id(column: &str, value: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(value).map_err(|e| StoreError::Corrupt(format!("{column} {value:?}: {e}")))
}

fn message_from_row((id, person_id, chat_id, text, sending_time, status): MessageRow) -> StoreResult<Message> {
    Ok(Message {
        id: parse_id("id", &id)?,
        person_id: parse_id("person_id", &person_id)?,
        chat_id: parse_id("chat_id", &chat_id)?,
        text,
        sending_time,
        status: status.parse().map_err(StoreError::Corrupt)?,
    })
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn add(&self, NewMessage { person_id, chat_id, text }: NewMessage) -> StoreResult<Message> {
        if !self.chat_exists(chat_id).await? {
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

        sqlx::query("INSERT INTO messages (id,person_id,chat_id,message,sending_time,status) VALUES (?,?,?,?,?,?)")
            .bind(message.id.to_string())
            .bind(message.person_id.to_string())
            .bind(message.chat_id.to_string())
            .bind(&message.text)
            .bind(message.sending_time)
            .bind(message.status.as_str())
            .execute(&self.db_pool)
            .await?;

        Ok(message)
    }

    async fn get_by_chat(&self, chat_id: ChatId) -> StoreResult<Vec<Message>> {
        let rows: Vec<MessageRow> = sqlx::query_as(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE chat_id=? AND status<>'deleted' ORDER BY sending_time,id"
        ))
        .bind(chat_id.to_string())
        .fetch_all(&self.db_pool)
        .await?;

        rows.into_iter().map(message_from_row).collect()
    }

    async fn get_by_id(&self, id: MessageId) -> StoreResult<Message> {
        let row: Option<MessageRow> = sqlx::query_as(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id=? AND status<>'deleted'"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.db_pool)
        .await?;

        message_from_row(row.ok_or(StoreError::NotFound)?)
    }

    async fn update(&self, MessageUpdate { id, text, status }: MessageUpdate) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE messages SET message=?, status=COALESCE(?, status) WHERE id=? AND status<>'deleted'",
        )
        .bind(&text)
        .bind(status.as_ref().map(MessageStatus::as_str))
        .bind(id.to_string())
        .execute(&self.db_pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete(&self, id: MessageId) -> StoreResult<()> {
        let result = sqlx::query("UPDATE messages SET status='deleted' WHERE id=? AND status<>'deleted'")
            .bind(id.to_string())
            .execute(&self.db_pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl ChatDirectory for SqliteStore {
    async fn create_chat(&self, chat: Chat, person_ids: &[UserId]) -> StoreResult<ChatId> {
        let mut tx = self.db_pool.begin().await?;

        sqlx::query("INSERT INTO chats (id,name) VALUES (?,?)")
            .bind(chat.id.to_string())
            .bind(&chat.name)
            .execute(&mut *tx)
            .await?;

        for person_id in person_ids {
            sqlx::query("INSERT OR IGNORE INTO chat_members (chat_id,person_id) VALUES (?,?)")
                .bind(chat.id.to_string())
                .bind(person_id.to_string())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(chat.id)
    }

    async fn add_member(&self, chat_id: ChatId, person_id: UserId) -> StoreResult<()> {
        if !self.chat_exists(chat_id).await? {
            return Err(StoreError::NotFound);
        }

        sqlx::query("INSERT OR IGNORE INTO chat_members (chat_id,person_id) VALUES (?,?)")
            .bind(chat_id.to_string())
            .bind(person_id.to_string())
            .execute(&self.db_pool)
            .await?;
        Ok(())
    }

    async fn remove_member(&self, chat_id: ChatId, person_id: UserId) -> StoreResult<()> {
        sqlx::query("DELETE FROM chat_members WHERE chat_id=? AND person_id=?")
            .bind(chat_id.to_string())
            .bind(person_id.to_string())
            .execute(&self.db_pool)
            .await?;
        Ok(())
    }

    async fn get_user_chats(&self, user_id: UserId) -> StoreResult<Vec<ChatId>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT chat_id FROM chat_members WHERE person_id=? ORDER BY rowid")
            .bind(user_id.to_string())
            .fetch_all(&self.db_pool)
            .await?;

        rows.iter().map(|(chat_id,)| parse_id("chat_id", chat_id)).collect()
    }

    async fn get_chat_ids(&self, user_id: UserId, page: u32, page_size: u32) -> StoreResult<Vec<ChatId>> {
        let offset = i64::try_from(page_offset(page, page_size)).unwrap_or(i64::MAX);
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT chat_id FROM chat_members WHERE person_id=? ORDER BY rowid LIMIT ? OFFSET ?")
                .bind(user_id.to_string())
                .bind(i64::from(page_size))
                .bind(offset)
                .fetch_all(&self.db_pool)
                .await?;

        rows.iter().map(|(chat_id,)| parse_id("chat_id", chat_id)).collect()
    }

    async fn get_chat_summary(&self, chat_id: ChatId) -> StoreResult<ChatSummary> {
        let Some((name,)): Option<(String,)> = sqlx::query_as("SELECT name FROM chats WHERE id=?")
            .bind(chat_id.to_string())
            .fetch_optional(&self.db_pool)
            .await?
        else {
            return Err(StoreError::NotFound);
        };

        let last: Option<MessageRow> = sqlx::query_as(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE chat_id=? AND status<>'deleted' \
             ORDER BY sending_time DESC, id DESC LIMIT 1"
        ))
        .bind(chat_id.to_string())
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(ChatSummary {
            name,
            last_message: last.map(message_from_row).transpose()?,
        })
    }

    async fn update_chat(&self, Chat { id, name }: Chat) -> StoreResult<()> {
        let result = sqlx::query("UPDATE chats SET name=? WHERE id=?")
            .bind(&name)
            .bind(id.to_string())
            .execute(&self.db_pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete_chat(&self, chat_id: ChatId, user_id: UserId) -> StoreResult<()> {
        let mut tx = self.db_pool.begin().await?;

        let is_member = sqlx::query("SELECT 1 FROM chat_members WHERE chat_id=? AND person_id=?")
            .bind(chat_id.to_string())
            .bind(user_id.to_string())
            .fetch_optional(&mut *tx)
            .await?
            .is_some();
        if !is_member {
            return Err(StoreError::NotFound);
        }

        // members and messages go with the chat through ON DELETE CASCADE
        sqlx::query("DELETE FROM chats WHERE id=?")
            .bind(chat_id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
