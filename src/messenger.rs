//! The delivery core as seen by socket and REST handlers.

use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use crate::{
    chats::SummaryAggregator,
    error::{ChatError, ChatResult},
    models::{
        Chat, ChatId, ChatSummary, MAX_CHAT_NAME_LEN, Message, MessageId, MessageStatus,
        MessageUpdate, NewChat, NewMessage, UserId,
    },
    realtime::{Broadcaster, CloseReason, Connection, ConnectionRegistry, OutboundFrame, Session},
    store::{ChatDirectory, MessageStore},
};

#[derive(Debug, Clone, Copy)]
pub struct MessengerOptions {
    /// Frames buffered per connection before new ones are dropped.
    pub outbox_capacity: usize,
    /// Cap on concurrent summary fetches per listing call. `None` fetches the whole page at once.
    pub summary_fanout_limit: Option<usize>,
}

impl Default for MessengerOptions {
    fn default() -> Self {
        Self {
            outbox_capacity: 64,
            summary_fanout_limit: None,
        }
    }
}

/// Text frame sent by a connected client.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FrameRequest {
    chat_id: ChatId,
    #[serde(rename = "message")]
    text: String,
    #[serde(default)]
    person_id: Option<UserId>,
}

#[derive(Clone)]
pub struct Messenger {
    messages: Arc<dyn MessageStore>,
    chats: Arc<dyn ChatDirectory>,
    registry: Arc<ConnectionRegistry>,
    broadcaster: Broadcaster,
    summaries: SummaryAggregator,
    options: MessengerOptions,
}

impl Messenger {
    pub fn new(
        messages: Arc<dyn MessageStore>,
        chats: Arc<dyn ChatDirectory>,
        options: MessengerOptions,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        Self {
            broadcaster: Broadcaster::new(Arc::clone(&messages), Arc::clone(&registry)),
            summaries: SummaryAggregator::new(Arc::clone(&chats), options.summary_fanout_limit),
            messages,
            chats,
            registry,
            options,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// A fresh transport handle for `user_id` and the outbox its writer task drains.
    pub fn open_connection(&self, user_id: UserId) -> (Connection, mpsc::Receiver<OutboundFrame>) {
        Connection::open(user_id, self.options.outbox_capacity)
    }

    /// Resolve the user's chats and register the connection under each of them.
    ///
    /// When the directory lookup fails the session is closed without touching the registry.
    pub async fn on_connect(&self, connection: Connection) -> ChatResult<Session> {
        let user_id = connection.user_id();
        let mut session = Session::new(connection);

        let chats = match self.chats.get_user_chats(user_id).await {
            Ok(chats) => chats,
            Err(e) => {
                session.close(CloseReason::Rejected);
                return Err(ChatError::Connection(format!(
                    "chats.get_user_chats for {user_id}: {e}"
                )));
            }
        };

        session.activate(Arc::clone(&self.registry), &chats);
        info!(user_id = %user_id, chats = chats.len(), "session active");
        Ok(session)
    }

    /// Decode one inbound frame and send it on behalf of the session user.
    pub async fn on_frame(&self, user_id: UserId, raw: &str) -> ChatResult<Message> {
        let FrameRequest { chat_id, text, person_id } = serde_json::from_str(raw)?;
        if person_id.is_some_and(|person_id| person_id != user_id) {
            return Err(ChatError::validation("personId", "does not match the connected user"));
        }

        self.send(NewMessage { person_id: user_id, chat_id, text }).await
    }

    /// Release the registry slots held by `connection`. Safe to call more than once.
    pub fn on_disconnect(&self, connection: &Connection) {
        self.registry.unsubscribe_connection(connection.user_id(), connection.id());
    }

    /// Persist a message and broadcast it to the chat's connected members.
    pub async fn send(&self, request: NewMessage) -> ChatResult<Message> {
        self.broadcaster.ingest(request).await
    }

    pub async fn list_chat_summaries(
        &self,
        user_id: UserId,
        page: i64,
        page_size: i64,
    ) -> ChatResult<Vec<ChatSummary>> {
        require_id("userId", user_id)?;
        self.summaries.list(user_id, page, page_size).await
    }

    pub async fn history(&self, chat_id: ChatId) -> ChatResult<Vec<Message>> {
        self.messages
            .get_by_chat(chat_id)
            .await
            .map_err(|source| ChatError::upstream("messages.get_by_chat", source))
    }

    pub async fn message(&self, id: MessageId) -> ChatResult<Message> {
        self.messages
            .get_by_id(id)
            .await
            .map_err(|source| ChatError::upstream("messages.get_by_id", source))
    }

    /// Edit a message's text and, when given, its read status.
    /// Deletion goes through [`delete_message`](Self::delete_message) only.
    pub async fn update_message(&self, update: MessageUpdate) -> ChatResult<()> {
        if update.status == Some(MessageStatus::Deleted) {
            return Err(ChatError::validation("status", "use delete to remove a message"));
        }
        self.messages
            .update(update)
            .await
            .map_err(|source| ChatError::upstream("messages.update", source))
    }

    pub async fn delete_message(&self, id: MessageId) -> ChatResult<()> {
        self.messages
            .delete(id)
            .await
            .map_err(|source| ChatError::upstream("messages.delete", source))
    }

    /// Create a chat and subscribe those members that are already connected.
    pub async fn create_chat(&self, NewChat { name, person_ids }: NewChat) -> ChatResult<ChatId> {
        let chat = Chat {
            id: Uuid::now_v7(),
            name: chat_name(name)?,
        };

        let chat_id = self
            .chats
            .create_chat(chat, &person_ids)
            .await
            .map_err(|source| ChatError::upstream("chats.create", source))?;

        for &person_id in &person_ids {
            self.registry.project(chat_id, person_id);
        }

        info!(chat_id = %chat_id, members = person_ids.len(), "chat created");
        Ok(chat_id)
    }

    pub async fn add_member(&self, chat_id: ChatId, person_id: UserId) -> ChatResult<()> {
        require_id("personId", person_id)?;
        self.chats
            .add_member(chat_id, person_id)
            .await
            .map_err(|source| ChatError::upstream("chats.add_member", source))
    }

    pub async fn remove_member(&self, chat_id: ChatId, person_id: UserId) -> ChatResult<()> {
        self.chats
            .remove_member(chat_id, person_id)
            .await
            .map_err(|source| ChatError::upstream("chats.remove_member", source))
    }

    pub async fn update_chat(&self, Chat { id, name }: Chat) -> ChatResult<()> {
        let chat = Chat { id, name: chat_name(name)? };
        self.chats
            .update_chat(chat)
            .await
            .map_err(|source| ChatError::upstream("chats.update", source))
    }

    /// Delete a chat on behalf of `user_id`, who must be one of its members.
    pub async fn delete_chat(&self, chat_id: ChatId, user_id: UserId) -> ChatResult<()> {
        self.chats
            .delete_chat(chat_id, user_id)
            .await
            .map_err(|source| ChatError::upstream("chats.delete", source))?;

        self.messages.forget_chat(chat_id).await;
        info!(chat_id = %chat_id, user_id = %user_id, "chat deleted");
        Ok(())
    }
}

fn require_id(field: &'static str, id: Uuid) -> ChatResult<()> {
    if id.is_nil() {
        return Err(ChatError::validation(field, "must not be empty"));
    }
    Ok(())
}

fn chat_name(name: String) -> ChatResult<String> {
    let name = name.trim().to_owned();
    if name.is_empty() {
        return Err(ChatError::validation("name", "must not be empty"));
    }
    if name.chars().count() > MAX_CHAT_NAME_LEN {
        return Err(ChatError::validation(
            "name",
            format!("longer than {MAX_CHAT_NAME_LEN} characters"),
        ));
    }
    Ok(name)
}
