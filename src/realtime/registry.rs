use std::collections::HashMap;

use parking_lot::RwLock;

use crate::models::{ChatId, UserId};

use super::{Connection, ConnectionId};

/// Index from chat to the connections of its currently connected members.
///
/// One slot per (chat, user): a second connection for the same user replaces
/// the first. Chat entries are pruned as soon as their last member leaves.
/// Critical sections only touch the map; no I/O happens under the lock.
#[derive(Default)]
pub struct ConnectionRegistry {
    chats: RwLock<HashMap<ChatId, HashMap<UserId, Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the user's slot in a chat.
    pub fn subscribe(&self, chat_id: ChatId, user_id: UserId, connection: Connection) {
        let previous = self
            .chats
            .write()
            .entry(chat_id)
            .or_default()
            .insert(user_id, connection);

        if let Some(previous) = previous {
            tracing::debug!(
                chat_id = %chat_id,
                user_id = %user_id,
                replaced = %previous.id(),
                "connection slot overwritten"
            );
        }
    }

    /// Subscribe the user's live connection, if any, under another chat.
    ///
    /// Lookup and insert share one write lock, so a connection released
    /// concurrently is never put back. Returns whether a connection was found.
    pub fn project(&self, chat_id: ChatId, user_id: UserId) -> bool {
        let mut chats = self.chats.write();
        let Some(connection) = chats.values().find_map(|members| members.get(&user_id).cloned()) else {
            return false;
        };
        chats.entry(chat_id).or_default().insert(user_id, connection);
        true
    }

    /// Remove the user from every chat. A user that was never registered is a no-op.
    pub fn unsubscribe(&self, user_id: UserId) {
        self.remove_where(|slot_user, _| slot_user == user_id);
    }

    /// Like [`unsubscribe`](Self::unsubscribe), but leaves slots that a newer
    /// connection of the same user has since taken over.
    pub fn unsubscribe_connection(&self, user_id: UserId, connection_id: ConnectionId) {
        self.remove_where(|slot_user, slot| slot_user == user_id && slot.id() == connection_id);
    }

    fn remove_where(&self, matches: impl Fn(UserId, &Connection) -> bool) {
        let mut chats = self.chats.write();
        chats.retain(|_, members| {
            members.retain(|&user_id, connection| !matches(user_id, connection));
            !members.is_empty()
        });
    }

    /// Snapshot of a chat's subscribers. Handles may close right after the lock is released.
    pub fn subscribers_of(&self, chat_id: ChatId) -> Vec<Connection> {
        self.chats
            .read()
            .get(&chat_id)
            .map(|members| members.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Any live handle of the user, found by walking all chat entries.
    pub fn connection_of(&self, user_id: UserId) -> Option<Connection> {
        self.chats
            .read()
            .values()
            .find_map(|members| members.get(&user_id).cloned())
    }

    pub fn chat_count(&self) -> usize {
        self.chats.read().len()
    }

    pub fn is_subscribed(&self, chat_id: ChatId, user_id: UserId) -> bool {
        self.chats
            .read()
            .get(&chat_id)
            .is_some_and(|members| members.contains_key(&user_id))
    }
}
