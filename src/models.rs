use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

pub type UserId = Uuid;
pub type ChatId = Uuid;
pub type MessageId = Uuid;

/// Longest chat name the directory accepts.
pub const MAX_CHAT_NAME_LEN: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: ChatId,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    #[default]
    NotRead,
    Read,
    Deleted,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        use MessageStatus::*;
        match self {
            NotRead => "not_read",
            Read => "read",
            Deleted => "deleted",
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_read" => Ok(MessageStatus::NotRead),
            "read" => Ok(MessageStatus::Read),
            "deleted" => Ok(MessageStatus::Deleted),
            other => Err(format!("unknown message status {other:?}")),
        }
    }
}

/// A persisted chat message. `id` and `sending_time` are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub person_id: UserId,
    pub chat_id: ChatId,
    #[serde(rename = "message")]
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub sending_time: OffsetDateTime,
    pub status: MessageStatus,
}

/// Request to create a message, from either a socket frame or `POST /messages`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    pub person_id: UserId,
    pub chat_id: ChatId,
    #[serde(rename = "message")]
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageUpdate {
    pub id: MessageId,
    #[serde(rename = "message")]
    pub text: String,
    /// Left unchanged when absent.
    #[serde(default)]
    pub status: Option<MessageStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewChat {
    pub name: String,
    #[serde(default)]
    pub person_ids: Vec<UserId>,
}

/// Listing projection of a chat: its name and the latest visible message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    pub name: String,
    pub last_message: Option<Message>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_its_column_text() {
        for status in [MessageStatus::NotRead, MessageStatus::Read, MessageStatus::Deleted] {
            assert_eq!(status.as_str().parse::<MessageStatus>(), Ok(status));
        }
        assert!("read it".parse::<MessageStatus>().is_err());
    }

    #[test]
    fn message_serializes_with_wire_names() {
        let message = Message {
            id: Uuid::nil(),
            person_id: Uuid::nil(),
            chat_id: Uuid::nil(),
            text: "hi".to_owned(),
            sending_time: OffsetDateTime::UNIX_EPOCH,
            status: MessageStatus::NotRead,
        };

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["message"], "hi");
        assert_eq!(json["personId"], Uuid::nil().to_string());
        assert_eq!(json["sendingTime"], "1970-01-01T00:00:00Z");
        assert_eq!(json["status"], "not_read");
    }

    #[test]
    fn message_update_keeps_status_when_absent() {
        let update: MessageUpdate = serde_json::from_str(
            r#"{"id":"00000000-0000-0000-0000-000000000000","message":"edited"}"#,
        )
        .unwrap();
        assert_eq!(update.status, None);
        assert_eq!(update.text, "edited");
    }
}
