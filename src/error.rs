use thiserror::Error;

use crate::realtime::ConnectionId;

/// Failure reported by a `MessageStore` or `ChatDirectory` variant.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error)]
pub enum ChatError {
    /// Malformed identifiers or pagination, rejected before any store call.
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("{op}: {source}")]
    Upstream {
        op: &'static str,
        #[source]
        source: StoreError,
    },

    /// A subscriber write failed. Logged by the broadcast pipeline, never returned to senders.
    #[error("delivery to connection {connection} failed: {reason}")]
    Delivery {
        connection: ConnectionId,
        reason: &'static str,
    },

    #[error("connection rejected: {0}")]
    Connection(String),

    #[error("malformed frame: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{0}")]
    Internal(String),
}

impl ChatError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        ChatError::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub fn upstream(op: &'static str, source: StoreError) -> Self {
        ChatError::Upstream { op, source }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ChatError::Upstream {
                source: StoreError::NotFound,
                ..
            }
        )
    }
}

pub type ChatResult<T> = Result<T, ChatError>;
