//! Live delivery of persisted messages to the connected members of a chat.

pub mod broadcast;
pub mod registry;
pub mod session;

use std::{fmt, sync::Arc};

use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use crate::{error::ChatError, models::UserId};

pub use broadcast::{Broadcaster, DeliveryReport};
pub use registry::ConnectionRegistry;
pub use session::{CloseReason, Frame, Session, SessionState};

/// Serialized outbound frame, shared between every recipient of one broadcast.
pub type OutboundFrame = Arc<str>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Handle to one live transport connection.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    user_id: UserId,
    outbox: mpsc::Sender<OutboundFrame>,
}

impl Connection {
    /// Create a handle and the receiving end its writer task drains.
    pub fn open(user_id: UserId, capacity: usize) -> (Self, mpsc::Receiver<OutboundFrame>) {
        let (outbox, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                id: ConnectionId::new(),
                user_id,
                outbox,
            },
            rx,
        )
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn is_closed(&self) -> bool {
        self.outbox.is_closed()
    }

    /// Non-blocking write. Never waits on a slow peer.
    pub fn push(&self, frame: OutboundFrame) -> Result<(), ChatError> {
        self.outbox.try_send(frame).map_err(|e| ChatError::Delivery {
            connection: self.id,
            reason: match e {
                TrySendError::Full(_) => "outbox full",
                TrySendError::Closed(_) => "connection closed",
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn push_reaches_the_writer_side() {
        let (conn, mut rx) = Connection::open(Uuid::now_v7(), 4);
        conn.push(Arc::from("hello")).unwrap();
        assert_eq!(&*rx.recv().await.unwrap(), "hello");
    }

    #[test]
    fn push_to_closed_connection_fails() {
        let (conn, rx) = Connection::open(Uuid::now_v7(), 4);
        drop(rx);
        assert!(conn.is_closed());

        let err = conn.push(Arc::from("late")).unwrap_err();
        assert!(matches!(err, ChatError::Delivery { reason: "connection closed", .. }));
    }

    #[test]
    fn push_to_full_outbox_fails_without_blocking() {
        let (conn, _rx) = Connection::open(Uuid::now_v7(), 1);
        conn.push(Arc::from("one")).unwrap();

        let err = conn.push(Arc::from("two")).unwrap_err();
        assert!(matches!(err, ChatError::Delivery { reason: "outbox full", .. }));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let (conn, _rx) = Connection::open(Uuid::now_v7(), 0);
        assert!(conn.push(Arc::from("fits")).is_ok());
    }
}
