use std::{fmt, sync::Arc};

use futures_util::{Stream, StreamExt};
use tracing::{debug, error, info, warn};

use crate::{
    error::{ChatError, ChatResult},
    messenger::Messenger,
    models::{ChatId, UserId},
};

use super::{Connection, ConnectionId, ConnectionRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    Closed,
}

/// Why a read loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    ClientClosed,
    StreamEnded,
    ReadError,
    DecodeError,
    /// Membership lookup failed before activation.
    Rejected,
    Shutdown,
}

/// Inbound transport frame, already stripped of transport detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Close,
    /// Binary, ping, pong: nothing for the session to do.
    Ignored,
}

/// Extract the connecting user's identity from the raw request parameter.
pub fn parse_user_id(raw: Option<&str>) -> ChatResult<UserId> {
    let raw = raw.ok_or_else(|| ChatError::Connection("missing user_id".to_owned()))?;
    let user_id = raw
        .parse::<UserId>()
        .map_err(|e| ChatError::Connection(format!("invalid user_id {raw:?}: {e}")))?;
    if user_id.is_nil() {
        return Err(ChatError::Connection("nil user_id".to_owned()));
    }
    Ok(user_id)
}

/// Releases the user's registry slots when dropped, whichever way the session ends.
struct Registration {
    registry: Arc<ConnectionRegistry>,
    user_id: UserId,
    connection_id: ConnectionId,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.unsubscribe_connection(self.user_id, self.connection_id);
        debug!(user_id = %self.user_id, connection = %self.connection_id, "unsubscribed");
    }
}

/// One transport connection's place in the lifecycle.
///
/// Starts `Connecting`; [`activate`](Self::activate) registers it under the
/// user's chats. Every exit path, drop included, releases the registry slots once.
pub struct Session {
    connection: Connection,
    chats: usize,
    state: SessionState,
    registration: Option<Registration>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Session")
            .field("connection", &self.connection.id())
            .field("user_id", &self.connection.user_id())
            .field("chats", &self.chats)
            .field("state", &self.state)
            .finish()
    }
}

impl Session {
    pub fn new(connection: Connection) -> Self {
        Self {
            connection,
            chats: 0,
            state: SessionState::Connecting,
            registration: None,
        }
    }

    /// Subscribe the connection under each of `chats` and go `Active`.
    /// Only a `Connecting` session can be activated.
    pub fn activate(&mut self, registry: Arc<ConnectionRegistry>, chats: &[ChatId]) {
        if self.state != SessionState::Connecting {
            return;
        }

        let user_id = self.user_id();
        for &chat_id in chats {
            registry.subscribe(chat_id, user_id, self.connection.clone());
        }

        self.registration = Some(Registration {
            registry,
            user_id,
            connection_id: self.connection.id(),
        });
        self.chats = chats.len();
        self.state = SessionState::Active;
    }

    pub fn user_id(&self) -> UserId {
        self.connection.user_id()
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Number of chats the session was subscribed to at connect time.
    pub fn chat_count(&self) -> usize {
        self.chats
    }

    /// Blocking read loop. Each text frame goes through the broadcast pipeline;
    /// a failed send is logged and the loop keeps going, a frame that does not
    /// decode ends the session.
    pub async fn run<S, E>(mut self, messenger: &Messenger, mut inbound: S) -> CloseReason
    where
        S: Stream<Item = Result<Frame, E>> + Unpin,
        E: fmt::Display,
    {
        let user_id = self.user_id();
        let reason = loop {
            match inbound.next().await {
                Some(Ok(Frame::Text(text))) => match messenger.on_frame(user_id, &text).await {
                    Ok(message) => {
                        debug!(user_id = %user_id, message_id = %message.id, "frame accepted");
                    }
                    Err(ChatError::Decode(e)) => {
                        warn!(user_id = %user_id, error = %e, "undecodable frame, closing session");
                        break CloseReason::DecodeError;
                    }
                    Err(e) => {
                        error!(user_id = %user_id, error = %e, "failed to send message");
                    }
                },
                Some(Ok(Frame::Close)) => break CloseReason::ClientClosed,
                Some(Ok(Frame::Ignored)) => {}
                Some(Err(e)) => {
                    warn!(user_id = %user_id, error = %e, "socket read failed");
                    break CloseReason::ReadError;
                }
                None => break CloseReason::StreamEnded,
            }
        };

        self.close(reason);
        reason
    }

    /// Transition to `Closed`, releasing the registry slots exactly once.
    pub fn close(&mut self, reason: CloseReason) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closed;
        self.registration.take();
        info!(
            user_id = %self.user_id(),
            connection = %self.connection.id(),
            reason = ?reason,
            "session closed"
        );
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close(CloseReason::Shutdown);
    }
}

#[cfg(test)]
mod tests {
    use futures_util::stream;
    use uuid::Uuid;

    use super::*;
    use crate::{
        messenger::MessengerOptions,
        models::{Message, NewChat},
        store::MemoryStore,
    };

    fn frames(items: Vec<Result<Frame, &'static str>>) -> impl Stream<Item = Result<Frame, &'static str>> + Unpin {
        stream::iter(items)
    }

    async fn connected(members: usize) -> (Messenger, ChatId, Vec<UserId>) {
        let store = Arc::new(MemoryStore::new());
        let messenger = Messenger::new(store.clone(), store, MessengerOptions::default());
        let users: Vec<UserId> = (0..members).map(|_| Uuid::now_v7()).collect();
        let chat_id = messenger
            .create_chat(NewChat { name: "Team".into(), person_ids: users.clone() })
            .await
            .unwrap();
        (messenger, chat_id, users)
    }

    #[test]
    fn user_id_must_be_present_valid_and_non_nil() {
        assert!(matches!(parse_user_id(None), Err(ChatError::Connection(_))));
        assert!(matches!(parse_user_id(Some("not-a-uuid")), Err(ChatError::Connection(_))));
        assert!(matches!(
            parse_user_id(Some("00000000-0000-0000-0000-000000000000")),
            Err(ChatError::Connection(_))
        ));

        let id = Uuid::now_v7();
        assert_eq!(parse_user_id(Some(&id.to_string())).unwrap(), id);
    }

    #[test]
    fn dropping_an_active_session_unsubscribes() {
        let registry = Arc::new(ConnectionRegistry::new());
        let user = Uuid::now_v7();
        let chats = [Uuid::now_v7(), Uuid::now_v7()];
        let (conn, _rx) = Connection::open(user, 4);

        let mut session = Session::new(conn);
        assert_eq!(session.state(), SessionState::Connecting);
        session.activate(registry.clone(), &chats);
        assert_eq!(session.state(), SessionState::Active);
        assert!(chats.iter().all(|&c| registry.is_subscribed(c, user)));

        drop(session);
        assert_eq!(registry.chat_count(), 0);
    }

    #[test]
    fn closed_session_cannot_be_activated() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (conn, _rx) = Connection::open(Uuid::now_v7(), 4);
        let mut session = Session::new(conn);

        session.close(CloseReason::Rejected);
        session.activate(registry.clone(), &[Uuid::now_v7()]);

        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(registry.chat_count(), 0);
    }

    #[test]
    fn second_close_leaves_a_newer_connection_alone() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (user, chat) = (Uuid::now_v7(), Uuid::now_v7());
        let (conn, _rx) = Connection::open(user, 4);
        let mut session = Session::new(conn);
        session.activate(registry.clone(), &[chat]);

        session.close(CloseReason::ClientClosed);
        let (newer, _newer_rx) = Connection::open(user, 4);
        registry.subscribe(chat, user, newer);
        session.close(CloseReason::Shutdown);
        drop(session);

        assert!(registry.is_subscribed(chat, user));
    }

    #[tokio::test]
    async fn run_sends_text_frames_until_close() {
        let (messenger, chat, users) = connected(2).await;
        let (writer, reader) = (users[0], users[1]);
        let (reader_conn, mut reader_rx) = messenger.open_connection(reader);
        let _reader_session = messenger.on_connect(reader_conn).await.unwrap();
        let (writer_conn, _writer_rx) = messenger.open_connection(writer);
        let session = messenger.on_connect(writer_conn).await.unwrap();

        let inbound = frames(vec![
            Ok(Frame::Text(format!(r#"{{"chatId":"{chat}","message":"one"}}"#))),
            Ok(Frame::Ignored),
            Ok(Frame::Text(format!(r#"{{"chatId":"{chat}","message":"two"}}"#))),
            Ok(Frame::Close),
            Ok(Frame::Text(format!(r#"{{"chatId":"{chat}","message":"never"}}"#))),
        ]);

        assert_eq!(session.run(&messenger, inbound).await, CloseReason::ClientClosed);

        let mut texts = Vec::new();
        while let Ok(frame) = reader_rx.try_recv() {
            texts.push(serde_json::from_str::<Message>(&frame).unwrap().text);
        }
        assert_eq!(texts, ["one", "two"]);
        assert!(!messenger.registry().is_subscribed(chat, writer));
        assert!(messenger.registry().is_subscribed(chat, reader));
    }

    #[tokio::test]
    async fn failed_send_keeps_the_loop_going() {
        let (messenger, chat, users) = connected(1).await;
        let (conn, mut rx) = messenger.open_connection(users[0]);
        let session = messenger.on_connect(conn).await.unwrap();

        let unknown_chat = Uuid::now_v7();
        let inbound = frames(vec![
            Ok(Frame::Text(format!(r#"{{"chatId":"{unknown_chat}","message":"lost"}}"#))),
            Ok(Frame::Text(format!(r#"{{"chatId":"{chat}","message":"kept"}}"#))),
        ]);

        assert_eq!(session.run(&messenger, inbound).await, CloseReason::StreamEnded);
        let delivered: Message = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(delivered.text, "kept");
    }

    #[tokio::test]
    async fn undecodable_frame_ends_the_session() {
        let (messenger, chat, users) = connected(1).await;
        let (conn, _rx) = messenger.open_connection(users[0]);
        let session = messenger.on_connect(conn).await.unwrap();

        let inbound = frames(vec![
            Ok(Frame::Text("{\"chatId\": 7".into())),
            Ok(Frame::Text(format!(r#"{{"chatId":"{chat}","message":"after"}}"#))),
        ]);

        assert_eq!(session.run(&messenger, inbound).await, CloseReason::DecodeError);
        assert!(messenger.history(chat).await.unwrap().is_empty());
        assert_eq!(messenger.registry().chat_count(), 0);
    }

    #[tokio::test]
    async fn read_error_ends_the_session() {
        let (messenger, _, users) = connected(1).await;
        let (conn, _rx) = messenger.open_connection(users[0]);
        let session = messenger.on_connect(conn).await.unwrap();

        let inbound = frames(vec![Err("connection reset")]);

        assert_eq!(session.run(&messenger, inbound).await, CloseReason::ReadError);
        assert_eq!(messenger.registry().chat_count(), 0);
    }
}
