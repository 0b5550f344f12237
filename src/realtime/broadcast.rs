//! The single path from an accepted message to its chat's live subscribers.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::{
    error::{ChatError, ChatResult},
    models::{Message, NewMessage},
    store::MessageStore,
};

use super::{ConnectionRegistry, OutboundFrame};

/// Outcome of one fan-out.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub recipients: usize,
    pub delivered: usize,
}

impl DeliveryReport {
    pub fn failed(&self) -> usize {
        self.recipients - self.delivered
    }
}

#[derive(Clone)]
pub struct Broadcaster {
    messages: Arc<dyn MessageStore>,
    registry: Arc<ConnectionRegistry>,
}

impl Broadcaster {
    pub fn new(messages: Arc<dyn MessageStore>, registry: Arc<ConnectionRegistry>) -> Self {
        Self { messages, registry }
    }

    /// Validate, persist, then distribute.
    ///
    /// Returns once the message is stored and enqueued for every current
    /// subscriber, so one caller's sequential sends reach each subscriber in order.
    /// Delivery failures never fail the call.
    pub async fn ingest(&self, request: NewMessage) -> ChatResult<Message> {
        validate(&request)?;

        let message = self
            .messages
            .add(request)
            .await
            .map_err(|source| ChatError::upstream("messages.add", source))?;

        self.distribute(&message);
        Ok(message)
    }

    /// Best-effort, at-most-once write of `message` to every subscriber of its chat.
    pub fn distribute(&self, message: &Message) -> DeliveryReport {
        let frame: OutboundFrame = match serde_json::to_string(message) {
            Ok(json) => Arc::from(json),
            Err(e) => {
                warn!(message_id = %message.id, error = %e, "failed to serialize message");
                return DeliveryReport::default();
            }
        };

        let subscribers = self.registry.subscribers_of(message.chat_id);
        let mut report = DeliveryReport {
            recipients: subscribers.len(),
            delivered: 0,
        };

        for subscriber in &subscribers {
            match subscriber.push(Arc::clone(&frame)) {
                Ok(()) => report.delivered += 1,
                Err(e) => warn!(
                    chat_id = %message.chat_id,
                    user_id = %subscriber.user_id(),
                    error = %e,
                    "dropping message for subscriber"
                ),
            }
        }

        debug!(
            chat_id = %message.chat_id,
            message_id = %message.id,
            recipients = report.recipients,
            delivered = report.delivered,
            "broadcast message"
        );
        report
    }
}

fn validate(request: &NewMessage) -> ChatResult<()> {
    if request.chat_id.is_nil() {
        return Err(ChatError::validation("chatId", "must not be empty"));
    }
    if request.person_id.is_nil() {
        return Err(ChatError::validation("personId", "must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::{
        models::{Chat, ChatId, UserId},
        realtime::Connection,
        store::{ChatDirectory, MemoryStore},
    };

    struct Fixture {
        store: Arc<MemoryStore>,
        registry: Arc<ConnectionRegistry>,
        broadcaster: Broadcaster,
        chat_id: ChatId,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(ConnectionRegistry::new());
        let chat_id = store
            .create_chat(Chat { id: Uuid::now_v7(), name: "Team".into() }, &[])
            .await
            .unwrap();
        let broadcaster = Broadcaster::new(store.clone(), registry.clone());
        Fixture { store, registry, broadcaster, chat_id }
    }

    fn request(person_id: UserId, chat_id: ChatId, text: &str) -> NewMessage {
        NewMessage { person_id, chat_id, text: text.to_owned() }
    }

    fn decode(frame: &str) -> Message {
        serde_json::from_str(frame).unwrap()
    }

    #[tokio::test]
    async fn ingest_persists_and_delivers() {
        let fx = fixture().await;
        let (reader, sender) = (Uuid::now_v7(), Uuid::now_v7());
        let (conn, mut rx) = Connection::open(reader, 8);
        fx.registry.subscribe(fx.chat_id, reader, conn);

        let message = fx.broadcaster.ingest(request(sender, fx.chat_id, "hi")).await.unwrap();

        let received = decode(&rx.recv().await.unwrap());
        assert_eq!(received, message);
        assert_eq!(fx.store.get_by_id(message.id).await.unwrap().text, "hi");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn dead_subscriber_does_not_block_others() {
        let fx = fixture().await;
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
        let (dead, dead_rx) = Connection::open(a, 8);
        let (live, mut live_rx) = Connection::open(b, 8);
        drop(dead_rx);
        fx.registry.subscribe(fx.chat_id, a, dead);
        fx.registry.subscribe(fx.chat_id, b, live);

        let message = fx
            .broadcaster
            .ingest(request(Uuid::now_v7(), fx.chat_id, "still here"))
            .await
            .unwrap();

        assert_eq!(decode(&live_rx.recv().await.unwrap()).id, message.id);
    }

    #[tokio::test]
    async fn report_counts_failures() {
        let fx = fixture().await;
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
        let (dead, dead_rx) = Connection::open(a, 8);
        let (live, _live_rx) = Connection::open(b, 8);
        drop(dead_rx);
        fx.registry.subscribe(fx.chat_id, a, dead);
        fx.registry.subscribe(fx.chat_id, b, live);

        let message = fx.store.add(request(b, fx.chat_id, "x")).await.unwrap();
        let report = fx.broadcaster.distribute(&message);

        assert_eq!(report, DeliveryReport { recipients: 2, delivered: 1 });
        assert_eq!(report.failed(), 1);
    }

    #[tokio::test]
    async fn sequential_ingests_arrive_in_order() {
        let fx = fixture().await;
        let (reader, sender) = (Uuid::now_v7(), Uuid::now_v7());
        let (conn, mut rx) = Connection::open(reader, 16);
        fx.registry.subscribe(fx.chat_id, reader, conn);

        for text in ["first", "second", "third"] {
            fx.broadcaster.ingest(request(sender, fx.chat_id, text)).await.unwrap();
        }

        let mut texts = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            texts.push(decode(&frame).text);
        }
        assert_eq!(texts, ["first", "second", "third"]);
    }

    #[tokio::test]
    async fn persist_failure_skips_broadcast() {
        let fx = fixture().await;
        let reader = Uuid::now_v7();
        let missing_chat = Uuid::now_v7();
        let (conn, mut rx) = Connection::open(reader, 8);
        fx.registry.subscribe(missing_chat, reader, conn);

        let err = fx
            .broadcaster
            .ingest(request(Uuid::now_v7(), missing_chat, "lost"))
            .await
            .unwrap_err();

        assert!(matches!(err, ChatError::Upstream { op: "messages.add", .. }));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn nil_ids_are_rejected_before_persisting() {
        let fx = fixture().await;

        let err = fx
            .broadcaster
            .ingest(request(Uuid::nil(), fx.chat_id, "who?"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Validation { field: "personId", .. }));

        let err = fx
            .broadcaster
            .ingest(request(Uuid::now_v7(), Uuid::nil(), "where?"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Validation { field: "chatId", .. }));

        assert!(fx.store.get_by_chat(fx.chat_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn other_chats_are_not_notified() {
        let fx = fixture().await;
        let outsider = Uuid::now_v7();
        let (conn, mut rx) = Connection::open(outsider, 8);
        fx.registry.subscribe(Uuid::now_v7(), outsider, conn);

        fx.broadcaster
            .ingest(request(Uuid::now_v7(), fx.chat_id, "private"))
            .await
            .unwrap();

        assert!(rx.try_recv().is_err());
    }
}
