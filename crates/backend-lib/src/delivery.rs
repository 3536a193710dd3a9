// ============================
// crates/backend-lib/src/delivery.rs
// ============================
//! Point-to-point chat delivery.
//!
//! A send is persist-then-deliver: the message is durably stored first,
//! then pushed to whichever of the two parties has a live connection.
//! Persistence failure is reported back to the caller issuing the send
//! and nothing is delivered; an offline party is silently skipped.

use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use taskhive_common::{DeliveredMessage, ServerEvent, UserId};
use tokio::time::timeout;

use crate::error::AppError;
use crate::registry::ConnectionRegistry;
use crate::store::MessageStore;

pub struct DeliveryEngine<S: ?Sized> {
    registry: Arc<ConnectionRegistry>,
    store: Arc<S>,
    persist_timeout: Duration,
}

impl<S: MessageStore + ?Sized> DeliveryEngine<S> {
    pub fn new(registry: Arc<ConnectionRegistry>, store: Arc<S>, persist_timeout: Duration) -> Self {
        Self {
            registry,
            store,
            persist_timeout,
        }
    }

    /// Handle a chat send request.
    ///
    /// Persists the message, re-reads it with identities expanded, then
    /// delivers `receiveMessage` to the receiver's live connection and
    /// echoes it to the sender's (multi-tab support). Returns the enriched
    /// message so the transport can ack the caller.
    ///
    /// # Errors
    /// - `Validation` when sender, receiver, or body is empty; nothing is
    ///   persisted.
    /// - `Persistence` when the gateway fails or exceeds its timeout;
    ///   nothing is delivered.
    pub async fn send(
        &self,
        sender: &UserId,
        receiver: &UserId,
        body: &str,
    ) -> Result<DeliveredMessage, AppError> {
        if sender.trim().is_empty() {
            return Err(AppError::Validation("sender is required".to_string()));
        }
        if receiver.trim().is_empty() {
            return Err(AppError::Validation("receiver is required".to_string()));
        }
        if body.trim().is_empty() {
            return Err(AppError::Validation("message is required".to_string()));
        }

        let stored = timeout(
            self.persist_timeout,
            self.store.create_message(sender, receiver, body),
        )
        .await
        .map_err(|_| {
            counter!("chat.persist_failure").increment(1);
            AppError::Persistence("message store timed out".to_string())
        })?
        .map_err(|e| {
            counter!("chat.persist_failure").increment(1);
            AppError::Persistence(e.to_string())
        })?;

        let enriched = timeout(
            self.persist_timeout,
            self.store.get_message_expanded(&stored.id),
        )
        .await
        .map_err(|_| AppError::Persistence("message store timed out".to_string()))?
        .map_err(|e| AppError::Persistence(e.to_string()))?;

        // Receiver first, then sender echo; either being offline is a
        // silent skip, not a failure.
        if let Some(conn) = self.registry.lookup(receiver) {
            if conn.send(ServerEvent::ReceiveMessage(enriched.clone())) {
                counter!("chat.delivered").increment(1);
            }
        } else {
            tracing::debug!(receiver = %receiver, "receiver offline, no realtime delivery");
        }

        if let Some(conn) = self.registry.lookup(sender) {
            if conn.send(ServerEvent::ReceiveMessage(enriched.clone())) {
                counter!("chat.delivered").increment(1);
            }
        }

        Ok(enriched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ConnectionHandle;
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use taskhive_common::{MessageId, StoredMessage};
    use tokio::sync::mpsc;

    /// Gateway double whose writes always fail
    struct FailingStore;

    #[async_trait]
    impl MessageStore for FailingStore {
        async fn create_message(
            &self,
            _sender: &UserId,
            _receiver: &UserId,
            _body: &str,
        ) -> Result<StoredMessage, AppError> {
            Err(AppError::Internal("disk on fire".to_string()))
        }

        async fn get_message_expanded(
            &self,
            _id: &MessageId,
        ) -> Result<DeliveredMessage, AppError> {
            Err(AppError::Internal("disk on fire".to_string()))
        }
    }

    /// Gateway double that hangs forever on writes
    struct StalledStore;

    #[async_trait]
    impl MessageStore for StalledStore {
        async fn create_message(
            &self,
            _sender: &UserId,
            _receiver: &UserId,
            _body: &str,
        ) -> Result<StoredMessage, AppError> {
            std::future::pending().await
        }

        async fn get_message_expanded(
            &self,
            _id: &MessageId,
        ) -> Result<DeliveredMessage, AppError> {
            std::future::pending().await
        }
    }

    fn engine_with_store<S: MessageStore>(
        store: S,
    ) -> (DeliveryEngine<S>, Arc<ConnectionRegistry>) {
        let registry = Arc::new(ConnectionRegistry::new());
        let engine = DeliveryEngine::new(
            registry.clone(),
            Arc::new(store),
            Duration::from_millis(200),
        );
        (engine, registry)
    }

    fn connect(registry: &ConnectionRegistry, user: &str) -> mpsc::Receiver<ServerEvent> {
        let (tx, rx) = mpsc::channel(8);
        registry.register(&user.to_string(), ConnectionHandle::new(tx));
        rx
    }

    fn expect_receive(event: ServerEvent) -> DeliveredMessage {
        match event {
            ServerEvent::ReceiveMessage(msg) => msg,
            other => panic!("Expected ReceiveMessage, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_send_delivers_to_both_live_parties() {
        let (engine, registry) = engine_with_store(InMemoryStore::new());
        let mut rx_a = connect(&registry, "A");
        let mut rx_b = connect(&registry, "B");

        let delivered = engine
            .send(&"A".to_string(), &"B".to_string(), "hi")
            .await
            .unwrap();
        assert!(!delivered.is_read);

        let to_b = expect_receive(rx_b.recv().await.unwrap());
        let echo_a = expect_receive(rx_a.recv().await.unwrap());
        // Both connections carry the same persisted id
        assert_eq!(to_b.id, delivered.id);
        assert_eq!(echo_a.id, delivered.id);
    }

    #[tokio::test]
    async fn test_send_with_offline_receiver_echoes_sender_only() {
        let (engine, registry) = engine_with_store(InMemoryStore::new());
        let mut rx_a = connect(&registry, "A");

        let delivered = engine
            .send(&"A".to_string(), &"B".to_string(), "hi")
            .await
            .unwrap();

        let echo = expect_receive(rx_a.recv().await.unwrap());
        assert_eq!(echo.id, delivered.id);
        // Nothing else was emitted anywhere
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_validation_failure_persists_nothing() {
        let store = Arc::new(InMemoryStore::new());
        let registry = Arc::new(ConnectionRegistry::new());
        let engine =
            DeliveryEngine::new(registry.clone(), store.clone(), Duration::from_millis(200));
        let mut rx_a = connect(&registry, "A");

        let err = engine
            .send(&"A".to_string(), &"B".to_string(), "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(store.message_count(), 0);
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_persistence_failure_reaches_caller_and_nothing_is_emitted() {
        let (engine, registry) = engine_with_store(FailingStore);
        let mut rx_a = connect(&registry, "A");
        let mut rx_b = connect(&registry, "B");

        let err = engine
            .send(&"A".to_string(), &"B".to_string(), "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Persistence(_)));
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stalled_store_hits_timeout_instead_of_hanging() {
        let (engine, _registry) = engine_with_store(StalledStore);

        let err = engine
            .send(&"A".to_string(), &"B".to_string(), "hi")
            .await
            .unwrap_err();
        match err {
            AppError::Persistence(msg) => assert!(msg.contains("timed out")),
            other => panic!("Expected Persistence, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_delivery_order_follows_persistence_order() {
        let (engine, registry) = engine_with_store(InMemoryStore::new());
        let mut rx_b = connect(&registry, "B");

        let first = engine
            .send(&"A".to_string(), &"B".to_string(), "one")
            .await
            .unwrap();
        let second = engine
            .send(&"A".to_string(), &"B".to_string(), "two")
            .await
            .unwrap();

        assert_eq!(expect_receive(rx_b.recv().await.unwrap()).id, first.id);
        assert_eq!(expect_receive(rx_b.recv().await.unwrap()).id, second.id);
    }
}
