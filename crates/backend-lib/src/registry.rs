// ============================
// crates/backend-lib/src/registry.rs
// ============================
//! In-memory presence table: the single source of truth for "who is online".
//!
//! The registry is a bidirectional mapping between a logical user identity
//! and the one transport connection currently bound to it. It is owned by
//! `AppState`, mutated only by the connection lifecycle, and read by the
//! delivery and fan-out engines. Entries live only as long as the process:
//! a restart loses all presence and every client must re-identify.

use dashmap::DashMap;
use metrics::gauge;
use taskhive_common::{ConnectionId, ServerEvent, UserId};
use tokio::sync::mpsc;
use uuid::Uuid;

/// The narrow delivery capability handed to the engines: one live
/// connection's identity plus its outbound event queue. Anything that
/// drains the paired receiver (a socket writer task, a test double)
/// is interchangeable.
#[derive(Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::Sender<ServerEvent>,
}

impl ConnectionHandle {
    pub fn new(tx: mpsc::Sender<ServerEvent>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Fire-and-forget delivery: enqueue the event without waiting for any
    /// transport-level acknowledgment. A full or closed queue drops the
    /// event for this connection only.
    pub fn send(&self, event: ServerEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(connection_id = %self.id, "dropping event for connection: {e}");
                false
            },
        }
    }
}

/// userId -> connection, plus a reverse index so disconnects (keyed by
/// connection id) stay O(1) instead of scanning the whole table.
#[derive(Default)]
pub struct ConnectionRegistry {
    forward: DashMap<UserId, ConnectionHandle>,
    reverse: DashMap<ConnectionId, UserId>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            forward: DashMap::new(),
            reverse: DashMap::new(),
        }
    }

    /// Unconditionally (over)write the binding for `user_id`; the last
    /// writer wins. Returns the superseded handle, if any. The superseded
    /// transport is left open but becomes unreachable through the registry;
    /// forcibly closing it is the caller's policy decision.
    pub fn register(&self, user_id: &UserId, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        let new_id = handle.id();
        self.reverse.insert(new_id, user_id.clone());
        let previous = self.forward.insert(user_id.clone(), handle);
        if let Some(prev) = &previous {
            // Same-connection re-identify is idempotent; only a different
            // connection leaves a stale reverse entry behind.
            if prev.id() != new_id {
                self.reverse.remove(&prev.id());
                tracing::info!(user_id = %user_id, superseded = %prev.id(), "presence superseded by newer connection");
            }
        }
        self.update_gauge();
        previous
    }

    /// Pure read; `None` means offline or never identified.
    pub fn lookup(&self, user_id: &UserId) -> Option<ConnectionHandle> {
        self.forward.get(user_id).map(|r| r.value().clone())
    }

    /// Remove the binding whose value is `connection_id`, if any, leaving
    /// all other entries untouched. Removing a connection that was already
    /// superseded is a no-op: the forward entry now points elsewhere.
    pub fn remove_by_connection(&self, connection_id: ConnectionId) -> Option<UserId> {
        let (_, user_id) = self.reverse.remove(&connection_id)?;
        let removed = self
            .forward
            .remove_if(&user_id, |_, handle| handle.id() == connection_id);
        self.update_gauge();
        removed.map(|(uid, _)| uid)
    }

    /// Snapshot of every live connection, for broadcast fan-out.
    pub fn connections(&self) -> Vec<ConnectionHandle> {
        self.forward.iter().map(|r| r.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    fn update_gauge(&self) {
        #[allow(clippy::cast_precision_loss)]
        gauge!("presence.online").set(self.forward.len() as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> (ConnectionHandle, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(8);
        (ConnectionHandle::new(tx), rx)
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let registry = ConnectionRegistry::new();
        let (ca, _rx) = handle();
        let ca_id = ca.id();

        assert!(registry.register(&"A".to_string(), ca).is_none());
        let found = registry.lookup(&"A".to_string()).unwrap();
        assert_eq!(found.id(), ca_id);
        assert!(registry.lookup(&"B".to_string()).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_later_register_supersedes_earlier() {
        let registry = ConnectionRegistry::new();
        let (c1, _rx1) = handle();
        let (c2, _rx2) = handle();
        let (c1_id, c2_id) = (c1.id(), c2.id());

        registry.register(&"A".to_string(), c1);
        let superseded = registry.register(&"A".to_string(), c2).unwrap();
        assert_eq!(superseded.id(), c1_id);

        // lookup(A) = c2, and removing c1 is a no-op
        assert_eq!(registry.lookup(&"A".to_string()).unwrap().id(), c2_id);
        assert!(registry.remove_by_connection(c1_id).is_none());
        assert_eq!(registry.lookup(&"A".to_string()).unwrap().id(), c2_id);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_by_connection_leaves_others_untouched() {
        let registry = ConnectionRegistry::new();
        let (ca, _rxa) = handle();
        let (cb, _rxb) = handle();
        let ca_id = ca.id();

        registry.register(&"A".to_string(), ca);
        registry.register(&"B".to_string(), cb);

        assert_eq!(registry.remove_by_connection(ca_id).unwrap(), "A");
        assert!(registry.lookup(&"A".to_string()).is_none());
        assert!(registry.lookup(&"B".to_string()).is_some());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_register_is_idempotent_for_same_connection() {
        let registry = ConnectionRegistry::new();
        let (ca, _rx) = handle();
        let ca_id = ca.id();

        registry.register(&"A".to_string(), ca.clone());
        registry.register(&"A".to_string(), ca);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup(&"A".to_string()).unwrap().id(), ca_id);
        // The reverse index still resolves the one connection
        assert_eq!(registry.remove_by_connection(ca_id).unwrap(), "A");
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_remove_unknown_connection_is_noop() {
        let registry = ConnectionRegistry::new();
        let (ca, _rx) = handle();
        registry.register(&"A".to_string(), ca);

        assert!(registry.remove_by_connection(Uuid::new_v4()).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_handle_send_is_fire_and_forget() {
        let (tx, mut rx) = mpsc::channel(1);
        let handle = ConnectionHandle::new(tx);

        assert!(handle.send(ServerEvent::Error {
            code: "X".to_string(),
            message: "first".to_string(),
        }));
        // Queue full: dropped, not blocked
        assert!(!handle.send(ServerEvent::Error {
            code: "X".to_string(),
            message: "second".to_string(),
        }));

        match rx.recv().await.unwrap() {
            ServerEvent::Error { message, .. } => assert_eq!(message, "first"),
            other => panic!("Expected Error, got {other:?}"),
        }
    }
}
