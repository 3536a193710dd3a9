// ============================
// crates/backend-lib/src/lifecycle.rs
// ============================
//! Per-connection lifecycle: Anonymous -> Identified -> Closed.
//!
//! One `ConnectionLifecycle` exists per transport connection and is the
//! only code path that mutates the registry. Once an identity is bound it
//! is fixed for the connection's lifetime; there is no way back to
//! Anonymous.

use std::sync::Arc;
use taskhive_common::{ConnectionId, ServerEvent, UserId};
use tokio::sync::mpsc;

use crate::error::AppError;
use crate::registry::{ConnectionHandle, ConnectionRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Transport open, no identity bound
    Anonymous,
    /// Registry holds an entry for this connection
    Identified,
    /// Terminal
    Closed,
}

pub struct ConnectionLifecycle {
    registry: Arc<ConnectionRegistry>,
    handle: ConnectionHandle,
    state: ConnectionState,
    user_id: Option<UserId>,
}

impl ConnectionLifecycle {
    /// Open a lifecycle for a fresh transport connection whose outbound
    /// queue is `tx`.
    pub fn new(registry: Arc<ConnectionRegistry>, tx: mpsc::Sender<ServerEvent>) -> Self {
        Self {
            registry,
            handle: ConnectionHandle::new(tx),
            state: ConnectionState::Anonymous,
            user_id: None,
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.handle.id()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn user_id(&self) -> Option<&UserId> {
        self.user_id.as_ref()
    }

    /// `identify` transition: bind a user identity to this connection and
    /// record it in the registry. Re-identifying on the same connection
    /// re-registers, which is idempotent.
    ///
    /// # Errors
    /// `Validation` when the user id is missing/blank, or when the
    /// connection is already closed. No registry mutation happens in
    /// either case.
    pub fn identify(&mut self, user_id: &UserId) -> Result<(), AppError> {
        if self.state == ConnectionState::Closed {
            return Err(AppError::Validation(
                "connection is closed".to_string(),
            ));
        }
        if user_id.trim().is_empty() {
            return Err(AppError::Validation("userId is required".to_string()));
        }
        if let Some(bound) = &self.user_id {
            // Identity is fixed after the first bind; the same id is a no-op
            // re-register, a different one is rejected at the boundary.
            if bound != user_id {
                return Err(AppError::Validation(format!(
                    "connection already identified as {bound}"
                )));
            }
        }

        self.registry.register(user_id, self.handle.clone());
        self.user_id = Some(user_id.clone());
        self.state = ConnectionState::Identified;
        tracing::info!(user_id = %user_id, connection_id = %self.handle.id(), "user identified");
        Ok(())
    }

    /// `transport-close` transition. Total: closing an anonymous connection
    /// touches nothing, closing an identified one removes exactly its own
    /// registry entry (a superseded entry is already gone). Idempotent.
    pub fn close(&mut self) {
        if self.state == ConnectionState::Identified {
            if let Some(user_id) = self.registry.remove_by_connection(self.handle.id()) {
                tracing::info!(user_id = %user_id, connection_id = %self.handle.id(), "user disconnected");
            }
        }
        self.state = ConnectionState::Closed;
    }
}
