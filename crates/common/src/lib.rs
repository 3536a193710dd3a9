// ================
// crates/common/src/lib.rs
// ================
//! Common types and structures
//! used for communication between `TaskHive` clients and the realtime server.
//! This module defines the WebSocket protocol events and supporting records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Logical user identity, supplied by the external auth collaborator.
/// The realtime core trusts this value and performs no verification.
pub type UserId = String;

/// Identifier assigned to a stored chat message by the persistence gateway.
pub type MessageId = String;

/// Identity of one live transport connection.
pub type ConnectionId = Uuid;

/// A user reference with the identity expanded to `{id, name}`,
/// as embedded in delivered chat payloads.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserRef {
    pub id: UserId,
    pub name: String,
}

/// A chat message as stored by the persistence gateway.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    /// Assigned by the gateway on creation
    pub id: MessageId,
    pub sender: UserId,
    pub receiver: UserId,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// A stored chat message with sender/receiver expanded for delivery.
/// This is the `receiveMessage` payload.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DeliveredMessage {
    pub id: MessageId,
    pub sender: UserRef,
    pub receiver: UserRef,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// A scheduled meeting record, composed from the external provider result.
/// Persisted by the scheduling flow before any notification is raised.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Meeting {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub scheduled_time: DateTime<Utc>,
    pub organizer: UserId,
    pub participants: Vec<UserId>,
    pub provider_meeting_id: String,
    pub join_url: String,
}

/// Events sent from client to server
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    /// Identify this connection: bind the given user id to it.
    /// A connection's identity, once bound, is fixed for its lifetime.
    UserConnected(UserId),
    /// Send a point-to-point chat message
    SendMessage {
        sender: UserId,
        receiver: UserId,
        message: String,
    },
    /// Relay a freshly scheduled meeting to everyone connected.
    /// The meeting record has already been persisted by the caller.
    MeetingScheduled { meeting: Meeting },
}

/// Events sent from server to client
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// A chat message addressed to (or echoed back to) this connection
    ReceiveMessage(DeliveredMessage),
    /// A meeting was scheduled that concerns this connection
    MeetingNotification { meeting: Meeting },
    /// A request from this connection failed; never sent for an
    /// offline peer, only for validation/persistence failures.
    Error { code: String, message: String },
}
