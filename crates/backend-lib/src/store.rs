// ============================
// crates/backend-lib/src/store.rs
// ============================
//! Persistence gateway abstraction with an in-memory implementation.
//!
//! The realtime core treats durable storage as an external collaborator:
//! it hands a message over, gets back a stored record with a generated id,
//! and re-reads it with identities expanded for the delivery payload.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use taskhive_common::{
    DeliveredMessage, Meeting, MessageId, StoredMessage, UserId, UserRef,
};
use uuid::Uuid;

use crate::error::AppError;

/// Gateway for chat message persistence
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Store a new message with `is_read = false`; the gateway assigns the id.
    async fn create_message(
        &self,
        sender: &UserId,
        receiver: &UserId,
        body: &str,
    ) -> Result<StoredMessage, AppError>;

    /// Re-read a stored message with sender/receiver expanded to `{id, name}`.
    async fn get_message_expanded(&self, id: &MessageId) -> Result<DeliveredMessage, AppError>;
}

/// Fields the scheduling flow supplies when persisting a meeting
#[derive(Debug, Clone)]
pub struct NewMeeting {
    pub title: String,
    pub description: Option<String>,
    pub scheduled_time: chrono::DateTime<Utc>,
    pub organizer: UserId,
    pub participants: Vec<UserId>,
    pub provider_meeting_id: String,
    pub join_url: String,
}

/// Gateway for meeting record persistence
#[async_trait]
pub trait MeetingStore: Send + Sync {
    /// Store a new meeting record; the gateway assigns the id.
    async fn create_meeting(&self, meeting: NewMeeting) -> Result<Meeting, AppError>;
}

/// In-memory implementation of both gateways, used in tests and
/// single-process development deployments.
#[derive(Default)]
pub struct InMemoryStore {
    messages: DashMap<MessageId, StoredMessage>,
    meetings: DashMap<String, Meeting>,
    // userId -> display name, for payload expansion
    users: DashMap<UserId, String>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a display name for a user so expanded payloads carry it.
    pub fn upsert_user(&self, id: impl Into<UserId>, name: impl Into<String>) {
        self.users.insert(id.into(), name.into());
    }

    fn user_ref(&self, id: &UserId) -> UserRef {
        // Unknown users fall back to their id as the display name
        let name = self
            .users
            .get(id)
            .map_or_else(|| id.clone(), |n| n.value().clone());
        UserRef {
            id: id.clone(),
            name,
        }
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn meeting_count(&self) -> usize {
        self.meetings.len()
    }
}

#[async_trait]
impl MessageStore for InMemoryStore {
    async fn create_message(
        &self,
        sender: &UserId,
        receiver: &UserId,
        body: &str,
    ) -> Result<StoredMessage, AppError> {
        let stored = StoredMessage {
            id: Uuid::new_v4().to_string(),
            sender: sender.clone(),
            receiver: receiver.clone(),
            message: body.to_string(),
            is_read: false,
            created_at: Utc::now(),
        };
        self.messages.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn get_message_expanded(&self, id: &MessageId) -> Result<DeliveredMessage, AppError> {
        let stored = self
            .messages
            .get(id)
            .ok_or_else(|| AppError::NotFound(format!("message {id}")))?;
        Ok(DeliveredMessage {
            id: stored.id.clone(),
            sender: self.user_ref(&stored.sender),
            receiver: self.user_ref(&stored.receiver),
            message: stored.message.clone(),
            is_read: stored.is_read,
            created_at: stored.created_at,
        })
    }
}

#[async_trait]
impl MeetingStore for InMemoryStore {
    async fn create_meeting(&self, meeting: NewMeeting) -> Result<Meeting, AppError> {
        let record = Meeting {
            id: Uuid::new_v4().to_string(),
            title: meeting.title,
            description: meeting.description,
            scheduled_time: meeting.scheduled_time,
            organizer: meeting.organizer,
            participants: meeting.participants,
            provider_meeting_id: meeting.provider_meeting_id,
            join_url: meeting.join_url,
        };
        self.meetings.insert(record.id.clone(), record.clone());
        Ok(record)
    }
}
