// ============================
// crates/backend-lib/src/meeting.rs
// ============================
//! Meeting scheduling flow.
//!
//! The external provider is consulted only to obtain a joinable link; how
//! it produces one (OAuth token exchange, user resolution, etc.) is its
//! own business. The flow is provider -> persist -> notify, in that order,
//! so the fan-out engine never sees a notification tied to a nonexistent
//! meeting.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use taskhive_common::{Meeting, UserId};
use tokio::time::timeout;

use crate::error::AppError;
use crate::fanout::{FanoutEngine, NotificationAudience, NotificationEvent};
use crate::store::{MeetingStore, NewMeeting};

/// What the external provider hands back for a scheduled meeting
#[derive(Debug, Clone)]
pub struct ProviderMeeting {
    pub provider_id: String,
    pub join_url: String,
}

/// External meeting provider boundary
#[async_trait]
pub trait MeetingProvider: Send + Sync {
    async fn create_meeting(
        &self,
        topic: &str,
        start_time: DateTime<Utc>,
    ) -> Result<ProviderMeeting, AppError>;
}

/// Provider double that mints deterministic join links. Used in tests and
/// development deployments with no provider credentials configured.
#[derive(Default)]
pub struct StubMeetingProvider;

#[async_trait]
impl MeetingProvider for StubMeetingProvider {
    async fn create_meeting(
        &self,
        topic: &str,
        _start_time: DateTime<Utc>,
    ) -> Result<ProviderMeeting, AppError> {
        let provider_id = uuid::Uuid::new_v4().simple().to_string();
        tracing::debug!(topic = %topic, provider_id = %provider_id, "stub meeting created");
        Ok(ProviderMeeting {
            join_url: format!("https://meet.invalid/j/{provider_id}"),
            provider_id,
        })
    }
}

/// A scheduling request as received from the surrounding application
#[derive(Debug, Clone)]
pub struct ScheduleRequest {
    pub title: String,
    pub description: Option<String>,
    pub scheduled_time: DateTime<Utc>,
    pub organizer: UserId,
    pub participants: Vec<UserId>,
    /// Caller-selected fan-out mode for the resulting notification
    pub audience: NotificationAudience,
}

pub struct MeetingScheduler<M: ?Sized, P: ?Sized> {
    store: Arc<M>,
    provider: Arc<P>,
    fanout: Arc<FanoutEngine>,
    provider_timeout: Duration,
}

impl<M: MeetingStore + ?Sized, P: MeetingProvider + ?Sized> MeetingScheduler<M, P> {
    pub fn new(
        store: Arc<M>,
        provider: Arc<P>,
        fanout: Arc<FanoutEngine>,
        provider_timeout: Duration,
    ) -> Self {
        Self {
            store,
            provider,
            fanout,
            provider_timeout,
        }
    }

    /// Schedule a meeting and notify the chosen audience.
    ///
    /// # Errors
    /// - `Validation` for a missing title, organizer, or participant list.
    /// - `Provider` when the external provider fails or exceeds its
    ///   timeout; nothing is persisted and no notification is raised.
    /// - `Persistence` when storing the record fails; no notification is
    ///   raised.
    pub async fn schedule(&self, request: ScheduleRequest) -> Result<Meeting, AppError> {
        if request.title.trim().is_empty() {
            return Err(AppError::Validation("title is required".to_string()));
        }
        if request.organizer.trim().is_empty() {
            return Err(AppError::Validation("organizer is required".to_string()));
        }
        if request.participants.is_empty() {
            return Err(AppError::Validation(
                "participants are required".to_string(),
            ));
        }

        let provided = timeout(
            self.provider_timeout,
            self.provider
                .create_meeting(&request.title, request.scheduled_time),
        )
        .await
        .map_err(|_| AppError::Provider("meeting provider timed out".to_string()))?
        .map_err(|e| AppError::Provider(e.to_string()))?;

        let meeting = self
            .store
            .create_meeting(NewMeeting {
                title: request.title,
                description: request.description,
                scheduled_time: request.scheduled_time,
                organizer: request.organizer,
                participants: request.participants,
                provider_meeting_id: provided.provider_id,
                join_url: provided.join_url,
            })
            .await
            .map_err(|e| AppError::Persistence(e.to_string()))?;

        let delivered = self.fanout.notify(NotificationEvent::MeetingScheduled {
            meeting: meeting.clone(),
            audience: request.audience,
        });
        tracing::info!(meeting_id = %meeting.id, delivered, "meeting scheduled and notified");

        Ok(meeting)
    }
}
