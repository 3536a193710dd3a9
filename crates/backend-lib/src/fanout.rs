// ============================
// crates/backend-lib/src/fanout.rs
// ============================
//! Notification fan-out: deliver one ephemeral event to a chosen set of
//! live connections, or to every connection, in a single pass over the
//! registry. Offline targets are skipped silently; nothing is queued or
//! retried, and nothing is ever persisted here.

use metrics::counter;
use std::sync::Arc;
use taskhive_common::{Meeting, ServerEvent, UserId};

use crate::registry::ConnectionRegistry;

/// Who a notification is for. The two meeting-notification pathways in the
/// product differ on this, so the choice is an explicit caller-selected
/// parameter rather than two ad hoc code paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationAudience {
    /// Deliver only to these user ids, skipping any without a live session
    Participants(Vec<UserId>),
    /// Deliver to every connection currently known, regardless of identity
    Everyone,
}

/// A single ephemeral notification
#[derive(Debug, Clone)]
pub enum NotificationEvent {
    MeetingScheduled {
        meeting: Meeting,
        audience: NotificationAudience,
    },
}

pub struct FanoutEngine {
    registry: Arc<ConnectionRegistry>,
}

impl FanoutEngine {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Deliver the event, returning how many live connections received it.
    pub fn notify(&self, event: NotificationEvent) -> usize {
        let NotificationEvent::MeetingScheduled { meeting, audience } = event;
        let payload = ServerEvent::MeetingNotification { meeting };

        let delivered = match audience {
            NotificationAudience::Participants(targets) => targets
                .iter()
                .filter_map(|user_id| self.registry.lookup(user_id))
                .filter(|conn| conn.send(payload.clone()))
                .count(),
            NotificationAudience::Everyone => self
                .registry
                .connections()
                .into_iter()
                .filter(|conn| conn.send(payload.clone()))
                .count(),
        };

        counter!("notify.delivered").increment(delivered as u64);
        delivered
    }
}
