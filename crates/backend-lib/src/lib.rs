// ============================
// crates/backend-lib/src/lib.rs
// ============================
//! Core backend-lib functionality for the `TaskHive` realtime server:
//! presence registry, chat delivery, notification fan-out, connection
//! lifecycle, and the transport surfaces that drive them.

pub mod config;
pub mod delivery;
pub mod error;
pub mod fanout;
pub mod lifecycle;
pub mod meeting;
pub mod registry;
pub mod routes;
pub mod store;
pub mod ws_router;

use std::sync::Arc;

use crate::config::Settings;
use crate::delivery::DeliveryEngine;
use crate::fanout::FanoutEngine;
use crate::meeting::{MeetingProvider, MeetingScheduler, StubMeetingProvider};
use crate::registry::ConnectionRegistry;
use crate::store::{InMemoryStore, MeetingStore, MessageStore};

/// Application state shared across all handlers.
///
/// The registry is constructed here and never handed out for mutation:
/// lifecycle code writes it, the engines read it.
pub struct AppState {
    /// Presence table
    pub registry: Arc<ConnectionRegistry>,
    /// Chat delivery engine
    pub delivery: Arc<DeliveryEngine<dyn MessageStore>>,
    /// Notification fan-out engine
    pub fanout: Arc<FanoutEngine>,
    /// Meeting scheduling flow
    pub scheduler: Arc<MeetingScheduler<dyn MeetingStore, dyn MeetingProvider>>,
    /// Settings
    pub settings: Arc<Settings>,
}

impl AppState {
    /// Create application state over explicit collaborator implementations.
    pub fn new(
        settings: Settings,
        message_store: Arc<dyn MessageStore>,
        meeting_store: Arc<dyn MeetingStore>,
        provider: Arc<dyn MeetingProvider>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let fanout = Arc::new(FanoutEngine::new(registry.clone()));
        let delivery = Arc::new(DeliveryEngine::new(
            registry.clone(),
            message_store,
            settings.persist_timeout(),
        ));
        let scheduler = Arc::new(MeetingScheduler::new(
            meeting_store,
            provider,
            fanout.clone(),
            settings.provider_timeout(),
        ));

        Self {
            registry,
            delivery,
            fanout,
            scheduler,
            settings: Arc::new(settings),
        }
    }

    /// State backed entirely by in-memory collaborators: the default for
    /// tests and development deployments without external services.
    pub fn in_memory(settings: Settings) -> (Self, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let state = Self::new(
            settings,
            store.clone(),
            store.clone(),
            Arc::new(StubMeetingProvider),
        );
        (state, store)
    }
}
