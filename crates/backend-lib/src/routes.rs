// ============================
// crates/backend-lib/src/routes.rs
// ============================
//! HTTP surface: the meeting scheduling route that raises notifications,
//! plus a liveness probe. Everything else the surrounding application
//! serves (auth, projects, tasks, uploads) lives outside this crate.
use crate::error::AppError;
use crate::fanout::NotificationAudience;
use crate::meeting::ScheduleRequest;
use crate::{ws_router, AppState};
use axum::{
    extract::State,
    http::{HeaderValue, Method, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use taskhive_common::{Meeting, UserId};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Fan-out mode requested by the scheduling caller
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum NotifyMode {
    #[default]
    Participants,
    Everyone,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleMeetingBody {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub scheduled_time: DateTime<Utc>,
    pub organizer: UserId,
    pub participants: Vec<UserId>,
    #[serde(default)]
    pub notify: NotifyMode,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleMeetingResponse {
    pub message: String,
    pub meeting: Meeting,
}

/// Build the full application router: WebSocket endpoint, HTTP routes,
/// CORS for the configured frontend origin, request tracing.
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = state
        .settings
        .cors_origin
        .parse::<HeaderValue>()
        .map(|origin| {
            CorsLayer::new()
                .allow_origin(origin)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(tower_http::cors::Any)
        })
        .unwrap_or_default();

    Router::new()
        .route("/meetings", post(schedule_meeting))
        .route("/healthz", get(healthz))
        .with_state(state.clone())
        .merge(ws_router::create_router(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

/// Schedule a meeting: provider, persist, then notify the chosen audience.
async fn schedule_meeting(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ScheduleMeetingBody>,
) -> Result<(StatusCode, Json<ScheduleMeetingResponse>), AppError> {
    let audience = match body.notify {
        NotifyMode::Participants => NotificationAudience::Participants(body.participants.clone()),
        NotifyMode::Everyone => NotificationAudience::Everyone,
    };

    let meeting = state
        .scheduler
        .schedule(ScheduleRequest {
            title: body.title,
            description: body.description,
            scheduled_time: body.scheduled_time,
            organizer: body.organizer,
            participants: body.participants,
            audience,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ScheduleMeetingResponse {
            message: "Meeting scheduled successfully".to_string(),
            meeting,
        }),
    ))
}
