// ============================
// crates/backend-lib/src/ws_router.rs
// ============================
//! WebSocket router and connection handling.
//!
//! One task pair per connection: the main loop consumes incoming frames
//! and dispatches them by event name, a writer task drains the outbound
//! queue into the socket. All registry mutation for the connection goes
//! through its `ConnectionLifecycle`.
use crate::fanout::{NotificationAudience, NotificationEvent};
use crate::lifecycle::ConnectionLifecycle;
use crate::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use std::sync::Arc;
use taskhive_common::{ClientEvent, ServerEvent};
use tokio::sync::mpsc;

/// Create the WebSocket router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new().route("/ws", get(ws_handler)).with_state(state)
}

/// Handler for WebSocket connections
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    counter!("ws.connection").increment(1);
    gauge!("ws.active").increment(1.0);

    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: Arc<AppState>) {
    let (mut sink, mut stream) = socket.split();

    // Outbound queue: everything the engines deliver to this connection
    // funnels through here.
    let (event_tx, mut event_rx) = mpsc::channel::<ServerEvent>(state.settings.channel_capacity);

    let mut lifecycle = ConnectionLifecycle::new(state.registry.clone(), event_tx.clone());
    tracing::debug!(connection_id = %lifecycle.connection_id(), "connection opened");

    // Writer task: serialize queued events onto the socket
    let send_task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!("failed to serialize server event: {e}");
                    continue;
                },
            };
            if sink.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Main loop: dispatch incoming events one at a time, in arrival order
    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => {
                    if let Err(e) = dispatch_event(event, &state, &mut lifecycle).await {
                        // Failures are reported to the originating
                        // connection only; other connections see nothing.
                        let reply = ServerEvent::Error {
                            code: e.error_code().to_string(),
                            message: e.to_string(),
                        };
                        if event_tx.send(reply).await.is_err() {
                            break;
                        }
                    }
                },
                Err(e) => {
                    let reply = ServerEvent::Error {
                        code: "JSON_001".to_string(),
                        message: format!("malformed event: {e}"),
                    };
                    if event_tx.send(reply).await.is_err() {
                        break;
                    }
                },
            },
            Message::Close(_) => break,
            // Ping/pong handled by axum, binary frames not part of the protocol
            _ => {},
        }
    }

    // transport-close transition
    lifecycle.close();

    counter!("ws.disconnection").increment(1);
    gauge!("ws.active").decrement(1.0);

    send_task.abort();
}

/// Dispatch table: event name -> handler. The engines report failures as
/// values; delivery misses against offline peers never surface here.
async fn dispatch_event(
    event: ClientEvent,
    state: &Arc<AppState>,
    lifecycle: &mut ConnectionLifecycle,
) -> Result<(), crate::error::AppError> {
    match event {
        ClientEvent::UserConnected(user_id) => lifecycle.identify(&user_id),
        ClientEvent::SendMessage {
            sender,
            receiver,
            message,
        } => {
            // The echo back to the sender's own connection is the ack
            state.delivery.send(&sender, &receiver, &message).await?;
            Ok(())
        },
        ClientEvent::MeetingScheduled { meeting } => {
            // Client-relayed scheduling events go to everyone connected;
            // the HTTP scheduling flow targets participants instead.
            state.fanout.notify(NotificationEvent::MeetingScheduled {
                meeting,
                audience: NotificationAudience::Everyone,
            });
            Ok(())
        },
    }
}
