use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::interval;
use tracing::{debug, warn};

use runcast_core_types::RunId;
use runcast_event_bus::EventBus;

use crate::server::state::ServeState;

const IDLE_PING_PERIOD: Duration = Duration::from_secs(60);

pub(crate) fn router() -> Router<ServeState> {
    Router::new().route("/ws", get(websocket_handler))
}

#[derive(Deserialize)]
struct WsQuery {
    #[serde(rename = "runId")]
    run_id: String,
    /// Resume cursor: replay only history with envelope ids above this.
    since: Option<u64>,
}

async fn websocket_handler(
    State(state): State<ServeState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let bus = state.bus.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, bus, query))
}

async fn handle_socket(mut socket: WebSocket, bus: Arc<EventBus>, query: WsQuery) {
    let run_id = RunId(query.run_id);
    let subscription = bus.subscribe(&run_id, query.since);
    debug!(
        target: "ws",
        run = %run_id,
        replayed = subscription.history.len(),
        "subscriber joined"
    );

    for delivery in &subscription.history {
        if socket
            .send(Message::Text(delivery.text.to_string()))
            .await
            .is_err()
        {
            return;
        }
    }

    let mut receiver = subscription.receiver;
    let mut idle = interval(IDLE_PING_PERIOD);
    idle.tick().await;

    loop {
        tokio::select! {
            event = receiver.recv() => match event {
                Ok(delivery) => {
                    if socket
                        .send(Message::Text(delivery.text.to_string()))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(target: "ws", run = %run_id, skipped, "subscriber lagging, events dropped");
                    continue;
                }
                Err(RecvError::Closed) => break,
            },
            message = socket.next() => match message {
                Some(Ok(Message::Ping(payload))) => {
                    let _ = socket.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    debug!(target: "ws", run = %run_id, %err, "socket error");
                    break;
                }
            },
            _ = idle.tick() => {
                if socket.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }
    debug!(target: "ws", run = %run_id, "subscriber left");
}
