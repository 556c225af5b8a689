use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use axum::Router;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::feed::{self, FeedStream, FeedUpdate};
use crate::error::AppError;
use crate::models::tracking::TrackingEvent;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders/:id/tracking", get(tracking_history))
        .route("/orders/:id/feed", get(feed_handler))
}

async fn tracking_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<TrackingEvent>>, AppError> {
    Ok(Json(feed::history(&state, id).await?))
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Snapshot {
    Snapshot { events: Vec<TrackingEvent> },
}

/// Upgrades to a websocket that first sends the order's history, then every new event.
/// A subscriber that falls behind gets the full history again.
async fn feed_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    // Subscribe before reading history so nothing committed in between is lost.
    let updates = feed::subscribe(&state, id).await?;
    let events = feed::history(&state, id).await?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, id, events, updates)))
}

fn snapshot_json(events: Vec<TrackingEvent>) -> Option<String> {
    match serde_json::to_string(&Snapshot::Snapshot { events }) {
        Ok(json) => Some(json),
        Err(err) => {
            warn!(error = %err, "failed to serialize tracking snapshot");
            None
        }
    }
}

async fn handle_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    order_id: Uuid,
    events: Vec<TrackingEvent>,
    mut updates: FeedStream,
) {
    let (mut sender, mut receiver) = socket.split();

    info!(order_id = %order_id, "tracking feed client connected");

    let send_task = tokio::spawn(async move {
        let Some(snapshot) = snapshot_json(events) else {
            return;
        };
        if sender.send(Message::Text(snapshot)).await.is_err() {
            return;
        }

        while let Some(update) = updates.next().await {
            let json = match update {
                FeedUpdate::Event(_) => match serde_json::to_string(&update) {
                    Ok(json) => json,
                    Err(err) => {
                        warn!(error = %err, "failed to serialize tracking update for ws");
                        continue;
                    }
                },
                FeedUpdate::Resync { .. } => {
                    let events = match feed::history(&state, order_id).await {
                        Ok(events) => events,
                        Err(err) => {
                            warn!(order_id = %order_id, error = %err, "failed to reload tracking history");
                            break;
                        }
                    };
                    match snapshot_json(events) {
                        Some(json) => json,
                        None => continue,
                    }
                }
            };

            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!(order_id = %order_id, "tracking feed client disconnected");
}
