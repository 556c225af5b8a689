use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::rest::actor::Actor;
use crate::engine::chat::{self, ChatStream, ChatUpdate};
use crate::error::AppError;
use crate::models::actor::ActorContext;
use crate::models::chat::ChatMessage;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders/:id/messages", post(send_message).get(list_messages))
        .route("/orders/:id/messages/read", post(mark_order_read))
        .route("/orders/:id/chat", get(chat_handler))
        .route("/messages/:id/read", post(mark_read))
}

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub message: String,
}

async fn send_message(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<ChatMessage>), AppError> {
    let message = chat::send_message(&state, &actor, id, &payload.message).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn list_messages(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ChatMessage>>, AppError> {
    Ok(Json(chat::list_messages(&state, &actor, id).await?))
}

#[derive(Serialize)]
pub struct MarkedRead {
    pub marked: usize,
}

async fn mark_order_read(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<MarkedRead>, AppError> {
    let marked = chat::mark_order_read(&state, &actor, id).await?;
    Ok(Json(MarkedRead { marked }))
}

async fn mark_read(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<ChatMessage>, AppError> {
    Ok(Json(chat::mark_read(&state, &actor, id).await?))
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Snapshot {
    Snapshot { messages: Vec<ChatMessage> },
}

/// Upgrades to a websocket that sends the conversation, then every new message. Text frames
/// from the client are sent as messages from the caller.
async fn chat_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let updates = chat::subscribe(&state, &actor, id).await?;
    let messages = chat::list_messages(&state, &actor, id).await?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, actor, id, messages, updates)))
}

fn snapshot_json(messages: Vec<ChatMessage>) -> Option<String> {
    match serde_json::to_string(&Snapshot::Snapshot { messages }) {
        Ok(json) => Some(json),
        Err(err) => {
            warn!(error = %err, "failed to serialize chat snapshot");
            None
        }
    }
}

async fn handle_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    actor: ActorContext,
    order_id: Uuid,
    messages: Vec<ChatMessage>,
    mut updates: ChatStream,
) {
    let (mut sender, mut receiver) = socket.split();

    info!(order_id = %order_id, user_id = %actor.user_id, "chat client connected");

    let send_state = state.clone();
    let send_task = tokio::spawn(async move {
        let Some(snapshot) = snapshot_json(messages) else {
            return;
        };
        if sender.send(Message::Text(snapshot)).await.is_err() {
            return;
        }

        while let Some(update) = updates.next().await {
            let json = match update {
                ChatUpdate::Message(_) => match serde_json::to_string(&update) {
                    Ok(json) => json,
                    Err(err) => {
                        warn!(error = %err, "failed to serialize chat update for ws");
                        continue;
                    }
                },
                ChatUpdate::Resync { .. } => {
                    let messages = match chat::list_messages(&send_state, &actor, order_id).await {
                        Ok(messages) => messages,
                        Err(err) => {
                            warn!(order_id = %order_id, error = %err, "failed to reload chat");
                            break;
                        }
                    };
                    match snapshot_json(messages) {
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
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    if let Err(err) = chat::send_message(&state, &actor, order_id, &text).await {
                        warn!(order_id = %order_id, error = %err, "chat message from ws refused");
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!(order_id = %order_id, "chat client disconnected");
}
