//! Per-order chat between the customer and the assigned partner.
//!
//! Messages are stored beside the order and pushed to live subscribers the same way tracking
//! events are. Only the receiver of a message can mark it read.

use std::pin::Pin;

use futures::Stream;
use serde::Serialize;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::engine::orders::load_order;
use crate::error::AppError;
use crate::models::actor::ActorContext;
use crate::models::chat::ChatMessage;
use crate::models::order::DeliveryOrder;
use crate::state::AppState;

pub const MAX_MESSAGE_CHARS: usize = 2000;

pub type ChatStream = Pin<Box<dyn Stream<Item = ChatUpdate> + Send>>;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatUpdate {
    Message(ChatMessage),
    /// The subscriber fell behind and lost `missed` messages; reload the conversation.
    Resync { missed: u64 },
}

fn ensure_participant(actor: &ActorContext, order: &DeliveryOrder) -> Result<(), AppError> {
    if actor.is_admin()
        || actor.user_id == order.customer_id
        || order.partner_id == Some(actor.user_id)
    {
        return Ok(());
    }
    Err(AppError::Forbidden(format!(
        "only the customer and the assigned partner can see the chat of order {}",
        order.order_number
    )))
}

/// The other side of the conversation. Chat opens once a partner is assigned.
fn counterpart(actor: &ActorContext, order: &DeliveryOrder) -> Result<Uuid, AppError> {
    let partner_id = order.partner_id.ok_or_else(|| {
        AppError::PreconditionFailed(format!(
            "order {} has no assigned partner yet",
            order.order_number
        ))
    })?;

    if actor.user_id == order.customer_id {
        Ok(partner_id)
    } else if actor.user_id == partner_id {
        Ok(order.customer_id)
    } else {
        Err(AppError::Forbidden(format!(
            "only the customer and the assigned partner can chat on order {}",
            order.order_number
        )))
    }
}

pub async fn send_message(
    state: &AppState,
    actor: &ActorContext,
    order_id: Uuid,
    text: &str,
) -> Result<ChatMessage, AppError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(AppError::Validation("message must not be empty".to_string()));
    }
    if text.chars().count() > MAX_MESSAGE_CHARS {
        return Err(AppError::Validation(format!(
            "message must be at most {MAX_MESSAGE_CHARS} characters"
        )));
    }

    let order = load_order(state, order_id).await?;
    let receiver_id = counterpart(actor, &order)?;

    let message = ChatMessage::new(order_id, actor.user_id, receiver_id, text);
    state.store.insert_message(message.clone()).await?;
    state.metrics.chat_messages_total.inc();

    debug!(order_id = %order_id, message_id = %message.id, "chat message sent");
    Ok(message)
}

/// Conversation of an order, newest first.
pub async fn list_messages(
    state: &AppState,
    actor: &ActorContext,
    order_id: Uuid,
) -> Result<Vec<ChatMessage>, AppError> {
    let order = load_order(state, order_id).await?;
    ensure_participant(actor, &order)?;
    state.store.list_messages(order_id).await
}

pub async fn mark_read(
    state: &AppState,
    actor: &ActorContext,
    message_id: Uuid,
) -> Result<ChatMessage, AppError> {
    let not_found = || AppError::NotFound(format!("message {message_id} not found"));

    let message = state
        .store
        .get_message(message_id)
        .await?
        .ok_or_else(not_found)?;
    if message.receiver_id != actor.user_id {
        return Err(AppError::Forbidden(format!(
            "message {message_id} was not sent to you"
        )));
    }
    if message.is_read {
        return Ok(message);
    }

    state
        .store
        .mark_message_read(message_id)
        .await?
        .ok_or_else(not_found)
}

/// Marks every unread message the actor received on the order; returns how many changed.
pub async fn mark_order_read(
    state: &AppState,
    actor: &ActorContext,
    order_id: Uuid,
) -> Result<usize, AppError> {
    let unread: Vec<Uuid> = list_messages(state, actor, order_id)
        .await?
        .into_iter()
        .filter(|message| message.receiver_id == actor.user_id && !message.is_read)
        .map(|message| message.id)
        .collect();

    for id in &unread {
        state.store.mark_message_read(*id).await?;
    }
    Ok(unread.len())
}

/// New messages of one order as they are sent.
pub async fn subscribe(
    state: &AppState,
    actor: &ActorContext,
    order_id: Uuid,
) -> Result<ChatStream, AppError> {
    let order = load_order(state, order_id).await?;
    ensure_participant(actor, &order)?;

    let rx = state.store.subscribe_messages();
    let stream = BroadcastStream::new(rx).filter_map(move |result| match result {
        Ok(message) if message.order_id == order_id => Some(ChatUpdate::Message(message)),
        Ok(_) => None,
        Err(BroadcastStreamRecvError::Lagged(missed)) => {
            warn!(order_id = %order_id, missed, "chat subscriber lagged");
            Some(ChatUpdate::Resync { missed })
        }
    });

    Ok(Box::pin(stream))
}
