//! Order status state machine.
//!
//! ```text
//! pending -> accepted -> pickup_confirmed -> in_transit -> delivered
//!    \__________\______________\_________________\-------> cancelled
//! ```
//!
//! `delivered` and `cancelled` are terminal. Every committed transition carries exactly one
//! tracking event in the same change set.

use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::engine::commit::{revise_order, Revision};
use crate::engine::orders::{ensure_customer, load_order};
use crate::error::AppError;
use crate::models::actor::ActorContext;
use crate::models::bid::BidStatus;
use crate::models::delivery::DeliveryProof;
use crate::models::order::{BiddingStatus, DeliveryOrder, OrderStatus};
use crate::models::tracking::TrackingEvent;
use crate::state::AppState;
use crate::store::ChangeSet;

#[derive(Debug, Clone, Deserialize)]
pub struct ProofSubmission {
    pub image_url: String,
    pub notes: Option<String>,
}

pub fn check_transition(from: OrderStatus, to: OrderStatus) -> Result<(), AppError> {
    if from.is_terminal() {
        return Err(AppError::InvalidTransition(format!(
            "order is {from}; no further transitions are allowed"
        )));
    }

    let allowed = matches!(
        (from, to),
        (OrderStatus::Pending, OrderStatus::Accepted)
            | (OrderStatus::Accepted, OrderStatus::PickupConfirmed)
            | (OrderStatus::PickupConfirmed, OrderStatus::InTransit)
            | (OrderStatus::InTransit, OrderStatus::Delivered)
            | (_, OrderStatus::Cancelled)
    );

    if !allowed {
        return Err(AppError::InvalidTransition(format!(
            "cannot move order from {from} to {to}"
        )));
    }
    Ok(())
}

/// Guard for `pending -> accepted`: the order must carry the accepted bid and its partner.
pub fn ensure_bid_selected(order: &DeliveryOrder) -> Result<(), AppError> {
    if order.selected_bid_id.is_none() || order.partner_id.is_none() {
        return Err(AppError::PreconditionFailed(format!(
            "order {} has no accepted bid",
            order.order_number
        )));
    }
    Ok(())
}

/// Next revision of `order` in status `to`, after checking the transition is legal.
pub fn transitioned(order: &DeliveryOrder, to: OrderStatus) -> Result<DeliveryOrder, AppError> {
    check_transition(order.status, to)?;

    let mut next = order.next_revision();
    next.status = to;
    if to == OrderStatus::Accepted {
        ensure_bid_selected(&next)?;
    }
    Ok(next)
}

fn ensure_assigned_partner(actor: &ActorContext, order: &DeliveryOrder) -> Result<(), AppError> {
    if order.partner_id != Some(actor.user_id) {
        return Err(AppError::Forbidden(format!(
            "only the assigned partner may update order {}",
            order.order_number
        )));
    }
    Ok(())
}

pub async fn confirm_pickup(
    state: &AppState,
    actor: &ActorContext,
    order_id: Uuid,
) -> Result<DeliveryOrder, AppError> {
    partner_step(
        state,
        actor,
        order_id,
        OrderStatus::PickupConfirmed,
        "Package picked up by partner",
    )
    .await
}

pub async fn start_transit(
    state: &AppState,
    actor: &ActorContext,
    order_id: Uuid,
) -> Result<DeliveryOrder, AppError> {
    partner_step(
        state,
        actor,
        order_id,
        OrderStatus::InTransit,
        "Partner is on the way to the drop-off",
    )
    .await
}

async fn partner_step(
    state: &AppState,
    actor: &ActorContext,
    order_id: Uuid,
    to: OrderStatus,
    note: &'static str,
) -> Result<DeliveryOrder, AppError> {
    let order = revise_order(state, order_id, to.as_str(), |order| async move {
        let next = transitioned(&order, to)?;
        ensure_assigned_partner(actor, &order)?;

        let event = TrackingEvent::new(order.id, to, note, actor.user_id);
        Ok(Revision::commit(next, ChangeSet::new().event(event)))
    })
    .await?;

    record_transition(state, &order);
    Ok(order)
}

/// `in_transit -> delivered`, the only way an order becomes delivered.
pub async fn submit_delivery_proof(
    state: &AppState,
    actor: &ActorContext,
    order_id: Uuid,
    submission: ProofSubmission,
) -> Result<DeliveryOrder, AppError> {
    let image_url = submission.image_url.trim().to_string();
    if image_url.is_empty() {
        return Err(AppError::Validation("a proof image is required".to_string()));
    }
    let notes = submission
        .notes
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty());

    let order = revise_order(state, order_id, "deliver", |order| {
        let image_url = image_url.clone();
        let notes = notes.clone();
        async move {
            let mut next = transitioned(&order, OrderStatus::Delivered)?;
            ensure_assigned_partner(actor, &order)?;

            let now = Utc::now();
            next.actual_delivery_time = Some(now);

            let proof = DeliveryProof {
                id: Uuid::new_v4(),
                order_id: order.id,
                partner_id: actor.user_id,
                image_url,
                notes,
                created_at: now,
            };
            let event = TrackingEvent::new(
                order.id,
                OrderStatus::Delivered,
                "Delivery completed with proof",
                actor.user_id,
            );
            Ok(Revision::commit(next, ChangeSet::new().proof(proof).event(event)))
        }
    })
    .await?;

    record_transition(state, &order);
    Ok(order)
}

/// Cancels from any non-terminal status. If no bid was accepted yet, bidding is closed and
/// the pending bids are rejected in the same change set.
pub async fn cancel(
    state: &AppState,
    actor: &ActorContext,
    order_id: Uuid,
    reason: Option<String>,
) -> Result<DeliveryOrder, AppError> {
    let note = reason
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .map(|text| format!("Order cancelled: {text}"))
        .unwrap_or_else(|| "Order cancelled by customer".to_string());

    let order = revise_order(state, order_id, "cancel", |order| {
        let note = note.clone();
        async move {
            let mut next = transitioned(&order, OrderStatus::Cancelled)?;
            if !actor.is_admin() {
                ensure_customer(actor, &order)?;
            }

            let mut changes = ChangeSet::new();
            if order.bid_status != BiddingStatus::BidAccepted {
                next.bid_status = BiddingStatus::BidsClosed;
                for bid in state.store.list_bids(order.id).await? {
                    if bid.status == BidStatus::Pending {
                        changes = changes
                            .update_bid(bid.with_status(BidStatus::Rejected), BidStatus::Pending);
                    }
                }
            }

            let event = TrackingEvent::new(order.id, OrderStatus::Cancelled, note, actor.user_id);
            Ok(Revision::commit(next, changes.event(event)))
        }
    })
    .await?;

    record_transition(state, &order);
    Ok(order)
}

pub async fn delivery_proof(state: &AppState, order_id: Uuid) -> Result<DeliveryProof, AppError> {
    load_order(state, order_id).await?;
    state
        .store
        .get_proof(order_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("order {order_id} has no delivery proof")))
}

pub(crate) fn record_transition(state: &AppState, order: &DeliveryOrder) {
    state
        .metrics
        .order_transitions_total
        .with_label_values(&[order.status.as_str()])
        .inc();
    info!(
        order_id = %order.id,
        status = %order.status,
        version = order.version,
        "order status changed"
    );
}
