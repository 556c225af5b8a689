use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::engine::commit::{commit_with_retry, revise_order, Revision};
use crate::engine::lifecycle::{record_transition, transitioned};
use crate::engine::orders::{ensure_customer, load_order};
use crate::error::AppError;
use crate::models::actor::ActorContext;
use crate::models::bid::{Bid, BidStatus};
use crate::models::order::{BiddingStatus, DeliveryOrder, OrderStatus, VehicleType};
use crate::models::tracking::TrackingEvent;
use crate::state::AppState;
use crate::store::ChangeSet;

#[derive(Debug, Clone, Deserialize)]
pub struct NewBid {
    pub amount: i64,
    pub vehicle_type: VehicleType,
    pub eta_minutes: u32,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BidAcceptance {
    pub order: DeliveryOrder,
    pub bid: Bid,
}

pub async fn load_bid(state: &AppState, id: Uuid) -> Result<Bid, AppError> {
    state
        .store
        .get_bid(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("bid {id} not found")))
}

/// Bids on an order, newest first.
pub async fn list_bids(state: &AppState, order_id: Uuid) -> Result<Vec<Bid>, AppError> {
    load_order(state, order_id).await?;
    state.store.list_bids(order_id).await
}

fn ensure_open(order: &DeliveryOrder) -> Result<(), AppError> {
    if order.bid_status != BiddingStatus::OpenForBids || order.status != OrderStatus::Pending {
        return Err(AppError::PreconditionFailed(format!(
            "order {} is not open for bids",
            order.order_number
        )));
    }
    Ok(())
}

/// Inserting a bid bumps the order version, so an acceptance planned against the old bid
/// set cannot commit.
pub async fn submit_bid(
    state: &AppState,
    actor: &ActorContext,
    order_id: Uuid,
    new_bid: NewBid,
) -> Result<Bid, AppError> {
    if !actor.can_bid() {
        return Err(AppError::Forbidden("only partners can bid".to_string()));
    }
    if new_bid.amount <= 0 {
        return Err(AppError::Validation("bid amount must be greater than 0".to_string()));
    }
    if new_bid.eta_minutes == 0 {
        return Err(AppError::Validation(
            "estimated pickup time must be greater than 0".to_string(),
        ));
    }

    let now = Utc::now();
    let bid = Bid {
        id: Uuid::new_v4(),
        order_id,
        partner_id: actor.user_id,
        amount: new_bid.amount,
        vehicle_type: new_bid.vehicle_type,
        eta_minutes: new_bid.eta_minutes,
        message: new_bid
            .message
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty()),
        status: BidStatus::Pending,
        created_at: now,
        updated_at: now,
    };

    revise_order(state, order_id, "submit_bid", |order| {
        let bid = bid.clone();
        async move {
            ensure_open(&order)?;
            if order.customer_id == actor.user_id {
                return Err(AppError::Forbidden(
                    "customers cannot bid on their own orders".to_string(),
                ));
            }
            Ok(Revision::commit(
                order.next_revision(),
                ChangeSet::new().insert_bid(bid),
            ))
        }
    })
    .await?;

    state.metrics.bids_total.with_label_values(&["submitted"]).inc();
    info!(order_id = %order_id, bid_id = %bid.id, amount = bid.amount, "bid submitted");
    Ok(bid)
}

/// Accepts one bid: the bid becomes `accepted`, every other pending bid on the order
/// `rejected`, and the order moves to `accepted` with the partner assigned. All of it lands
/// in one change set guarded by the order version, so at most one bid per order is ever
/// accepted. Repeating the call for the already selected bid is a no-op.
pub async fn accept_bid(
    state: &AppState,
    actor: &ActorContext,
    bid_id: Uuid,
) -> Result<BidAcceptance, AppError> {
    let target = load_bid(state, bid_id).await?;
    let replayed = AtomicBool::new(false);
    let rejected = AtomicUsize::new(0);

    let order = revise_order(state, target.order_id, "accept_bid", |order| {
        let replayed = &replayed;
        let rejected = &rejected;
        async move {
            ensure_customer(actor, &order)?;

            if order.bid_status == BiddingStatus::BidAccepted
                && order.selected_bid_id == Some(bid_id)
            {
                debug!(order_id = %order.id, bid_id = %bid_id, "bid already accepted");
                replayed.store(true, Ordering::SeqCst);
                return Ok(Revision::Unchanged(order));
            }
            if order.bid_status != BiddingStatus::OpenForBids {
                return Err(AppError::PreconditionFailed(format!(
                    "order {} is not open for bids",
                    order.order_number
                )));
            }

            let bids = state.store.list_bids(order.id).await?;
            let bid = bids
                .iter()
                .find(|bid| bid.id == bid_id)
                .ok_or_else(|| AppError::NotFound(format!("bid {bid_id} not found")))?;
            if bid.status != BidStatus::Pending {
                return Err(AppError::PreconditionFailed(format!(
                    "bid {bid_id} is {}",
                    bid.status.as_str()
                )));
            }

            let mut claimed = order.clone();
            claimed.partner_id = Some(bid.partner_id);
            claimed.selected_bid_id = Some(bid.id);
            claimed.bid_status = BiddingStatus::BidAccepted;
            let next = transitioned(&claimed, OrderStatus::Accepted)?;

            let mut changes = ChangeSet::new()
                .update_bid(bid.with_status(BidStatus::Accepted), BidStatus::Pending);
            let mut competitors = 0;
            for competitor in bids
                .iter()
                .filter(|other| other.id != bid_id && other.status == BidStatus::Pending)
            {
                changes = changes.update_bid(
                    competitor.with_status(BidStatus::Rejected),
                    BidStatus::Pending,
                );
                competitors += 1;
            }
            rejected.store(competitors, Ordering::SeqCst);

            let event = TrackingEvent::new(
                order.id,
                OrderStatus::Accepted,
                format!("Bid of {} accepted, partner assigned", bid.amount),
                actor.user_id,
            );
            Ok(Revision::commit(next, changes.event(event)))
        }
    })
    .await?;

    let bid = load_bid(state, bid_id).await?;
    if replayed.load(Ordering::SeqCst) {
        return Ok(BidAcceptance { order, bid });
    }

    let rejected = rejected.load(Ordering::SeqCst);
    state.metrics.bids_total.with_label_values(&["accepted"]).inc();
    state
        .metrics
        .bids_total
        .with_label_values(&["rejected"])
        .inc_by(rejected as u64);
    record_transition(state, &order);

    info!(
        order_id = %order.id,
        bid_id = %bid_id,
        partner_id = ?order.partner_id,
        rejected,
        "bid accepted"
    );
    Ok(BidAcceptance { order, bid })
}

/// Rejects a single pending bid. Rejecting an already rejected bid is a no-op.
pub async fn reject_bid(
    state: &AppState,
    actor: &ActorContext,
    bid_id: Uuid,
) -> Result<Bid, AppError> {
    let bid = load_bid(state, bid_id).await?;
    let order = load_order(state, bid.order_id).await?;
    ensure_customer(actor, &order)?;

    let rejected = settle_bid(state, bid, BidStatus::Rejected).await?;
    info!(order_id = %order.id, bid_id = %bid_id, "bid rejected");
    Ok(rejected)
}

/// Lets a partner take back their own pending bid.
pub async fn withdraw_bid(
    state: &AppState,
    actor: &ActorContext,
    bid_id: Uuid,
) -> Result<Bid, AppError> {
    let bid = load_bid(state, bid_id).await?;
    if bid.partner_id != actor.user_id {
        return Err(AppError::Forbidden(format!(
            "bid {bid_id} belongs to another partner"
        )));
    }

    let withdrawn = settle_bid(state, bid, BidStatus::Withdrawn).await?;
    info!(order_id = %withdrawn.order_id, bid_id = %bid_id, "bid withdrawn");
    Ok(withdrawn)
}

/// Moves a pending bid to a terminal status exactly once.
async fn settle_bid(state: &AppState, bid: Bid, outcome: BidStatus) -> Result<Bid, AppError> {
    if bid.status == outcome {
        return Ok(bid);
    }
    if bid.status != BidStatus::Pending {
        return Err(AppError::PreconditionFailed(format!(
            "bid {} is already {}",
            bid.id,
            bid.status.as_str()
        )));
    }

    let settled = bid.with_status(outcome);
    let changes = ChangeSet::new().update_bid(settled.clone(), BidStatus::Pending);
    match commit_with_retry(state, changes, outcome.as_str()).await {
        Ok(()) => {}
        Err(AppError::ConcurrencyConflict(msg)) => {
            // Someone settled it first; fine if they did what we wanted.
            let current = load_bid(state, bid.id).await?;
            if current.status == outcome {
                return Ok(current);
            }
            return Err(AppError::ConcurrencyConflict(msg));
        }
        Err(err) => return Err(err),
    }

    state
        .metrics
        .bids_total
        .with_label_values(&[outcome.as_str()])
        .inc();
    Ok(settled)
}

/// Stops accepting bids on a pending order.
pub async fn close_bidding(
    state: &AppState,
    actor: &ActorContext,
    order_id: Uuid,
) -> Result<DeliveryOrder, AppError> {
    let order = revise_order(state, order_id, "close_bidding", |order| async move {
        ensure_customer(actor, &order)?;
        if order.bid_status == BiddingStatus::BidsClosed {
            return Ok(Revision::Unchanged(order));
        }
        ensure_open(&order)?;
        Ok(closing_revision(&order, actor.user_id, "Bidding closed by customer"))
    })
    .await?;

    info!(order_id = %order_id, "bidding closed");
    Ok(order)
}

/// Re-opens bidding on a pending order and restarts its bidding window.
pub async fn reopen_bidding(
    state: &AppState,
    actor: &ActorContext,
    order_id: Uuid,
) -> Result<DeliveryOrder, AppError> {
    let order = revise_order(state, order_id, "reopen_bidding", |order| async move {
        ensure_customer(actor, &order)?;
        if order.bid_status == BiddingStatus::OpenForBids {
            return Ok(Revision::Unchanged(order));
        }
        if order.bid_status != BiddingStatus::BidsClosed || order.status != OrderStatus::Pending {
            return Err(AppError::PreconditionFailed(format!(
                "bidding on order {} cannot be reopened",
                order.order_number
            )));
        }

        let mut next = order.next_revision();
        next.bid_status = BiddingStatus::OpenForBids;
        next.bidding_opened_at = next.updated_at;

        let event = TrackingEvent::new(
            order.id,
            order.status,
            "Bidding reopened",
            actor.user_id,
        );
        Ok(Revision::commit(next, ChangeSet::new().event(event)))
    })
    .await?;

    info!(order_id = %order_id, "bidding reopened");
    Ok(order)
}

/// Revision that closes bidding on an open order; the order status stays `pending`.
pub(crate) fn closing_revision(order: &DeliveryOrder, actor_id: Uuid, note: &str) -> Revision {
    let mut next = order.next_revision();
    next.bid_status = BiddingStatus::BidsClosed;

    let event = TrackingEvent::new(order.id, order.status, note, actor_id);
    Revision::commit(next, ChangeSet::new().event(event))
}
