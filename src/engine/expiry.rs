use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::engine::bidding::closing_revision;
use crate::engine::commit::{revise_order, Revision};
use crate::error::AppError;
use crate::models::order::{BiddingStatus, OrderStatus};
use crate::state::AppState;
use crate::store::OrderFilter;

pub const EXPIRED_NOTE: &str = "Bidding window expired";

/// Closes bidding on every open order whose window ended before `now`. Returns how many
/// orders were closed.
pub async fn close_expired_bidding(state: &AppState, now: DateTime<Utc>) -> Result<usize, AppError> {
    let filter = OrderFilter {
        status: Some(OrderStatus::Pending),
        bid_status: Some(BiddingStatus::OpenForBids),
        ..OrderFilter::default()
    };
    let candidates = state.store.list_orders(&filter).await?;

    let mut closed = 0;
    for order in candidates.into_iter().filter(|order| order.bidding_deadline() <= now) {
        let expired = AtomicBool::new(false);
        let result = revise_order(state, order.id, "expire_bidding", |current| {
            let expired = &expired;
            async move {
                expired.store(false, Ordering::SeqCst);
                // Re-check against the fresh copy; the customer may have reopened or accepted.
                if current.bid_status != BiddingStatus::OpenForBids
                    || current.status != OrderStatus::Pending
                    || current.bidding_deadline() > now
                {
                    return Ok(Revision::Unchanged(current));
                }
                expired.store(true, Ordering::SeqCst);
                Ok(closing_revision(&current, Uuid::nil(), EXPIRED_NOTE))
            }
        })
        .await;

        match result {
            Ok(_) if expired.load(Ordering::SeqCst) => closed += 1,
            Ok(_) => {}
            Err(err) => warn!(order_id = %order.id, error = %err, "failed to expire bidding"),
        }
    }

    Ok(closed)
}

pub async fn run_bidding_expiry(state: Arc<AppState>, interval: Duration) {
    info!(interval_secs = interval.as_secs(), "bidding expiry sweeper started");

    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;

        match close_expired_bidding(&state, Utc::now()).await {
            Ok(0) => {}
            Ok(closed) => info!(closed, "closed expired bidding windows"),
            Err(err) => error!(error = %err, "bidding expiry sweep failed"),
        }
    }
}
