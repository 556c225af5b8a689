use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::Json;
use axum::Router;
use uuid::Uuid;

use crate::api::rest::actor::Actor;
use crate::engine::bidding::{self, BidAcceptance, NewBid};
use crate::error::AppError;
use crate::models::bid::Bid;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders/:id/bids", post(submit_bid).get(list_bids))
        .route("/bids/:id/accept", post(accept_bid))
        .route("/bids/:id/reject", post(reject_bid))
        .route("/bids/:id/withdraw", post(withdraw_bid))
}

async fn submit_bid(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<NewBid>,
) -> Result<(StatusCode, Json<Bid>), AppError> {
    let bid = bidding::submit_bid(&state, &actor, order_id, payload).await?;
    Ok((StatusCode::CREATED, Json(bid)))
}

async fn list_bids(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Vec<Bid>>, AppError> {
    Ok(Json(bidding::list_bids(&state, order_id).await?))
}

async fn accept_bid(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(bid_id): Path<Uuid>,
) -> Result<Json<BidAcceptance>, AppError> {
    Ok(Json(bidding::accept_bid(&state, &actor, bid_id).await?))
}

async fn reject_bid(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(bid_id): Path<Uuid>,
) -> Result<Json<Bid>, AppError> {
    Ok(Json(bidding::reject_bid(&state, &actor, bid_id).await?))
}

async fn withdraw_bid(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(bid_id): Path<Uuid>,
) -> Result<Json<Bid>, AppError> {
    Ok(Json(bidding::withdraw_bid(&state, &actor, bid_id).await?))
}
