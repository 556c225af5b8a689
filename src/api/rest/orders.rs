use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::rest::actor::Actor;
use crate::engine::bidding;
use crate::engine::fees::{self, FeeQuote};
use crate::engine::lifecycle::{self, ProofSubmission};
use crate::engine::orders::{self, NewOrder};
use crate::error::AppError;
use crate::models::delivery::{DeliveryProof, Rating};
use crate::models::order::{
    BiddingStatus, DeliveryOrder, DeliveryType, OrderStatus, PackageDetails, VehicleType,
};
use crate::state::AppState;
use crate::store::OrderFilter;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/quote", get(quote))
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/cancel", post(cancel_order))
        .route("/orders/:id/pickup", post(confirm_pickup))
        .route("/orders/:id/transit", post(start_transit))
        .route("/orders/:id/proof", post(submit_proof).get(get_proof))
        .route("/orders/:id/rating", post(rate_order).get(get_rating))
        .route("/orders/:id/bidding/close", post(close_bidding))
        .route("/orders/:id/bidding/reopen", post(reopen_bidding))
}

#[derive(Deserialize)]
pub struct QuoteQuery {
    pub distance_km: f64,
    pub delivery_type: Option<String>,
    #[serde(default)]
    pub fragile: bool,
}

#[derive(Serialize)]
pub struct QuoteResponse {
    #[serde(flatten)]
    pub quote: FeeQuote,
    pub suggested_bid: i64,
}

async fn quote(Query(query): Query<QuoteQuery>) -> Result<Json<QuoteResponse>, AppError> {
    let multiplier = fees::multiplier_for(query.delivery_type.as_deref().unwrap_or("standard"));
    let quote = fees::quote(query.distance_km, multiplier, query.fragile)?;

    Ok(Json(QuoteResponse {
        quote,
        suggested_bid: fees::suggested_bid(quote.total_cost),
    }))
}

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub pickup_address: String,
    pub dropoff_address: String,
    pub recipient_name: String,
    pub recipient_phone: String,
    pub vehicle_type: String,
    pub delivery_type: String,
    pub package: PackageDetails,
    pub distance_km: f64,
    pub request_id: Option<String>,
}

impl TryFrom<CreateOrderRequest> for NewOrder {
    type Error = AppError;

    fn try_from(request: CreateOrderRequest) -> Result<Self, Self::Error> {
        let vehicle_type = VehicleType::parse(&request.vehicle_type).ok_or_else(|| {
            AppError::Validation(format!("unknown vehicle type {}", request.vehicle_type))
        })?;
        let delivery_type = DeliveryType::parse(&request.delivery_type).ok_or_else(|| {
            AppError::Validation(format!("unknown delivery type {}", request.delivery_type))
        })?;

        Ok(NewOrder {
            pickup_address: request.pickup_address,
            dropoff_address: request.dropoff_address,
            recipient_name: request.recipient_name,
            recipient_phone: request.recipient_phone,
            vehicle_type,
            delivery_type,
            package: request.package,
            distance_km: request.distance_km,
            request_id: request.request_id,
        })
    }
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<DeliveryOrder>), AppError> {
    let order = orders::create_order(&state, &actor, payload.try_into()?).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

#[derive(Deserialize)]
pub struct ListOrdersQuery {
    pub customer_id: Option<Uuid>,
    pub partner_id: Option<Uuid>,
    pub status: Option<OrderStatus>,
    pub bid_status: Option<BiddingStatus>,
}

async fn list_orders(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<Vec<DeliveryOrder>>, AppError> {
    let filter = OrderFilter {
        customer_id: query.customer_id,
        partner_id: query.partner_id,
        status: query.status,
        bid_status: query.bid_status,
    };
    Ok(Json(orders::list_orders(&state, &filter).await?))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryOrder>, AppError> {
    Ok(Json(orders::load_order(&state, id).await?))
}

#[derive(Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

async fn cancel_order(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
    payload: Option<Json<CancelRequest>>,
) -> Result<Json<DeliveryOrder>, AppError> {
    let reason = payload.and_then(|Json(request)| request.reason);
    Ok(Json(lifecycle::cancel(&state, &actor, id, reason).await?))
}

async fn confirm_pickup(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryOrder>, AppError> {
    Ok(Json(lifecycle::confirm_pickup(&state, &actor, id).await?))
}

async fn start_transit(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryOrder>, AppError> {
    Ok(Json(lifecycle::start_transit(&state, &actor, id).await?))
}

async fn submit_proof(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<ProofSubmission>,
) -> Result<Json<DeliveryOrder>, AppError> {
    Ok(Json(
        lifecycle::submit_delivery_proof(&state, &actor, id, payload).await?,
    ))
}

async fn get_proof(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryProof>, AppError> {
    Ok(Json(lifecycle::delivery_proof(&state, id).await?))
}

#[derive(Deserialize)]
pub struct RatingRequest {
    pub score: u8,
    pub comment: Option<String>,
}

async fn rate_order(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<RatingRequest>,
) -> Result<(StatusCode, Json<Rating>), AppError> {
    let rating = orders::rate_delivery(&state, &actor, id, payload.score, payload.comment).await?;
    Ok((StatusCode::CREATED, Json(rating)))
}

async fn get_rating(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Rating>, AppError> {
    Ok(Json(orders::load_rating(&state, id).await?))
}

async fn close_bidding(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryOrder>, AppError> {
    Ok(Json(bidding::close_bidding(&state, &actor, id).await?))
}

async fn reopen_bidding(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryOrder>, AppError> {
    Ok(Json(bidding::reopen_bidding(&state, &actor, id).await?))
}
