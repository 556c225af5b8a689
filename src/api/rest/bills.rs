use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use serde_json::Value;

use crate::api::rest::actor::Actor;
use crate::engine::bills::{self, Network};
use crate::error::AppError;
use crate::models::payment::BillPayment;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/bills", get(history))
        .route("/bills/airtime", post(buy_airtime))
        .route("/bills/data", post(buy_data))
        .route("/bills/electricity", post(pay_electricity))
        .route("/bills/smartcard/verify", post(verify_smart_card))
}

#[derive(Deserialize)]
pub struct AirtimeRequest {
    pub network: Network,
    pub phone: String,
    pub amount: i64,
}

async fn buy_airtime(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Json(payload): Json<AirtimeRequest>,
) -> Result<Json<BillPayment>, AppError> {
    let payment =
        bills::buy_airtime(&state, &actor, payload.network, &payload.phone, payload.amount)
            .await?;
    Ok(Json(payment))
}

#[derive(Deserialize)]
pub struct DataRequest {
    pub network: Network,
    pub phone: String,
    pub variation_code: String,
}

async fn buy_data(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Json(payload): Json<DataRequest>,
) -> Result<Json<BillPayment>, AppError> {
    let payment = bills::buy_data(
        &state,
        &actor,
        payload.network,
        &payload.phone,
        &payload.variation_code,
    )
    .await?;
    Ok(Json(payment))
}

#[derive(Deserialize)]
pub struct ElectricityRequest {
    pub meter_number: String,
    pub service_id: String,
    pub amount: i64,
    pub phone: String,
}

async fn pay_electricity(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Json(payload): Json<ElectricityRequest>,
) -> Result<Json<BillPayment>, AppError> {
    let payment = bills::pay_electricity(
        &state,
        &actor,
        &payload.meter_number,
        &payload.service_id,
        payload.amount,
        &payload.phone,
    )
    .await?;
    Ok(Json(payment))
}

#[derive(Deserialize)]
pub struct SmartCardRequest {
    pub card_number: String,
    pub service_id: String,
}

async fn verify_smart_card(
    State(state): State<Arc<AppState>>,
    Actor(_actor): Actor,
    Json(payload): Json<SmartCardRequest>,
) -> Result<Json<Value>, AppError> {
    let content =
        bills::verify_smart_card(&state, &payload.card_number, &payload.service_id).await?;
    Ok(Json(content))
}

async fn history(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
) -> Result<Json<Vec<BillPayment>>, AppError> {
    Ok(Json(bills::history(&state, &actor).await?))
}
