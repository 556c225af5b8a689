use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::actor::Actor;
use crate::engine::payments::{self, PaymentCheckout};
use crate::error::AppError;
use crate::models::payment::PaymentRecord;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders/:id/payment", post(initialize_payment))
        .route("/payments/:reference/verify", post(verify_payment))
}

#[derive(Deserialize)]
pub struct InitializePaymentRequest {
    pub email: String,
}

async fn initialize_payment(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<InitializePaymentRequest>,
) -> Result<Json<PaymentCheckout>, AppError> {
    let checkout = payments::initialize_payment(&state, &actor, order_id, &payload.email).await?;
    Ok(Json(checkout))
}

async fn verify_payment(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(reference): Path<String>,
) -> Result<Json<PaymentRecord>, AppError> {
    Ok(Json(payments::verify_payment(&state, &actor, &reference).await?))
}
