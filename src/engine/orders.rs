use chrono::{Duration, Utc};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::engine::commit::commit_with_retry;
use crate::engine::fees::{self, validate_distance};
use crate::engine::ids;
use crate::error::AppError;
use crate::models::actor::ActorContext;
use crate::models::delivery::Rating;
use crate::models::order::{
    BiddingStatus, DeliveryOrder, DeliveryType, OrderStatus, PackageDetails, PaymentStatus,
    VehicleType,
};
use crate::models::tracking::TrackingEvent;
use crate::state::AppState;
use crate::store::{ChangeSet, OrderFilter};

pub const CREATED_NOTE: &str = "Order created, open for partner bids";

#[derive(Debug, Clone, Deserialize)]
pub struct NewOrder {
    pub pickup_address: String,
    pub dropoff_address: String,
    pub recipient_name: String,
    pub recipient_phone: String,
    pub vehicle_type: VehicleType,
    pub delivery_type: DeliveryType,
    pub package: PackageDetails,
    pub distance_km: f64,
    /// Client-chosen idempotency key; a replay returns the original order.
    pub request_id: Option<String>,
}

pub async fn load_order(state: &AppState, id: Uuid) -> Result<DeliveryOrder, AppError> {
    state
        .store
        .get_order(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))
}

pub async fn list_orders(
    state: &AppState,
    filter: &OrderFilter,
) -> Result<Vec<DeliveryOrder>, AppError> {
    state.store.list_orders(filter).await
}

pub fn ensure_customer(actor: &ActorContext, order: &DeliveryOrder) -> Result<(), AppError> {
    if actor.user_id != order.customer_id {
        return Err(AppError::Forbidden(format!(
            "only the customer of order {} may do this",
            order.order_number
        )));
    }
    Ok(())
}

pub async fn create_order(
    state: &AppState,
    actor: &ActorContext,
    new_order: NewOrder,
) -> Result<DeliveryOrder, AppError> {
    if !actor.can_order() {
        return Err(AppError::Forbidden("partners cannot create orders".to_string()));
    }
    validate_new_order(&new_order)?;

    let request_key = new_order
        .request_id
        .as_deref()
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(|key| format!("{}:{key}", actor.user_id));

    if let Some(key) = &request_key {
        if let Some(existing) = state.store.order_for_key(key).await? {
            info!(order_id = %existing.id, "order request replayed");
            return Ok(existing);
        }
    }

    let quote = fees::quote(
        new_order.distance_km,
        new_order.delivery_type.multiplier(),
        new_order.package.is_fragile,
    )?;
    let duration = new_order.delivery_type.nominal_duration_minutes();
    let now = Utc::now();

    let order = DeliveryOrder {
        id: Uuid::new_v4(),
        order_number: ids::order_number(),
        customer_id: actor.user_id,
        partner_id: None,
        vehicle_type: new_order.vehicle_type,
        delivery_type: new_order.delivery_type,
        pickup_address: new_order.pickup_address.trim().to_string(),
        dropoff_address: new_order.dropoff_address.trim().to_string(),
        recipient_name: new_order.recipient_name.trim().to_string(),
        recipient_phone: new_order.recipient_phone.trim().to_string(),
        package: new_order.package,
        distance_km: new_order.distance_km,
        estimated_duration_minutes: duration,
        base_fee: quote.base_fee,
        fragile_handling_fee: quote.fragile_handling_fee,
        total_cost: quote.total_cost,
        status: OrderStatus::Pending,
        bid_status: BiddingStatus::OpenForBids,
        selected_bid_id: None,
        bidding_window_minutes: state.settings.bidding_window_minutes,
        bidding_opened_at: now,
        payment_status: PaymentStatus::Pending,
        payment_reference: None,
        estimated_delivery_time: now + Duration::minutes(i64::from(duration)),
        actual_delivery_time: None,
        created_at: now,
        updated_at: now,
        version: 1,
    };

    let event = TrackingEvent::new(order.id, OrderStatus::Pending, CREATED_NOTE, actor.user_id);
    let changes = ChangeSet::new()
        .insert_order(order.clone(), request_key.clone())
        .event(event);

    match commit_with_retry(state, changes, "create_order").await {
        Ok(()) => {}
        Err(AppError::ConcurrencyConflict(msg)) => {
            // A concurrent replay with the same key won the insert.
            if let Some(key) = &request_key {
                if let Some(existing) = state.store.order_for_key(key).await? {
                    return Ok(existing);
                }
            }
            return Err(AppError::ConcurrencyConflict(msg));
        }
        Err(err) => return Err(err),
    }

    state.metrics.orders_created_total.inc();
    info!(
        order_id = %order.id,
        order_number = %order.order_number,
        total_cost = order.total_cost,
        "order created"
    );

    Ok(order)
}

fn validate_new_order(new_order: &NewOrder) -> Result<(), AppError> {
    let required = [
        ("pickup_address", &new_order.pickup_address),
        ("dropoff_address", &new_order.dropoff_address),
        ("recipient_name", &new_order.recipient_name),
        ("recipient_phone", &new_order.recipient_phone),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(AppError::Validation(format!("{field} is required")));
        }
    }

    validate_distance(new_order.distance_km)?;

    if let Some(weight) = new_order.package.weight_kg {
        if !weight.is_finite() || weight < 0.0 {
            return Err(AppError::Validation(
                "package weight must be a non-negative number".to_string(),
            ));
        }
    }
    if new_order.package.declared_value.is_some_and(|value| value < 0) {
        return Err(AppError::Validation(
            "declared value cannot be negative".to_string(),
        ));
    }

    Ok(())
}

pub async fn rate_delivery(
    state: &AppState,
    actor: &ActorContext,
    order_id: Uuid,
    score: u8,
    comment: Option<String>,
) -> Result<Rating, AppError> {
    if !(1..=5).contains(&score) {
        return Err(AppError::Validation("rating must be between 1 and 5".to_string()));
    }

    let order = load_order(state, order_id).await?;
    ensure_customer(actor, &order)?;

    if order.status != OrderStatus::Delivered {
        return Err(AppError::PreconditionFailed(format!(
            "order {} is {}, only delivered orders can be rated",
            order.order_number, order.status
        )));
    }
    let partner_id = order.partner_id.ok_or_else(|| {
        AppError::PreconditionFailed(format!("order {} has no partner", order.order_number))
    })?;

    let rating = Rating {
        id: Uuid::new_v4(),
        order_id,
        customer_id: actor.user_id,
        partner_id,
        score,
        comment: comment
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty()),
        created_at: Utc::now(),
    };
    state.store.insert_rating(rating.clone()).await?;

    info!(order_id = %order_id, score, "delivery rated");
    Ok(rating)
}

pub async fn load_rating(state: &AppState, order_id: Uuid) -> Result<Rating, AppError> {
    state
        .store
        .get_rating(order_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("order {order_id} has not been rated")))
}

#[cfg(test)]
mod tests {
    use super::{create_order, load_rating, rate_delivery, CREATED_NOTE};
    use crate::engine::lifecycle::{
        confirm_pickup, start_transit, submit_delivery_proof, ProofSubmission,
    };
    use crate::engine::testing::{
        accepted_order, customer, customer_of, new_order_request, partner, test_state,
    };
    use crate::error::AppError;
    use crate::models::order::{BiddingStatus, DeliveryType, OrderStatus, PaymentStatus};

    #[tokio::test]
    async fn creates_open_order_with_fees_and_tracking_entry() {
        let state = test_state();
        let actor = customer();
        let mut request = new_order_request();
        request.package.is_fragile = true;

        let order = create_order(&state, &actor, request).await.unwrap();

        assert_eq!(order.base_fee, 1000);
        assert_eq!(order.fragile_handling_fee, 100);
        assert_eq!(order.total_cost, 1100);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.bid_status, BiddingStatus::OpenForBids);
        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert!(order.partner_id.is_none());
        assert!(order.order_number.starts_with("ORD-"));

        let events = state.store.list_events(order.id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, OrderStatus::Pending);
        assert_eq!(events[0].note, CREATED_NOTE);
    }

    #[tokio::test]
    async fn express_order_uses_multiplier_and_short_window() {
        let state = test_state();
        let mut request = new_order_request();
        request.delivery_type = DeliveryType::Express;

        let order = create_order(&state, &customer(), request).await.unwrap();
        assert_eq!(order.base_fee, 1500);
        assert_eq!(order.estimated_duration_minutes, 60);
    }

    #[tokio::test]
    async fn replayed_request_returns_original_order() {
        let state = test_state();
        let actor = customer();
        let mut request = new_order_request();
        request.request_id = Some("checkout-42".to_string());

        let first = create_order(&state, &actor, request.clone()).await.unwrap();
        let second = create_order(&state, &actor, request).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(state.store.counts().await.unwrap().orders, 1);
    }

    #[tokio::test]
    async fn missing_fields_fail_before_any_write() {
        let state = test_state();
        let mut request = new_order_request();
        request.recipient_phone = "   ".to_string();

        let err = create_order(&state, &customer(), request).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(state.store.counts().await.unwrap().orders, 0);

        let mut request = new_order_request();
        request.distance_km = -3.0;
        let err = create_order(&state, &customer(), request).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn partners_cannot_create_orders() {
        let state = test_state();
        let err = create_order(&state, &partner(), new_order_request())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn only_delivered_orders_can_be_rated() {
        let state = test_state();
        let actor = customer();
        let order = create_order(&state, &actor, new_order_request()).await.unwrap();

        let err = rate_delivery(&state, &actor, order.id, 5, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PreconditionFailed(_)));

        let err = rate_delivery(&state, &actor, order.id, 9, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn delivered_order_is_rated_once() {
        let state = test_state();
        let (order, courier) = accepted_order(&state).await;
        confirm_pickup(&state, &courier, order.id).await.unwrap();
        start_transit(&state, &courier, order.id).await.unwrap();
        let proof = ProofSubmission {
            image_url: "https://cdn.example/proof.jpg".to_string(),
            notes: None,
        };
        submit_delivery_proof(&state, &courier, order.id, proof)
            .await
            .unwrap();

        let owner = customer_of(&order);
        let rating = rate_delivery(&state, &owner, order.id, 4, Some(" careful ".to_string()))
            .await
            .unwrap();
        assert_eq!(rating.partner_id, courier.user_id);
        assert_eq!(rating.comment.as_deref(), Some("careful"));
        assert_eq!(load_rating(&state, order.id).await.unwrap().score, 4);

        let err = rate_delivery(&state, &owner, order.id, 5, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PreconditionFailed(_)));
    }
}
