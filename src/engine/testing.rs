//! Shared fixtures for engine tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::engine::bidding::{accept_bid, submit_bid, NewBid};
use crate::engine::commit::RetryPolicy;
use crate::engine::orders::{create_order, NewOrder};
use crate::error::AppError;
use crate::gateways::bills::{BillsAggregator, BillsResponse};
use crate::gateways::payment::{GatewayResponse, PaymentGateway};
use crate::models::actor::{ActorContext, Role};
use crate::models::bid::Bid;
use crate::models::chat::ChatMessage;
use crate::models::delivery::{DeliveryProof, Rating};
use crate::models::order::{
    BiddingStatus, DeliveryOrder, DeliveryType, OrderStatus, PackageDetails, PaymentStatus,
    VehicleType,
};
use crate::models::payment::{BillPayment, PaymentRecord};
use crate::models::tracking::TrackingEvent;
use crate::state::{AppState, DomainSettings};
use crate::store::{ChangeSet, MemoryStore, OrderFilter, Store, StoreCounts};

/// Payment gateway that remembers initialized amounts and reports them back on verify.
#[derive(Default)]
pub struct FakePayments {
    amounts: Mutex<HashMap<String, i64>>,
    pub declined: AtomicBool,
    pub unreachable: AtomicBool,
}

#[async_trait]
impl PaymentGateway for FakePayments {
    async fn initialize_transaction(
        &self,
        _email: &str,
        amount_minor: i64,
        reference: &str,
    ) -> Result<GatewayResponse, AppError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(AppError::RemoteCallFailed("payment gateway unreachable".to_string()));
        }
        self.amounts
            .lock()
            .unwrap()
            .insert(reference.to_string(), amount_minor);

        Ok(GatewayResponse {
            status: true,
            message: "Authorization URL created".to_string(),
            data: Some(json!({
                "authorization_url": format!("https://checkout.example/{reference}"),
                "access_code": "code",
                "reference": reference,
            })),
        })
    }

    async fn verify_transaction(&self, reference: &str) -> Result<GatewayResponse, AppError> {
        let amount = self.amounts.lock().unwrap().get(reference).copied();
        let Some(amount) = amount else {
            return Ok(GatewayResponse {
                status: false,
                message: "Transaction reference not found".to_string(),
                data: None,
            });
        };
        let status = if self.declined.load(Ordering::SeqCst) {
            "failed"
        } else {
            "success"
        };

        Ok(GatewayResponse {
            status: true,
            message: "Verification successful".to_string(),
            data: Some(json!({ "status": status, "reference": reference, "amount": amount })),
        })
    }
}

impl FakePayments {
    /// Distinct references the gateway has opened a transaction for.
    pub fn initialized(&self) -> usize {
        self.amounts.lock().unwrap().len()
    }
}

/// Bills aggregator answering every call with a fixed response code.
pub struct FakeBills {
    pub code: Mutex<String>,
}

impl Default for FakeBills {
    fn default() -> Self {
        Self {
            code: Mutex::new("000".to_string()),
        }
    }
}

impl FakeBills {
    fn respond(&self, content: serde_json::Value) -> Result<BillsResponse, AppError> {
        let code = self.code.lock().unwrap().clone();
        Ok(BillsResponse {
            response_description: Some(if code == "000" {
                "TRANSACTION SUCCESSFUL".to_string()
            } else {
                "TRANSACTION FAILED".to_string()
            }),
            code,
            content,
        })
    }
}

#[async_trait]
impl BillsAggregator for FakeBills {
    async fn purchase_airtime(
        &self,
        service_id: &str,
        phone: &str,
        amount: i64,
        request_id: &str,
    ) -> Result<BillsResponse, AppError> {
        self.respond(json!({ "transactions": {
            "product_name": service_id, "unique_element": phone, "amount": amount,
            "transactionId": request_id, "status": "delivered",
        }}))
    }

    async fn purchase_data(
        &self,
        service_id: &str,
        phone: &str,
        variation_code: &str,
        request_id: &str,
    ) -> Result<BillsResponse, AppError> {
        self.respond(json!({ "transactions": {
            "product_name": service_id, "unique_element": phone,
            "variation_code": variation_code, "transactionId": request_id, "status": "delivered",
        }}))
    }

    async fn verify_smart_card(
        &self,
        card_number: &str,
        _service_id: &str,
    ) -> Result<BillsResponse, AppError> {
        self.respond(json!({ "Customer_Name": "ADA OBI", "Smartcard_Number": card_number }))
    }

    async fn pay_electricity(
        &self,
        meter_number: &str,
        service_id: &str,
        amount: i64,
        _phone: &str,
        request_id: &str,
    ) -> Result<BillsResponse, AppError> {
        self.respond(json!({ "transactions": {
            "product_name": service_id, "unique_element": meter_number, "amount": amount,
            "transactionId": request_id, "status": "delivered",
        }}))
    }
}

/// Memory store whose next `failures` commits fail with a transient error.
pub struct FlakyStore {
    inner: MemoryStore,
    pub failures: AtomicU32,
}

pub fn flaky(failures: u32) -> Arc<FlakyStore> {
    Arc::new(FlakyStore {
        inner: MemoryStore::new(16),
        failures: AtomicU32::new(failures),
    })
}

#[async_trait]
impl Store for FlakyStore {
    async fn commit(&self, changes: ChangeSet) -> Result<(), AppError> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(AppError::RemoteCallFailed("store unavailable".to_string()));
        }
        self.inner.commit(changes).await
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<DeliveryOrder>, AppError> {
        self.inner.get_order(id).await
    }

    async fn order_for_key(&self, key: &str) -> Result<Option<DeliveryOrder>, AppError> {
        self.inner.order_for_key(key).await
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<DeliveryOrder>, AppError> {
        self.inner.list_orders(filter).await
    }

    async fn get_bid(&self, id: Uuid) -> Result<Option<Bid>, AppError> {
        self.inner.get_bid(id).await
    }

    async fn list_bids(&self, order_id: Uuid) -> Result<Vec<Bid>, AppError> {
        self.inner.list_bids(order_id).await
    }

    async fn list_events(&self, order_id: Uuid) -> Result<Vec<TrackingEvent>, AppError> {
        self.inner.list_events(order_id).await
    }

    async fn get_proof(&self, order_id: Uuid) -> Result<Option<DeliveryProof>, AppError> {
        self.inner.get_proof(order_id).await
    }

    async fn insert_rating(&self, rating: Rating) -> Result<(), AppError> {
        self.inner.insert_rating(rating).await
    }

    async fn get_rating(&self, order_id: Uuid) -> Result<Option<Rating>, AppError> {
        self.inner.get_rating(order_id).await
    }

    async fn put_payment(&self, record: PaymentRecord) -> Result<(), AppError> {
        self.inner.put_payment(record).await
    }

    async fn get_payment(&self, reference: &str) -> Result<Option<PaymentRecord>, AppError> {
        self.inner.get_payment(reference).await
    }

    async fn put_bill_payment(&self, record: BillPayment) -> Result<(), AppError> {
        self.inner.put_bill_payment(record).await
    }

    async fn list_bill_payments(&self, user_id: Uuid) -> Result<Vec<BillPayment>, AppError> {
        self.inner.list_bill_payments(user_id).await
    }

    async fn insert_message(&self, message: ChatMessage) -> Result<(), AppError> {
        self.inner.insert_message(message).await
    }

    async fn get_message(&self, id: Uuid) -> Result<Option<ChatMessage>, AppError> {
        self.inner.get_message(id).await
    }

    async fn list_messages(&self, order_id: Uuid) -> Result<Vec<ChatMessage>, AppError> {
        self.inner.list_messages(order_id).await
    }

    async fn mark_message_read(&self, id: Uuid) -> Result<Option<ChatMessage>, AppError> {
        self.inner.mark_message_read(id).await
    }

    async fn counts(&self) -> Result<StoreCounts, AppError> {
        self.inner.counts().await
    }

    fn subscribe(&self) -> broadcast::Receiver<TrackingEvent> {
        self.inner.subscribe()
    }

    fn subscribe_messages(&self) -> broadcast::Receiver<ChatMessage> {
        self.inner.subscribe_messages()
    }
}

fn settings() -> DomainSettings {
    DomainSettings {
        retry: RetryPolicy {
            attempts: 3,
            backoff: Duration::from_millis(1),
        },
        ..DomainSettings::default()
    }
}

pub fn test_state() -> AppState {
    test_state_with_store(Arc::new(MemoryStore::new(64)))
}

pub fn test_state_with_store(store: Arc<dyn Store>) -> AppState {
    test_state_from(
        store,
        Arc::new(FakePayments::default()),
        Arc::new(FakeBills::default()),
    )
}

pub fn test_state_with_gateways(payments: Arc<FakePayments>, bills: Arc<FakeBills>) -> AppState {
    test_state_from(Arc::new(MemoryStore::new(64)), payments, bills)
}

pub fn test_state_from(
    store: Arc<dyn Store>,
    payments: Arc<FakePayments>,
    bills: Arc<FakeBills>,
) -> AppState {
    AppState::new(store, payments, bills, settings())
}

pub fn customer() -> ActorContext {
    ActorContext::new(Uuid::new_v4(), Role::Customer)
}

pub fn partner() -> ActorContext {
    ActorContext::new(Uuid::new_v4(), Role::Partner)
}

pub fn customer_of(order: &DeliveryOrder) -> ActorContext {
    ActorContext::new(order.customer_id, Role::Customer)
}

/// Bare pending order, not yet stored.
pub fn new_order(customer_id: Uuid) -> DeliveryOrder {
    let now = Utc::now();
    DeliveryOrder {
        id: Uuid::new_v4(),
        order_number: "ORD-TEST-00001".to_string(),
        customer_id,
        partner_id: None,
        vehicle_type: VehicleType::Bike,
        delivery_type: DeliveryType::Standard,
        pickup_address: "12 Marina Road".to_string(),
        dropoff_address: "4 Allen Avenue".to_string(),
        recipient_name: "Tola".to_string(),
        recipient_phone: "+2348030000000".to_string(),
        package: PackageDetails {
            description: None,
            weight_kg: None,
            declared_value: None,
            is_fragile: false,
        },
        distance_km: 5.0,
        estimated_duration_minutes: 180,
        base_fee: 1000,
        fragile_handling_fee: 0,
        total_cost: 1000,
        status: OrderStatus::Pending,
        bid_status: BiddingStatus::OpenForBids,
        selected_bid_id: None,
        bidding_window_minutes: 30,
        bidding_opened_at: now,
        payment_status: PaymentStatus::Pending,
        payment_reference: None,
        estimated_delivery_time: now,
        actual_delivery_time: None,
        created_at: now,
        updated_at: now,
        version: 1,
    }
}

/// 5 km standard bike delivery of a non-fragile package.
pub fn new_order_request() -> NewOrder {
    NewOrder {
        pickup_address: "12 Marina Road".to_string(),
        dropoff_address: "4 Allen Avenue".to_string(),
        recipient_name: "Tola".to_string(),
        recipient_phone: "+2348030000000".to_string(),
        vehicle_type: VehicleType::Bike,
        delivery_type: DeliveryType::Standard,
        package: PackageDetails {
            description: Some("documents".to_string()),
            weight_kg: Some(1.5),
            declared_value: None,
            is_fragile: false,
        },
        distance_km: 5.0,
        request_id: None,
    }
}

pub async fn open_order(state: &AppState, actor: &ActorContext) -> DeliveryOrder {
    create_order(state, actor, new_order_request()).await.unwrap()
}

pub async fn submit(state: &AppState, bidder: &ActorContext, order_id: Uuid, amount: i64) -> Bid {
    submit_bid(
        state,
        bidder,
        order_id,
        NewBid {
            amount,
            vehicle_type: VehicleType::Bike,
            eta_minutes: 20,
            message: None,
        },
    )
    .await
    .unwrap()
}

/// Order with an accepted bid, and the partner that won it.
pub async fn accepted_order(state: &AppState) -> (DeliveryOrder, ActorContext) {
    let owner = customer();
    let order = open_order(state, &owner).await;
    let winner = partner();
    let bid = submit(state, &winner, order.id, 800).await;
    let acceptance = accept_bid(state, &owner, bid.id).await.unwrap();
    (acceptance.order, winner)
}
