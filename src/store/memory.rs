use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::bid::Bid;
use crate::models::chat::ChatMessage;
use crate::models::delivery::{DeliveryProof, Rating};
use crate::models::order::DeliveryOrder;
use crate::models::payment::{BillPayment, PaymentRecord};
use crate::models::tracking::TrackingEvent;
use crate::store::{BidWrite, ChangeSet, OrderFilter, OrderWrite, Store, StoreCounts};

/// In-process store. Commits are serialized by `commit_lock`; reads go straight to the
/// tables.
pub struct MemoryStore {
    orders: DashMap<Uuid, DeliveryOrder>,
    idempotency_keys: DashMap<String, Uuid>,
    bids: DashMap<Uuid, Bid>,
    order_bids: DashMap<Uuid, Vec<Uuid>>,
    events: DashMap<Uuid, Vec<TrackingEvent>>,
    proofs: DashMap<Uuid, DeliveryProof>,
    ratings: DashMap<Uuid, Rating>,
    payments: DashMap<String, PaymentRecord>,
    bill_payments: DashMap<Uuid, Vec<BillPayment>>,
    messages: DashMap<Uuid, ChatMessage>,
    order_messages: DashMap<Uuid, Vec<Uuid>>,
    commit_lock: Mutex<()>,
    events_tx: broadcast::Sender<TrackingEvent>,
    messages_tx: broadcast::Sender<ChatMessage>,
}

impl MemoryStore {
    pub fn new(event_buffer_size: usize) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(event_buffer_size);
        let (messages_tx, _unused_rx) = broadcast::channel(event_buffer_size);

        Self {
            orders: DashMap::new(),
            idempotency_keys: DashMap::new(),
            bids: DashMap::new(),
            order_bids: DashMap::new(),
            events: DashMap::new(),
            proofs: DashMap::new(),
            ratings: DashMap::new(),
            payments: DashMap::new(),
            bill_payments: DashMap::new(),
            messages: DashMap::new(),
            order_messages: DashMap::new(),
            commit_lock: Mutex::new(()),
            events_tx,
            messages_tx,
        }
    }

    fn check(&self, changes: &ChangeSet) -> Result<(), AppError> {
        let mut inserted_order = None;

        match &changes.order {
            Some(OrderWrite::Insert {
                order,
                idempotency_key,
            }) => {
                if self.orders.contains_key(&order.id) {
                    return Err(AppError::ConcurrencyConflict(format!(
                        "order {} already exists",
                        order.id
                    )));
                }
                if let Some(key) = idempotency_key {
                    if self.idempotency_keys.contains_key(key) {
                        return Err(AppError::ConcurrencyConflict(format!(
                            "request {key} was already applied"
                        )));
                    }
                }
                inserted_order = Some(order.id);
            }
            Some(OrderWrite::Update {
                order,
                expected_version,
            }) => self.check_version(order.id, *expected_version)?,
            None => {}
        }

        let order_known =
            |id: &Uuid| inserted_order == Some(*id) || self.orders.contains_key(id);

        for write in &changes.bids {
            match write {
                BidWrite::Insert(bid) => {
                    if self.bids.contains_key(&bid.id) {
                        return Err(AppError::ConcurrencyConflict(format!(
                            "bid {} already exists",
                            bid.id
                        )));
                    }
                    if !order_known(&bid.order_id) {
                        return Err(AppError::NotFound(format!(
                            "order {} not found",
                            bid.order_id
                        )));
                    }
                }
                BidWrite::Update { bid, expected } => {
                    let current = self
                        .bids
                        .get(&bid.id)
                        .ok_or_else(|| AppError::NotFound(format!("bid {} not found", bid.id)))?;
                    if current.status != *expected {
                        return Err(AppError::ConcurrencyConflict(format!(
                            "bid {} is {}, expected {}",
                            bid.id,
                            current.status.as_str(),
                            expected.as_str()
                        )));
                    }
                }
            }
        }

        for event in &changes.events {
            if !order_known(&event.order_id) {
                return Err(AppError::NotFound(format!(
                    "order {} not found",
                    event.order_id
                )));
            }
        }

        Ok(())
    }

    fn check_version(&self, order_id: Uuid, expected_version: u64) -> Result<(), AppError> {
        let current = self
            .orders
            .get(&order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

        if current.version != expected_version {
            return Err(AppError::ConcurrencyConflict(format!(
                "order {order_id} is at version {}, expected {expected_version}",
                current.version
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn commit(&self, changes: ChangeSet) -> Result<(), AppError> {
        let _guard = self.commit_lock.lock().await;
        self.check(&changes)?;

        match changes.order {
            Some(OrderWrite::Insert {
                order,
                idempotency_key,
            }) => {
                if let Some(key) = idempotency_key {
                    self.idempotency_keys.insert(key, order.id);
                }
                self.orders.insert(order.id, order);
            }
            Some(OrderWrite::Update { order, .. }) => {
                self.orders.insert(order.id, order);
            }
            None => {}
        }

        for write in changes.bids {
            match write {
                BidWrite::Insert(bid) => {
                    self.order_bids.entry(bid.order_id).or_default().push(bid.id);
                    self.bids.insert(bid.id, bid);
                }
                BidWrite::Update { bid, .. } => {
                    self.bids.insert(bid.id, bid);
                }
            }
        }

        if let Some(proof) = changes.proof {
            self.proofs.insert(proof.order_id, proof);
        }

        for event in changes.events {
            self.events
                .entry(event.order_id)
                .or_default()
                .push(event.clone());
            let _ = self.events_tx.send(event);
        }

        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<DeliveryOrder>, AppError> {
        Ok(self.orders.get(&id).map(|entry| entry.value().clone()))
    }

    async fn order_for_key(&self, key: &str) -> Result<Option<DeliveryOrder>, AppError> {
        let Some(order_id) = self.idempotency_keys.get(key).map(|entry| *entry.value()) else {
            return Ok(None);
        };
        self.get_order(order_id).await
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<DeliveryOrder>, AppError> {
        let mut orders: Vec<DeliveryOrder> = self
            .orders
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();

        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn get_bid(&self, id: Uuid) -> Result<Option<Bid>, AppError> {
        Ok(self.bids.get(&id).map(|entry| entry.value().clone()))
    }

    async fn list_bids(&self, order_id: Uuid) -> Result<Vec<Bid>, AppError> {
        let ids = self
            .order_bids
            .get(&order_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();

        Ok(ids
            .iter()
            .rev()
            .filter_map(|id| self.bids.get(id).map(|entry| entry.value().clone()))
            .collect())
    }

    async fn list_events(&self, order_id: Uuid) -> Result<Vec<TrackingEvent>, AppError> {
        Ok(self
            .events
            .get(&order_id)
            .map(|entry| entry.value().iter().rev().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_proof(&self, order_id: Uuid) -> Result<Option<DeliveryProof>, AppError> {
        Ok(self.proofs.get(&order_id).map(|entry| entry.value().clone()))
    }

    async fn insert_rating(&self, rating: Rating) -> Result<(), AppError> {
        match self.ratings.entry(rating.order_id) {
            Entry::Occupied(_) => Err(AppError::PreconditionFailed(format!(
                "order {} was already rated",
                rating.order_id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(rating);
                Ok(())
            }
        }
    }

    async fn get_rating(&self, order_id: Uuid) -> Result<Option<Rating>, AppError> {
        Ok(self.ratings.get(&order_id).map(|entry| entry.value().clone()))
    }

    async fn put_payment(&self, record: PaymentRecord) -> Result<(), AppError> {
        self.payments.insert(record.reference.clone(), record);
        Ok(())
    }

    async fn get_payment(&self, reference: &str) -> Result<Option<PaymentRecord>, AppError> {
        Ok(self.payments.get(reference).map(|entry| entry.value().clone()))
    }

    async fn put_bill_payment(&self, record: BillPayment) -> Result<(), AppError> {
        self.bill_payments
            .entry(record.user_id)
            .or_default()
            .push(record);
        Ok(())
    }

    async fn list_bill_payments(&self, user_id: Uuid) -> Result<Vec<BillPayment>, AppError> {
        Ok(self
            .bill_payments
            .get(&user_id)
            .map(|entry| entry.value().iter().rev().cloned().collect())
            .unwrap_or_default())
    }

    async fn insert_message(&self, message: ChatMessage) -> Result<(), AppError> {
        match self.messages.entry(message.id) {
            Entry::Occupied(_) => {
                return Err(AppError::ConcurrencyConflict(format!(
                    "message {} already exists",
                    message.id
                )))
            }
            Entry::Vacant(slot) => {
                slot.insert(message.clone());
            }
        }

        self.order_messages
            .entry(message.order_id)
            .or_default()
            .push(message.id);
        let _ = self.messages_tx.send(message);
        Ok(())
    }

    async fn get_message(&self, id: Uuid) -> Result<Option<ChatMessage>, AppError> {
        Ok(self.messages.get(&id).map(|entry| entry.value().clone()))
    }

    async fn list_messages(&self, order_id: Uuid) -> Result<Vec<ChatMessage>, AppError> {
        let ids = self
            .order_messages
            .get(&order_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();

        Ok(ids
            .iter()
            .rev()
            .filter_map(|id| self.messages.get(id).map(|entry| entry.value().clone()))
            .collect())
    }

    async fn mark_message_read(&self, id: Uuid) -> Result<Option<ChatMessage>, AppError> {
        Ok(self.messages.get_mut(&id).map(|mut entry| {
            entry.is_read = true;
            entry.clone()
        }))
    }

    async fn counts(&self) -> Result<StoreCounts, AppError> {
        Ok(StoreCounts {
            orders: self.orders.len(),
            bids: self.bids.len(),
            events: self.events.iter().map(|entry| entry.value().len()).sum(),
            messages: self.messages.len(),
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<TrackingEvent> {
        self.events_tx.subscribe()
    }

    fn subscribe_messages(&self) -> broadcast::Receiver<ChatMessage> {
        self.messages_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::MemoryStore;
    use crate::error::AppError;
    use crate::models::bid::{Bid, BidStatus};
    use crate::models::order::{
        BiddingStatus, DeliveryOrder, DeliveryType, OrderStatus, PackageDetails, PaymentStatus,
        VehicleType,
    };
    use crate::models::tracking::TrackingEvent;
    use crate::store::{ChangeSet, Store};

    fn order() -> DeliveryOrder {
        let now = Utc::now();
        DeliveryOrder {
            id: Uuid::new_v4(),
            order_number: "ORD-TEST-00001".to_string(),
            customer_id: Uuid::new_v4(),
            partner_id: None,
            vehicle_type: VehicleType::Bike,
            delivery_type: DeliveryType::Standard,
            pickup_address: "1 Broad St".to_string(),
            dropoff_address: "9 Marina Rd".to_string(),
            recipient_name: "Ada".to_string(),
            recipient_phone: "08030000000".to_string(),
            package: PackageDetails {
                description: None,
                weight_kg: Some(2.0),
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

    fn bid(order_id: Uuid, amount: i64) -> Bid {
        Bid {
            id: Uuid::new_v4(),
            order_id,
            partner_id: Uuid::new_v4(),
            amount,
            vehicle_type: VehicleType::Bike,
            eta_minutes: 10,
            message: None,
            status: BidStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn stale_version_rejects_whole_change_set() {
        let store = MemoryStore::new(16);
        let order = order();
        store
            .commit(ChangeSet::new().insert_order(order.clone(), None))
            .await
            .unwrap();

        let mut first = order.next_revision();
        first.status = OrderStatus::Cancelled;
        store
            .commit(ChangeSet::new().update_order(first, order.version))
            .await
            .unwrap();

        let mut stale = order.next_revision();
        stale.status = OrderStatus::Accepted;
        let event = TrackingEvent::new(order.id, OrderStatus::Accepted, "late", order.customer_id);
        let err = store
            .commit(ChangeSet::new().update_order(stale, order.version).event(event))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::ConcurrencyConflict(_)));
        let stored = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Cancelled);
        assert!(store.list_events(order.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn bid_update_requires_expected_status() {
        let store = MemoryStore::new(16);
        let order = order();
        let pending = bid(order.id, 700);
        store
            .commit(
                ChangeSet::new()
                    .insert_order(order.clone(), None)
                    .insert_bid(pending.clone()),
            )
            .await
            .unwrap();

        let rejected = pending.with_status(BidStatus::Rejected);
        store
            .commit(ChangeSet::new().update_bid(rejected.clone(), BidStatus::Pending))
            .await
            .unwrap();

        let err = store
            .commit(ChangeSet::new().update_bid(rejected, BidStatus::Pending))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ConcurrencyConflict(_)));
    }

    #[tokio::test]
    async fn lists_are_newest_first_and_events_are_pushed() {
        let store = MemoryStore::new(16);
        let mut rx = store.subscribe();
        let order = order();
        let older = bid(order.id, 700);
        let newer = bid(order.id, 650);
        let event = TrackingEvent::new(order.id, OrderStatus::Pending, "created", order.customer_id);

        store
            .commit(
                ChangeSet::new()
                    .insert_order(order.clone(), Some("req-1".to_string()))
                    .event(event.clone()),
            )
            .await
            .unwrap();
        store
            .commit(ChangeSet::new().insert_bid(older.clone()))
            .await
            .unwrap();
        store
            .commit(
                ChangeSet::new()
                    .update_order(order.next_revision(), order.version)
                    .insert_bid(newer.clone()),
            )
            .await
            .unwrap();

        let bids = store.list_bids(order.id).await.unwrap();
        assert_eq!(bids[0].id, newer.id);
        assert_eq!(bids[1].id, older.id);

        let pushed = rx.recv().await.unwrap();
        assert_eq!(pushed, event);

        let by_key = store.order_for_key("req-1").await.unwrap().unwrap();
        assert_eq!(by_key.id, order.id);
    }
}
