//! Persistence and realtime collaborator.
//!
//! Every order, bid and tracking mutation goes through [`Store::commit`], which applies a
//! [`ChangeSet`] atomically: either every guard holds and every write lands, or nothing is
//! written. Committed tracking events are pushed to subscribers. Chat messages live beside
//! the order tables and are pushed on their own channel.

pub mod memory;

use async_trait::async_trait;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::bid::{Bid, BidStatus};
use crate::models::chat::ChatMessage;
use crate::models::delivery::{DeliveryProof, Rating};
use crate::models::order::{BiddingStatus, DeliveryOrder, OrderStatus};
use crate::models::payment::{BillPayment, PaymentRecord};
use crate::models::tracking::TrackingEvent;

pub use memory::MemoryStore;

#[derive(Debug, Clone)]
pub enum OrderWrite {
    Insert {
        order: DeliveryOrder,
        idempotency_key: Option<String>,
    },
    /// Replaces the stored order if its version still equals `expected_version`.
    Update {
        order: DeliveryOrder,
        expected_version: u64,
    },
}

#[derive(Debug, Clone)]
pub enum BidWrite {
    Insert(Bid),
    Update { bid: Bid, expected: BidStatus },
}

#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub order: Option<OrderWrite>,
    pub bids: Vec<BidWrite>,
    pub events: Vec<TrackingEvent>,
    pub proof: Option<DeliveryProof>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_order(mut self, order: DeliveryOrder, idempotency_key: Option<String>) -> Self {
        self.order = Some(OrderWrite::Insert {
            order,
            idempotency_key,
        });
        self
    }

    pub fn update_order(mut self, order: DeliveryOrder, expected_version: u64) -> Self {
        self.order = Some(OrderWrite::Update {
            order,
            expected_version,
        });
        self
    }

    pub fn insert_bid(mut self, bid: Bid) -> Self {
        self.bids.push(BidWrite::Insert(bid));
        self
    }

    pub fn update_bid(mut self, bid: Bid, expected: BidStatus) -> Self {
        self.bids.push(BidWrite::Update { bid, expected });
        self
    }

    pub fn event(mut self, event: TrackingEvent) -> Self {
        self.events.push(event);
        self
    }

    pub fn proof(mut self, proof: DeliveryProof) -> Self {
        self.proof = Some(proof);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub customer_id: Option<Uuid>,
    pub partner_id: Option<Uuid>,
    pub status: Option<OrderStatus>,
    pub bid_status: Option<BiddingStatus>,
}

impl OrderFilter {
    pub fn matches(&self, order: &DeliveryOrder) -> bool {
        self.customer_id.is_none_or(|id| order.customer_id == id)
            && self.partner_id.is_none_or(|id| order.partner_id == Some(id))
            && self.status.is_none_or(|status| order.status == status)
            && self.bid_status.is_none_or(|status| order.bid_status == status)
    }
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct StoreCounts {
    pub orders: usize,
    pub bids: usize,
    pub events: usize,
    pub messages: usize,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn commit(&self, changes: ChangeSet) -> Result<(), AppError>;

    async fn get_order(&self, id: Uuid) -> Result<Option<DeliveryOrder>, AppError>;

    async fn order_for_key(&self, key: &str) -> Result<Option<DeliveryOrder>, AppError>;

    /// Matching orders, newest first.
    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<DeliveryOrder>, AppError>;

    async fn get_bid(&self, id: Uuid) -> Result<Option<Bid>, AppError>;

    /// Bids on an order, newest first.
    async fn list_bids(&self, order_id: Uuid) -> Result<Vec<Bid>, AppError>;

    /// Tracking events of an order, newest first.
    async fn list_events(&self, order_id: Uuid) -> Result<Vec<TrackingEvent>, AppError>;

    async fn get_proof(&self, order_id: Uuid) -> Result<Option<DeliveryProof>, AppError>;

    /// Fails with `PreconditionFailed` if the order was already rated.
    async fn insert_rating(&self, rating: Rating) -> Result<(), AppError>;

    async fn get_rating(&self, order_id: Uuid) -> Result<Option<Rating>, AppError>;

    async fn put_payment(&self, record: PaymentRecord) -> Result<(), AppError>;

    async fn get_payment(&self, reference: &str) -> Result<Option<PaymentRecord>, AppError>;

    async fn put_bill_payment(&self, record: BillPayment) -> Result<(), AppError>;

    /// Bill payments of a user, newest first.
    async fn list_bill_payments(&self, user_id: Uuid) -> Result<Vec<BillPayment>, AppError>;

    async fn insert_message(&self, message: ChatMessage) -> Result<(), AppError>;

    async fn get_message(&self, id: Uuid) -> Result<Option<ChatMessage>, AppError>;

    /// Chat messages of an order, newest first.
    async fn list_messages(&self, order_id: Uuid) -> Result<Vec<ChatMessage>, AppError>;

    /// Flags the message as read and returns it, or `None` if it does not exist.
    async fn mark_message_read(&self, id: Uuid) -> Result<Option<ChatMessage>, AppError>;

    async fn counts(&self) -> Result<StoreCounts, AppError>;

    fn subscribe(&self) -> broadcast::Receiver<TrackingEvent>;

    fn subscribe_messages(&self) -> broadcast::Receiver<ChatMessage>;
}
