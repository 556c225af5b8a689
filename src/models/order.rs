use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VehicleType {
    Bike,
    Van,
    Truck,
}

impl VehicleType {
    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "bike" => Some(VehicleType::Bike),
            "van" => Some(VehicleType::Van),
            "truck" => Some(VehicleType::Truck),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryType {
    Standard,
    Express,
    SameDay,
}

impl DeliveryType {
    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "standard" => Some(DeliveryType::Standard),
            "express" => Some(DeliveryType::Express),
            "same_day" => Some(DeliveryType::SameDay),
            _ => None,
        }
    }

    pub fn multiplier(self) -> f64 {
        match self {
            DeliveryType::Standard => 1.0,
            DeliveryType::Express => 1.5,
            DeliveryType::SameDay => 1.2,
        }
    }

    /// Upper bound of the advertised delivery window.
    pub fn nominal_duration_minutes(self) -> u32 {
        match self {
            DeliveryType::Standard => 180,
            DeliveryType::Express => 60,
            DeliveryType::SameDay => 360,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Accepted,
    PickupConfirmed,
    InTransit,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Accepted => "accepted",
            OrderStatus::PickupConfirmed => "pickup_confirmed",
            OrderStatus::InTransit => "in_transit",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BiddingStatus {
    OpenForBids,
    BidsClosed,
    BidAccepted,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageDetails {
    pub description: Option<String>,
    pub weight_kg: Option<f64>,
    pub declared_value: Option<i64>,
    pub is_fragile: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryOrder {
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: Uuid,
    pub partner_id: Option<Uuid>,
    pub vehicle_type: VehicleType,
    pub delivery_type: DeliveryType,
    pub pickup_address: String,
    pub dropoff_address: String,
    pub recipient_name: String,
    pub recipient_phone: String,
    pub package: PackageDetails,
    pub distance_km: f64,
    pub estimated_duration_minutes: u32,
    pub base_fee: i64,
    pub fragile_handling_fee: i64,
    pub total_cost: i64,
    pub status: OrderStatus,
    pub bid_status: BiddingStatus,
    pub selected_bid_id: Option<Uuid>,
    pub bidding_window_minutes: u32,
    pub bidding_opened_at: DateTime<Utc>,
    pub payment_status: PaymentStatus,
    pub payment_reference: Option<String>,
    pub estimated_delivery_time: DateTime<Utc>,
    pub actual_delivery_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Concurrency token, bumped on every committed update.
    pub version: u64,
}

impl DeliveryOrder {
    pub fn bidding_deadline(&self) -> DateTime<Utc> {
        self.bidding_opened_at + chrono::Duration::minutes(i64::from(self.bidding_window_minutes))
    }

    /// Copy of this order with the next version, ready to be committed as an update.
    pub fn next_revision(&self) -> DeliveryOrder {
        let mut next = self.clone();
        next.version = self.version + 1;
        next.updated_at = Utc::now();
        next
    }
}
