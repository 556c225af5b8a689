use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::models::order::PaymentStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub reference: String,
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub email: String,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub authorization_url: Option<String>,
    pub gateway_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BillKind {
    Airtime,
    Data,
    Electricity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillPayment {
    pub request_id: String,
    pub user_id: Uuid,
    pub kind: BillKind,
    pub service_id: String,
    pub account: String,
    pub amount: Option<i64>,
    pub status: PaymentStatus,
    pub response_code: String,
    pub content: Value,
    pub created_at: DateTime<Utc>,
}
