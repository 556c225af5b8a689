use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::order::OrderStatus;

/// Append-only audit entry. Never updated once committed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackingEvent {
    pub id: Uuid,
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub note: String,
    pub actor_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl TrackingEvent {
    pub fn new(order_id: Uuid, status: OrderStatus, note: impl Into<String>, actor_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            status,
            note: note.into(),
            actor_id,
            created_at: Utc::now(),
        }
    }
}
