use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Partner,
    Both,
    Admin,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "customer" => Some(Role::Customer),
            "partner" => Some(Role::Partner),
            "both" => Some(Role::Both),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// Who is performing a domain operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActorContext {
    pub user_id: Uuid,
    pub role: Role,
}

impl ActorContext {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn can_order(&self) -> bool {
        matches!(self.role, Role::Customer | Role::Both | Role::Admin)
    }

    pub fn can_bid(&self) -> bool {
        matches!(self.role, Role::Partner | Role::Both)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
