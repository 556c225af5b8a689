pub mod actor;
pub mod bid;
pub mod chat;
pub mod delivery;
pub mod order;
pub mod payment;
pub mod tracking;
