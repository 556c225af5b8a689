pub mod bills;
pub mod payment;
