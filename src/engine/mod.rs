pub mod bidding;
pub mod bills;
pub mod chat;
pub mod commit;
pub mod expiry;
pub mod feed;
pub mod fees;
pub mod ids;
pub mod lifecycle;
pub mod orders;
pub mod payments;

#[cfg(test)]
mod testing;
