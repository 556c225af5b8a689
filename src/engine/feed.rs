use std::pin::Pin;

use futures::Stream;
use serde::Serialize;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::warn;
use uuid::Uuid;

use crate::engine::orders::load_order;
use crate::error::AppError;
use crate::models::tracking::TrackingEvent;
use crate::state::AppState;

pub type FeedStream = Pin<Box<dyn Stream<Item = FeedUpdate> + Send>>;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedUpdate {
    Event(TrackingEvent),
    /// The subscriber fell behind and lost `missed` events; reload the history.
    Resync { missed: u64 },
}

/// Tracking history of an order, newest first.
pub async fn history(state: &AppState, order_id: Uuid) -> Result<Vec<TrackingEvent>, AppError> {
    load_order(state, order_id).await?;
    state.store.list_events(order_id).await
}

/// Live tracking events of one order, in commit order. Only committed events are delivered.
pub async fn subscribe(state: &AppState, order_id: Uuid) -> Result<FeedStream, AppError> {
    load_order(state, order_id).await?;

    let rx = state.store.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |result| match result {
        Ok(event) if event.order_id == order_id => Some(FeedUpdate::Event(event)),
        Ok(_) => None,
        Err(BroadcastStreamRecvError::Lagged(missed)) => {
            warn!(order_id = %order_id, missed, "tracking subscriber lagged");
            Some(FeedUpdate::Resync { missed })
        }
    });

    Ok(Box::pin(stream))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio_stream::StreamExt;

    use super::{history, subscribe, FeedUpdate};
    use crate::engine::bidding::accept_bid;
    use crate::engine::lifecycle::cancel;
    use crate::engine::testing::{
        customer, open_order, partner, submit, test_state, test_state_with_store,
    };
    use crate::error::AppError;
    use crate::models::order::OrderStatus;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn subscriber_sees_only_its_orders_committed_events() {
        let state = test_state();
        let owner = customer();
        let watched = open_order(&state, &owner).await;
        let other = open_order(&state, &owner).await;

        let mut feed = subscribe(&state, watched.id).await.unwrap();

        cancel(&state, &owner, other.id, None).await.unwrap();
        let bid = submit(&state, &partner(), watched.id, 800).await;
        accept_bid(&state, &owner, bid.id).await.unwrap();

        match feed.next().await {
            Some(FeedUpdate::Event(event)) => {
                assert_eq!(event.order_id, watched.id);
                assert_eq!(event.status, OrderStatus::Accepted);
            }
            other => panic!("unexpected update: {other:?}"),
        }
    }

    #[tokio::test]
    async fn history_is_newest_first_and_requires_order() {
        let state = test_state();
        let owner = customer();
        let order = open_order(&state, &owner).await;
        cancel(&state, &owner, order.id, None).await.unwrap();

        let events = history(&state, order.id).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].status, OrderStatus::Cancelled);
        assert_eq!(events[1].status, OrderStatus::Pending);

        let err = history(&state, uuid::Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn lagging_subscriber_is_told_to_resync() {
        let state = test_state_with_store(Arc::new(MemoryStore::new(1)));
        let owner = customer();
        let watched = open_order(&state, &owner).await;
        let other = open_order(&state, &owner).await;

        let mut feed = subscribe(&state, watched.id).await.unwrap();

        // Three events overflow a one-slot channel before the feed is polled.
        cancel(&state, &owner, other.id, None).await.unwrap();
        open_order(&state, &owner).await;
        cancel(&state, &owner, watched.id, None).await.unwrap();

        match feed.next().await {
            Some(FeedUpdate::Resync { missed }) => assert!(missed >= 1),
            other => panic!("expected resync, got {other:?}"),
        }

        let events = history(&state, watched.id).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].status, OrderStatus::Cancelled);

        match feed.next().await {
            Some(FeedUpdate::Event(event)) => {
                assert_eq!(event.order_id, watched.id);
                assert_eq!(event.status, OrderStatus::Cancelled);
            }
            other => panic!("unexpected update: {other:?}"),
        }
    }
}
