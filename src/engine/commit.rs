use std::future::Future;
use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{error, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::engine::orders::load_order;
use crate::error::AppError;
use crate::models::order::DeliveryOrder;
use crate::state::AppState;
use crate::store::ChangeSet;

/// Re-reads of an order after losing an optimistic race.
const OPTIMISTIC_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            attempts: config.commit_retry_attempts.max(1),
            backoff: Duration::from_millis(config.commit_retry_backoff_ms),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(100),
        }
    }
}

/// Outcome of planning a change against the current order.
pub enum Revision {
    /// Commit `order` (already bumped with `next_revision`) together with `changes`.
    Commit {
        order: DeliveryOrder,
        changes: ChangeSet,
    },
    /// The order already reflects the request; nothing to write.
    Unchanged(DeliveryOrder),
}

impl Revision {
    pub fn commit(order: DeliveryOrder, changes: ChangeSet) -> Self {
        Revision::Commit { order, changes }
    }
}

/// Commits a change set, retrying transient store failures with linear backoff.
pub async fn commit_with_retry(
    state: &AppState,
    changes: ChangeSet,
    operation: &'static str,
) -> Result<(), AppError> {
    let policy = state.settings.retry;
    let mut attempt = 1;

    loop {
        match state.store.commit(changes.clone()).await {
            Ok(()) => return Ok(()),
            Err(err) if err.is_transient() && attempt < policy.attempts => {
                warn!(operation, attempt, error = %err, "commit failed; retrying");
                state.metrics.commit_retries_total.inc();
                sleep(policy.backoff * attempt).await;
                attempt += 1;
            }
            Err(err) => {
                if err.is_transient() {
                    error!(operation, attempts = attempt, error = %err, "commit retries exhausted");
                }
                return Err(err);
            }
        }
    }
}

/// Loads the order, lets `plan` decide the change, and commits it guarded by the version
/// that was read. A lost race re-reads the order and plans again.
pub async fn revise_order<P, Fut>(
    state: &AppState,
    order_id: Uuid,
    operation: &'static str,
    mut plan: P,
) -> Result<DeliveryOrder, AppError>
where
    P: FnMut(DeliveryOrder) -> Fut,
    Fut: Future<Output = Result<Revision, AppError>>,
{
    let start = Instant::now();
    let result = revise_order_inner(state, order_id, operation, &mut plan).await;

    state
        .metrics
        .operation_latency_seconds
        .with_label_values(&[operation])
        .observe(start.elapsed().as_secs_f64());

    result
}

async fn revise_order_inner<P, Fut>(
    state: &AppState,
    order_id: Uuid,
    operation: &'static str,
    plan: &mut P,
) -> Result<DeliveryOrder, AppError>
where
    P: FnMut(DeliveryOrder) -> Fut,
    Fut: Future<Output = Result<Revision, AppError>>,
{
    let mut attempt = 1;

    loop {
        let current = load_order(state, order_id).await?;
        let expected_version = current.version;

        let (order, changes) = match plan(current).await? {
            Revision::Unchanged(order) => return Ok(order),
            Revision::Commit { order, changes } => (order, changes),
        };

        let changes = changes.update_order(order.clone(), expected_version);
        match commit_with_retry(state, changes, operation).await {
            Ok(()) => return Ok(order),
            Err(AppError::ConcurrencyConflict(msg)) if attempt < OPTIMISTIC_ATTEMPTS => {
                warn!(operation, order_id = %order_id, attempt, conflict = %msg, "order changed underneath; re-planning");
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
