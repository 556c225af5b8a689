use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::commit::{revise_order, Revision};
use crate::engine::ids;
use crate::engine::orders::{ensure_customer, load_order};
use crate::error::AppError;
use crate::gateways::payment::GatewayResponse;
use crate::models::actor::ActorContext;
use crate::models::order::{DeliveryOrder, OrderStatus, PaymentStatus};
use crate::models::payment::PaymentRecord;
use crate::state::AppState;
use crate::store::ChangeSet;

const GATEWAY: &str = "payment";

#[derive(Debug, Clone, Serialize)]
pub struct PaymentCheckout {
    pub reference: String,
    pub authorization_url: Option<String>,
    pub amount: i64,
    pub currency: String,
}

/// Gateway amounts are in minor units.
pub fn to_minor_units(amount: i64) -> Result<i64, AppError> {
    amount
        .checked_mul(100)
        .ok_or_else(|| AppError::Validation(format!("amount {amount} is too large")))
}

pub async fn load_payment(state: &AppState, reference: &str) -> Result<PaymentRecord, AppError> {
    state
        .store
        .get_payment(reference)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("payment {reference} not found")))
}

/// Starts a checkout for the order's total cost. The reference is pinned on the order before
/// the gateway is called, so a retry after any failure reuses it instead of opening a second
/// transaction.
pub async fn initialize_payment(
    state: &AppState,
    actor: &ActorContext,
    order_id: Uuid,
    email: &str,
) -> Result<PaymentCheckout, AppError> {
    let email = email.trim();
    if !email.contains('@') {
        return Err(AppError::Validation("a valid email is required".to_string()));
    }

    let order = load_order(state, order_id).await?;
    ensure_customer(actor, &order)?;
    ensure_payable(&order)?;

    let pinned = match &order.payment_reference {
        Some(reference) => Some((reference.clone(), state.store.get_payment(reference).await?)),
        None => None,
    };
    let reference = match pinned {
        // Pinned but never recorded: the gateway call or the record write did not finish.
        Some((reference, None)) => reference,
        Some((reference, Some(record)))
            if record.status == PaymentStatus::Pending && record.amount == order.total_cost =>
        {
            if record.authorization_url.is_some() {
                return Ok(checkout_for(record));
            }
            reference
        }
        _ => ids::transaction_ref(),
    };

    revise_order(state, order_id, "initialize_payment", |current| {
        let reference = reference.as_str();
        async move {
            ensure_payable(&current)?;
            if current.payment_reference.as_deref() == Some(reference) {
                return Ok(Revision::Unchanged(current));
            }
            let mut next = current.next_revision();
            next.payment_reference = Some(reference.to_string());
            next.payment_status = PaymentStatus::Pending;
            Ok(Revision::commit(next, ChangeSet::new()))
        }
    })
    .await?;

    let amount_minor = to_minor_units(order.total_cost)?;
    let response = state
        .payments
        .initialize_transaction(email, amount_minor, &reference)
        .await;
    state.metrics.record_gateway(GATEWAY, response.is_ok());
    let response = accepted(response?)?;

    let now = Utc::now();
    let record = PaymentRecord {
        reference: reference.clone(),
        order_id,
        customer_id: actor.user_id,
        email: email.to_string(),
        amount: order.total_cost,
        currency: state.settings.currency.clone(),
        status: PaymentStatus::Pending,
        authorization_url: response.data_str("authorization_url").map(str::to_string),
        gateway_message: Some(response.message.clone()),
        created_at: now,
        updated_at: now,
    };
    state.store.put_payment(record.clone()).await?;

    info!(order_id = %order_id, reference = %reference, amount = record.amount, "payment initialized");
    Ok(checkout_for(record))
}

/// Asks the gateway how the transaction ended and settles the record and the order.
/// A record that is already settled skips the gateway but still brings the order in line.
pub async fn verify_payment(
    state: &AppState,
    actor: &ActorContext,
    reference: &str,
) -> Result<PaymentRecord, AppError> {
    let mut record = load_payment(state, reference).await?;
    if record.customer_id != actor.user_id && !actor.is_admin() {
        return Err(AppError::Forbidden(format!(
            "payment {reference} belongs to another customer"
        )));
    }

    if record.status == PaymentStatus::Pending {
        let response = state.payments.verify_transaction(reference).await;
        state.metrics.record_gateway(GATEWAY, response.is_ok());
        let response = accepted(response?)?;

        let expected_minor = to_minor_units(record.amount)?;
        let outcome = settle_outcome(&response, expected_minor);
        if outcome == PaymentStatus::Pending {
            return Ok(record);
        }
        if outcome == PaymentStatus::Failed {
            warn!(
                reference,
                gateway_status = response.data_str("status").unwrap_or("unknown"),
                amount = ?response.data_i64("amount"),
                "payment not settled"
            );
        }

        record.status = outcome;
        record.gateway_message = Some(response.message.clone());
        record.updated_at = Utc::now();
        state.store.put_payment(record.clone()).await?;
        info!(reference, order_id = %record.order_id, status = ?outcome, "payment verified");
    }

    settle_order(state, &record).await?;
    Ok(record)
}

/// Copies a settled payment status onto the order that still points at the record.
async fn settle_order(state: &AppState, record: &PaymentRecord) -> Result<DeliveryOrder, AppError> {
    let reference = record.reference.as_str();
    let status = record.status;

    revise_order(state, record.order_id, "settle_payment", |order| async move {
        if order.payment_reference.as_deref() != Some(reference) || order.payment_status == status {
            return Ok(Revision::Unchanged(order));
        }
        let mut next = order.next_revision();
        next.payment_status = status;
        Ok(Revision::commit(next, ChangeSet::new()))
    })
    .await
}

fn ensure_payable(order: &DeliveryOrder) -> Result<(), AppError> {
    if order.status == OrderStatus::Cancelled {
        return Err(AppError::PreconditionFailed(format!(
            "order {} is cancelled",
            order.order_number
        )));
    }
    if order.payment_status == PaymentStatus::Completed {
        return Err(AppError::PreconditionFailed(format!(
            "order {} is already paid",
            order.order_number
        )));
    }
    Ok(())
}

fn checkout_for(record: PaymentRecord) -> PaymentCheckout {
    PaymentCheckout {
        reference: record.reference,
        authorization_url: record.authorization_url,
        amount: record.amount,
        currency: record.currency,
    }
}

fn accepted(response: GatewayResponse) -> Result<GatewayResponse, AppError> {
    if !response.status {
        return Err(AppError::RemoteCallFailed(format!(
            "payment gateway declined: {}",
            response.message
        )));
    }
    Ok(response)
}

fn settle_outcome(response: &GatewayResponse, expected_minor: i64) -> PaymentStatus {
    match response.data_str("status") {
        Some("success") if response.data_i64("amount") == Some(expected_minor) => {
            PaymentStatus::Completed
        }
        Some("success") | Some("failed") | Some("abandoned") | Some("reversed") => {
            PaymentStatus::Failed
        }
        _ => PaymentStatus::Pending,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use super::{initialize_payment, to_minor_units, verify_payment};
    use crate::engine::testing::{
        customer, flaky, open_order, test_state_from, test_state_with_gateways, FakeBills,
        FakePayments,
    };
    use crate::error::AppError;
    use crate::models::order::PaymentStatus;

    #[test]
    fn minor_units_overflow_is_a_validation_error() {
        assert_eq!(to_minor_units(1100).unwrap(), 110_000);
        assert!(matches!(to_minor_units(i64::MAX), Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn successful_checkout_marks_order_paid() {
        let payments = Arc::new(FakePayments::default());
        let state = test_state_with_gateways(payments.clone(), Arc::new(FakeBills::default()));
        let owner = customer();
        let order = open_order(&state, &owner).await;

        let checkout = initialize_payment(&state, &owner, order.id, "ada@example.com")
            .await
            .unwrap();
        assert!(checkout.reference.starts_with("TXN-"));
        assert_eq!(checkout.amount, order.total_cost);
        assert!(checkout.authorization_url.is_some());

        let again = initialize_payment(&state, &owner, order.id, "ada@example.com")
            .await
            .unwrap();
        assert_eq!(again.reference, checkout.reference);

        let record = verify_payment(&state, &owner, &checkout.reference)
            .await
            .unwrap();
        assert_eq!(record.status, PaymentStatus::Completed);

        let stored = state.store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Completed);
        assert_eq!(stored.payment_reference.as_deref(), Some(checkout.reference.as_str()));

        let err = initialize_payment(&state, &owner, order.id, "ada@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PreconditionFailed(_)));
    }

    #[tokio::test]
    async fn declined_transaction_fails_the_payment() {
        let payments = Arc::new(FakePayments::default());
        let state = test_state_with_gateways(payments.clone(), Arc::new(FakeBills::default()));
        let owner = customer();
        let order = open_order(&state, &owner).await;

        let checkout = initialize_payment(&state, &owner, order.id, "ada@example.com")
            .await
            .unwrap();
        payments.declined.store(true, Ordering::SeqCst);

        let record = verify_payment(&state, &owner, &checkout.reference)
            .await
            .unwrap();
        assert_eq!(record.status, PaymentStatus::Failed);
        let stored = state.store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Failed);
    }

    #[tokio::test]
    async fn retry_after_gateway_outage_reuses_the_reference() {
        let payments = Arc::new(FakePayments::default());
        payments.unreachable.store(true, Ordering::SeqCst);
        let state = test_state_with_gateways(payments.clone(), Arc::new(FakeBills::default()));
        let owner = customer();
        let order = open_order(&state, &owner).await;

        let err = initialize_payment(&state, &owner, order.id, "ada@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::RemoteCallFailed(_)));
        let pinned = state.store.get_order(order.id).await.unwrap().unwrap();
        let reference = pinned.payment_reference.clone().unwrap();
        assert!(state.store.get_payment(&reference).await.unwrap().is_none());

        payments.unreachable.store(false, Ordering::SeqCst);
        let checkout = initialize_payment(&state, &owner, order.id, "ada@example.com")
            .await
            .unwrap();
        assert_eq!(checkout.reference, reference);
        assert_eq!(payments.initialized(), 1);
    }

    #[tokio::test]
    async fn store_outage_before_checkout_opens_no_transaction() {
        let store = flaky(0);
        let payments = Arc::new(FakePayments::default());
        let state = test_state_from(store.clone(), payments.clone(), Arc::new(FakeBills::default()));
        let owner = customer();
        let order = open_order(&state, &owner).await;

        store.failures.store(10, Ordering::SeqCst);
        let err = initialize_payment(&state, &owner, order.id, "ada@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::RemoteCallFailed(_)));
        assert_eq!(payments.initialized(), 0);

        store.failures.store(0, Ordering::SeqCst);
        let checkout = initialize_payment(&state, &owner, order.id, "ada@example.com")
            .await
            .unwrap();
        let again = initialize_payment(&state, &owner, order.id, "ada@example.com")
            .await
            .unwrap();
        assert_eq!(again.reference, checkout.reference);
        assert_eq!(payments.initialized(), 1);
    }

    #[tokio::test]
    async fn settled_payment_still_reaches_the_order_after_a_failed_write() {
        let store = flaky(0);
        let payments = Arc::new(FakePayments::default());
        let state = test_state_from(store.clone(), payments, Arc::new(FakeBills::default()));
        let owner = customer();
        let order = open_order(&state, &owner).await;
        let checkout = initialize_payment(&state, &owner, order.id, "ada@example.com")
            .await
            .unwrap();

        store.failures.store(10, Ordering::SeqCst);
        let err = verify_payment(&state, &owner, &checkout.reference)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::RemoteCallFailed(_)));
        let record = state.store.get_payment(&checkout.reference).await.unwrap().unwrap();
        assert_eq!(record.status, PaymentStatus::Completed);
        let stale = state.store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stale.payment_status, PaymentStatus::Pending);

        store.failures.store(0, Ordering::SeqCst);
        let record = verify_payment(&state, &owner, &checkout.reference)
            .await
            .unwrap();
        assert_eq!(record.status, PaymentStatus::Completed);
        let settled = state.store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(settled.payment_status, PaymentStatus::Completed);
    }

    #[tokio::test]
    async fn bad_email_and_strangers_are_refused() {
        let payments = Arc::new(FakePayments::default());
        let state = test_state_with_gateways(payments, Arc::new(FakeBills::default()));
        let owner = customer();
        let order = open_order(&state, &owner).await;

        let err = initialize_payment(&state, &owner, order.id, "not-an-email")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = initialize_payment(&state, &customer(), order.id, "x@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }
}
