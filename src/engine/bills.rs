use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::ids;
use crate::error::AppError;
use crate::gateways::bills::BillsResponse;
use crate::models::actor::ActorContext;
use crate::models::order::PaymentStatus;
use crate::models::payment::{BillKind, BillPayment};
use crate::state::AppState;

const GATEWAY: &str = "bills";

/// Mobile network of an airtime or data purchase. Names are matched case-insensitively.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(try_from = "String")]
pub enum Network {
    Mtn,
    Airtel,
    Glo,
    NineMobile,
}

impl TryFrom<String> for Network {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Network::parse(&raw).ok_or_else(|| format!("unknown network {raw}"))
    }
}

impl Network {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "mtn" => Some(Network::Mtn),
            "airtel" => Some(Network::Airtel),
            "glo" => Some(Network::Glo),
            "9mobile" | "etisalat" => Some(Network::NineMobile),
            _ => None,
        }
    }

    pub fn service_id(self) -> &'static str {
        match self {
            Network::Mtn => "mtn",
            Network::Airtel => "airtel",
            Network::Glo => "glo",
            Network::NineMobile => "etisalat",
        }
    }

    pub fn data_service_id(self) -> String {
        format!("{}-data", self.service_id())
    }
}

fn validate_phone(phone: &str) -> Result<String, AppError> {
    let phone = phone.trim();
    let digits = phone.strip_prefix('+').unwrap_or(phone);
    if !(10..=15).contains(&digits.len()) || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::Validation(format!(
            "phone number {phone} must have 10 to 15 digits"
        )));
    }
    Ok(phone.to_string())
}

fn validate_amount(amount: i64) -> Result<(), AppError> {
    if amount <= 0 {
        return Err(AppError::Validation("amount must be greater than 0".to_string()));
    }
    Ok(())
}

fn required<'a>(field: &str, value: &'a str) -> Result<&'a str, AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::Validation(format!("{field} is required")));
    }
    Ok(value)
}

pub async fn buy_airtime(
    state: &AppState,
    actor: &ActorContext,
    network: Network,
    phone: &str,
    amount: i64,
) -> Result<BillPayment, AppError> {
    let phone = validate_phone(phone)?;
    validate_amount(amount)?;

    let request_id = ids::transaction_ref();
    let service_id = network.service_id();
    let response = state
        .bills
        .purchase_airtime(service_id, &phone, amount, &request_id)
        .await;

    settle(
        state,
        actor,
        Purchase {
            request_id,
            kind: BillKind::Airtime,
            service_id: service_id.to_string(),
            account: phone,
            amount: Some(amount),
        },
        response,
    )
    .await
}

pub async fn buy_data(
    state: &AppState,
    actor: &ActorContext,
    network: Network,
    phone: &str,
    variation_code: &str,
) -> Result<BillPayment, AppError> {
    let phone = validate_phone(phone)?;
    let variation_code = required("variation_code", variation_code)?;

    let request_id = ids::transaction_ref();
    let service_id = network.data_service_id();
    let response = state
        .bills
        .purchase_data(&service_id, &phone, variation_code, &request_id)
        .await;

    settle(
        state,
        actor,
        Purchase {
            request_id,
            kind: BillKind::Data,
            service_id,
            account: phone,
            amount: None,
        },
        response,
    )
    .await
}

pub async fn pay_electricity(
    state: &AppState,
    actor: &ActorContext,
    meter_number: &str,
    service_id: &str,
    amount: i64,
    phone: &str,
) -> Result<BillPayment, AppError> {
    let meter_number = required("meter_number", meter_number)?;
    let service_id = required("service_id", service_id)?;
    let phone = validate_phone(phone)?;
    validate_amount(amount)?;

    let request_id = ids::transaction_ref();
    let response = state
        .bills
        .pay_electricity(meter_number, service_id, amount, &phone, &request_id)
        .await;

    settle(
        state,
        actor,
        Purchase {
            request_id,
            kind: BillKind::Electricity,
            service_id: service_id.to_string(),
            account: meter_number.to_string(),
            amount: Some(amount),
        },
        response,
    )
    .await
}

/// Looks up the account holder behind a smart card. Nothing is charged or stored.
pub async fn verify_smart_card(
    state: &AppState,
    card_number: &str,
    service_id: &str,
) -> Result<Value, AppError> {
    let card_number = required("card_number", card_number)?;
    let service_id = required("service_id", service_id)?;

    let response = state.bills.verify_smart_card(card_number, service_id).await;
    state
        .metrics
        .record_gateway(GATEWAY, response.as_ref().is_ok_and(BillsResponse::is_success));
    response?.into_result()
}

/// Bill payments of the actor, newest first.
pub async fn history(state: &AppState, actor: &ActorContext) -> Result<Vec<BillPayment>, AppError> {
    state.store.list_bill_payments(actor.user_id).await
}

struct Purchase {
    request_id: String,
    kind: BillKind,
    service_id: String,
    account: String,
    amount: Option<i64>,
}

/// Persists the outcome of a purchase and maps a non-success code to `RemoteCallFailed`.
/// A call that never reached the aggregator leaves no record.
async fn settle(
    state: &AppState,
    actor: &ActorContext,
    purchase: Purchase,
    response: Result<BillsResponse, AppError>,
) -> Result<BillPayment, AppError> {
    let response = match response {
        Ok(response) => response,
        Err(err) => {
            state.metrics.record_gateway(GATEWAY, false);
            return Err(err);
        }
    };
    let success = response.is_success();
    state.metrics.record_gateway(GATEWAY, success);

    let record = BillPayment {
        request_id: purchase.request_id,
        user_id: actor.user_id,
        kind: purchase.kind,
        service_id: purchase.service_id,
        account: purchase.account,
        amount: purchase.amount,
        status: if success {
            PaymentStatus::Completed
        } else {
            PaymentStatus::Failed
        },
        response_code: response.code.clone(),
        content: response.content.clone(),
        created_at: Utc::now(),
    };
    state.store.put_bill_payment(record.clone()).await?;

    if !success {
        warn!(
            request_id = %record.request_id,
            service_id = %record.service_id,
            code = %record.response_code,
            "bill payment failed"
        );
        response.into_result()?;
    }

    info!(
        request_id = %record.request_id,
        kind = ?record.kind,
        service_id = %record.service_id,
        "bill payment completed"
    );
    Ok(record)
}
