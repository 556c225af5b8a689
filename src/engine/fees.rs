use serde::Serialize;

use crate::error::AppError;
use crate::models::order::DeliveryType;

pub const BASE_RATE: f64 = 500.0;
pub const PER_KM_RATE: f64 = 100.0;
pub const INSURANCE_RATE: f64 = 0.10;
pub const SUGGESTED_BID_RATIO: f64 = 0.8;
/// Longest distance that can be quoted. Keeps every fee far inside i64.
pub const MAX_DISTANCE_KM: f64 = 20_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeeQuote {
    pub base_fee: i64,
    pub fragile_handling_fee: i64,
    pub total_cost: i64,
}

pub fn compute_fee(distance_km: f64, delivery_type: DeliveryType) -> i64 {
    fee_with_multiplier(distance_km, delivery_type.multiplier())
}

/// Multiplier for a raw delivery type code; unknown codes price as standard.
pub fn multiplier_for(code: &str) -> f64 {
    DeliveryType::parse(code)
        .map(DeliveryType::multiplier)
        .unwrap_or(1.0)
}

pub fn compute_insurance(fee: i64, is_fragile: bool) -> i64 {
    if !is_fragile {
        return 0;
    }
    (fee as f64 * INSURANCE_RATE).round() as i64
}

pub fn quote(distance_km: f64, multiplier: f64, is_fragile: bool) -> Result<FeeQuote, AppError> {
    validate_distance(distance_km)?;
    let base_fee = fee_with_multiplier(distance_km, multiplier);
    let fragile_handling_fee = compute_insurance(base_fee, is_fragile);
    let total_cost = base_fee.checked_add(fragile_handling_fee).ok_or_else(|| {
        AppError::Validation(format!("fee for {distance_km} km is too large"))
    })?;

    Ok(FeeQuote {
        base_fee,
        fragile_handling_fee,
        total_cost,
    })
}

pub fn suggested_bid(total_cost: i64) -> i64 {
    (total_cost as f64 * SUGGESTED_BID_RATIO).round() as i64
}

pub fn validate_distance(distance_km: f64) -> Result<(), AppError> {
    if !distance_km.is_finite() || distance_km < 0.0 {
        return Err(AppError::Validation(format!(
            "distance_km must be a non-negative number, got {distance_km}"
        )));
    }
    if distance_km > MAX_DISTANCE_KM {
        return Err(AppError::Validation(format!(
            "distance_km must be at most {MAX_DISTANCE_KM}, got {distance_km}"
        )));
    }
    Ok(())
}

fn fee_with_multiplier(distance_km: f64, multiplier: f64) -> i64 {
    ((BASE_RATE + distance_km * PER_KM_RATE) * multiplier).round() as i64
}
