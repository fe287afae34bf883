use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::BillingError;
use crate::services::prorata::{checked_product, round_money};

/// One pricing bracket. `upper_threshold` is the cumulative consumption at
/// which the bracket ends; `None` marks an open-ended bracket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    pub upper_threshold: Option<Decimal>,
    pub unit_price: Decimal,
}

impl Tier {
    pub fn bounded(upper_threshold: Decimal, unit_price: Decimal) -> Self {
        Self {
            upper_threshold: Some(upper_threshold),
            unit_price,
        }
    }

    pub fn unbounded(unit_price: Decimal) -> Self {
        Self {
            upper_threshold: None,
            unit_price,
        }
    }
}

/// Charge for measured usage between two meter readings.
///
/// Consumption-based charges bill the measured usage regardless of how long
/// the apartment was occupied.
pub fn metered_amount(
    meter_start: Decimal,
    meter_end: Decimal,
    unit_price: Decimal,
) -> Result<Decimal, BillingError> {
    if meter_end < meter_start {
        return Err(BillingError::Validation(format!(
            "meter end reading ({meter_end}) cannot be lower than start reading ({meter_start})"
        )));
    }
    let consumption = meter_end.checked_sub(meter_start).ok_or_else(|| {
        BillingError::Validation(format!(
            "meter readings out of range: {meter_start} to {meter_end}"
        ))
    })?;
    Ok(round_money(checked_product(consumption, unit_price)?))
}

/// Charge `consumption` against ordered brackets.
///
/// Thresholds must be strictly increasing. The last tier is open-ended, so
/// usage beyond its threshold (if any) is billed at its price.
pub fn tiered_amount(consumption: Decimal, tiers: &[Tier]) -> Result<Decimal, BillingError> {
    if consumption < Decimal::ZERO {
        return Err(BillingError::Validation(format!(
            "consumption cannot be negative, got {consumption}"
        )));
    }
    validate_tiers(tiers)?;
    if consumption.is_zero() {
        return Ok(Decimal::ZERO);
    }
    if tiers.is_empty() {
        return Err(BillingError::Validation(
            "tier list is empty; cannot price consumption".to_string(),
        ));
    }

    let mut total = Decimal::ZERO;
    let mut remaining = consumption;
    let mut previous_threshold = Decimal::ZERO;
    let last_index = tiers.len() - 1;

    for (index, tier) in tiers.iter().enumerate() {
        let units = match tier.upper_threshold {
            Some(threshold) if index < last_index => remaining.min(threshold - previous_threshold),
            _ => remaining,
        };
        total = total
            .checked_add(checked_product(units, tier.unit_price)?)
            .ok_or_else(|| {
                BillingError::Validation(format!("tiered amount out of range for {consumption}"))
            })?;
        remaining -= units;
        if let Some(threshold) = tier.upper_threshold {
            previous_threshold = threshold;
        }
        if remaining <= Decimal::ZERO {
            break;
        }
    }

    Ok(round_money(total))
}

fn validate_tiers(tiers: &[Tier]) -> Result<(), BillingError> {
    let mut previous = Decimal::ZERO;
    for (index, tier) in tiers.iter().enumerate() {
        match tier.upper_threshold {
            Some(threshold) => {
                if threshold <= previous {
                    return Err(BillingError::Validation(format!(
                        "tier thresholds must be strictly increasing (tier {} has {threshold})",
                        index + 1
                    )));
                }
                previous = threshold;
            }
            None if index + 1 != tiers.len() => {
                return Err(BillingError::Validation(format!(
                    "only the last tier may be unbounded (tier {} is unbounded)",
                    index + 1
                )));
            }
            None => {}
        }
    }
    Ok(())
}
