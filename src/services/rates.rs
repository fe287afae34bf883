use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::BillingError;
use crate::models::{ChargeCategory, PriceRecord};
use crate::repository::PriceRepository;
use crate::services::prorata::{checked_product, round_money};

/// Single entry point for price resolution. Nothing else in the crate reads
/// the price table.
pub struct RateLookup<'a, P: PriceRepository + ?Sized> {
    prices: &'a P,
}

impl<'a, P: PriceRepository + ?Sized> RateLookup<'a, P> {
    pub fn new(prices: &'a P) -> Self {
        Self { prices }
    }

    /// Price effective for `category`/`reference_id` on `as_of`, if any.
    pub async fn current_price(
        &self,
        category: ChargeCategory,
        reference_id: Option<i64>,
        as_of: NaiveDate,
    ) -> Result<Option<Decimal>, BillingError> {
        let record = self
            .prices
            .latest_price(category, reference_id, as_of)
            .await?;
        Ok(record.map(|record| record.price))
    }

    /// Like `current_price`, but a missing price is a configuration error.
    pub async fn require_price(
        &self,
        category: ChargeCategory,
        reference_id: Option<i64>,
        as_of: NaiveDate,
    ) -> Result<Decimal, BillingError> {
        self.current_price(category, reference_id, as_of)
            .await?
            .ok_or_else(|| {
                let reference = reference_id
                    .map(|id| format!(" (reference {id})"))
                    .unwrap_or_default();
                BillingError::Configuration(format!(
                    "no {} price effective on {as_of}{reference}",
                    category.as_str()
                ))
            })
    }
}

/// Pick the record in effect on `as_of` from an unordered price history.
///
/// The cutoff is midnight UTC at the start of `as_of`, so a record stamped
/// later that day applies from the next day. Ties on `effective_from` go to
/// the latest-inserted record.
pub fn select_effective_price<'r>(
    records: &'r [PriceRecord],
    category: ChargeCategory,
    reference_id: Option<i64>,
    as_of: NaiveDate,
) -> Option<&'r PriceRecord> {
    let cutoff = as_of.and_time(NaiveTime::MIN).and_utc();
    records
        .iter()
        .filter(|record| record.category == category && record.reference_id == reference_id)
        .filter(|record| record.effective_from <= cutoff)
        .max_by(|a, b| {
            a.effective_from
                .cmp(&b.effective_from)
                .then_with(|| a.id.cmp(&b.id))
        })
}

/// How a service is metered for pricing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceUnit {
    PerHour,
    PerM2,
    PerMonth,
    PerJob,
    PerPackage,
    PerSlot,
    PerVehicle,
    PerUnit,
}

/// Price of `quantity` units of a service.
///
/// Per-m² services are charged on the apartment area and ignore `quantity`;
/// per-job services are a flat price.
pub fn service_charge(
    unit: ServiceUnit,
    unit_price: Decimal,
    quantity: u32,
    apartment_area: Option<Decimal>,
) -> Result<Decimal, BillingError> {
    match unit {
        ServiceUnit::PerM2 => {
            let area = apartment_area.ok_or_else(|| {
                BillingError::Validation(
                    "service is priced per m² but no apartment area was given".to_string(),
                )
            })?;
            Ok(round_money(checked_product(unit_price, area)?))
        }
        ServiceUnit::PerJob => Ok(unit_price),
        _ => Ok(round_money(checked_product(
            unit_price,
            Decimal::from(quantity),
        )?)),
    }
}
