use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::AppError;
use crate::models::ChargeCategory;
use crate::services::metering::Tier;
use crate::services::rates::ServiceUnit;

pub fn validate_input<T: Validate>(input: &T) -> Result<(), AppError> {
    input
        .validate()
        .map_err(|errors| AppError::UnprocessableEntity(format!("Validation failed: {errors}")))
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct RunBillingInput {
    #[validate(range(min = 2000, max = 2100))]
    pub year: Option<i32>,
    #[validate(range(min = 1, max = 12))]
    pub month: Option<u32>,
    pub include_parking: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ApartmentBillsInput {
    #[validate(range(min = 2000, max = 2100))]
    pub year: i32,
    #[validate(range(min = 1, max = 12))]
    pub month: u32,
    pub include_parking: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApartmentPath {
    pub apartment_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CurrentRateQuery {
    pub category: ChargeCategory,
    pub reference_id: Option<i64>,
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TierInput {
    /// Absent on the open-ended last tier.
    pub upper_threshold: Option<Decimal>,
    pub unit_price: Decimal,
}

impl From<&TierInput> for Tier {
    fn from(input: &TierInput) -> Self {
        match input.upper_threshold {
            Some(threshold) => Tier::bounded(threshold, input.unit_price),
            None => Tier::unbounded(input.unit_price),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UtilityQuoteInput {
    pub category: ChargeCategory,
    pub reference_id: Option<i64>,
    pub as_of: Option<NaiveDate>,
    pub start_reading: Decimal,
    pub end_reading: Decimal,
    /// When given, consumption is priced on these tiers instead of the flat
    /// rate from the price history.
    #[validate(length(min = 1, max = 10))]
    pub tiers: Option<Vec<TierInput>>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ServiceQuoteInput {
    pub service_id: i64,
    pub unit: ServiceUnit,
    #[validate(range(min = 1, max = 1000))]
    pub quantity: u32,
    pub apartment_id: Option<i64>,
    pub as_of: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::{validate_input, ApartmentBillsInput, RunBillingInput, UtilityQuoteInput};
    use crate::error::AppError;
    use crate::models::ChargeCategory;

    #[test]
    fn rejects_out_of_range_month() {
        let input = ApartmentBillsInput {
            year: 2024,
            month: 13,
            include_parking: None,
        };
        assert!(matches!(
            validate_input(&input),
            Err(AppError::UnprocessableEntity(_))
        ));
    }

    #[test]
    fn empty_run_input_is_valid() {
        assert!(validate_input(&RunBillingInput::default()).is_ok());
    }

    #[test]
    fn parses_utility_quote_with_string_decimals() {
        let input: UtilityQuoteInput = serde_json::from_str(
            r#"{
                "category": "electricity",
                "start_reading": "1250.00",
                "end_reading": "1300.00",
                "tiers": [
                    {"upper_threshold": "50", "unit_price": "1806"},
                    {"unit_price": "1866"}
                ]
            }"#,
        )
        .expect("valid payload");
        assert_eq!(input.category, ChargeCategory::Electricity);
        assert_eq!(input.tiers.as_ref().map(Vec::len), Some(2));
        assert!(validate_input(&input).is_ok());
    }

    #[test]
    fn utility_quote_needs_at_least_one_tier() {
        let input: UtilityQuoteInput = serde_json::from_str(
            r#"{
                "category": "water",
                "start_reading": "10",
                "end_reading": "25",
                "tiers": []
            }"#,
        )
        .expect("valid payload");
        assert!(matches!(
            validate_input(&input),
            Err(AppError::UnprocessableEntity(_))
        ));
    }
}
