use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult, BillingError},
    models::ChargeCategory,
    repository::ApartmentRepository,
    schemas::{
        validate_input, ApartmentBillsInput, ApartmentPath, CurrentRateQuery, RunBillingInput,
        ServiceQuoteInput, UtilityQuoteInput,
    },
    services::{
        bill_assembler::{generate_and_commit_for_apartment, ApartmentBillingResult},
        billing_batch::{next_billing_month, run_monthly_billing, BillingRunStats},
        metering::{metered_amount, tiered_amount, Tier},
        prorata::billing_date_for,
        rates::{service_charge, RateLookup},
    },
    state::AppState,
};

const INTERNAL_API_KEY_HEADER: &str = "x-internal-api-key";

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/billing/runs", axum::routing::post(run_billing))
        .route(
            "/billing/apartments/{apartment_id}/bills",
            axum::routing::post(generate_apartment_bills),
        )
        .route("/billing/rates/current", axum::routing::get(current_rate))
        .route("/billing/quotes/utility", axum::routing::post(quote_utility))
        .route("/billing/quotes/service", axum::routing::post(quote_service))
}

async fn run_billing(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RunBillingInput>,
) -> AppResult<Json<BillingRunStats>> {
    require_internal_key(&state, &headers)?;
    validate_input(&payload)?;

    let (year, month) = match (payload.year, payload.month) {
        (Some(year), Some(month)) => (year, month),
        (None, None) => next_billing_month(billing_today(&state)),
        _ => {
            return Err(AppError::UnprocessableEntity(
                "year and month must be given together.".to_string(),
            ))
        }
    };

    let store = state.store()?;
    let options = state.config.assembly_options(payload.include_parking);
    let stats = run_monthly_billing(&store, year, month, &options).await?;
    Ok(Json(stats))
}

async fn generate_apartment_bills(
    State(state): State<AppState>,
    Path(path): Path<ApartmentPath>,
    headers: HeaderMap,
    Json(payload): Json<ApartmentBillsInput>,
) -> AppResult<Json<ApartmentBillingResult>> {
    require_internal_key(&state, &headers)?;
    validate_input(&payload)?;

    let store = state.store()?;
    let billing_date = billing_date_for(payload.year, payload.month)?;
    let options = state.config.assembly_options(payload.include_parking);
    let result =
        generate_and_commit_for_apartment(&store, path.apartment_id, billing_date, &options)
            .await?;
    Ok(Json(result))
}

async fn current_rate(
    State(state): State<AppState>,
    Query(query): Query<CurrentRateQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_internal_key(&state, &headers)?;

    let store = state.store()?;
    let as_of = query.as_of.unwrap_or_else(|| billing_today(&state));
    let price = RateLookup::new(&store)
        .current_price(query.category, query.reference_id, as_of)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "No {} price effective on {as_of}.",
                query.category.as_str()
            ))
        })?;

    Ok(Json(json!({
        "category": query.category,
        "reference_id": query.reference_id,
        "as_of": as_of,
        "price": price,
    })))
}

async fn quote_utility(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<UtilityQuoteInput>,
) -> AppResult<Json<Value>> {
    require_internal_key(&state, &headers)?;
    validate_input(&payload)?;

    if !matches!(
        payload.category,
        ChargeCategory::Electricity | ChargeCategory::Water
    ) {
        return Err(AppError::UnprocessableEntity(
            "category must be electricity or water.".to_string(),
        ));
    }

    let consumption = utility_consumption(payload.start_reading, payload.end_reading)?;
    let (amount, unit_price) = match payload.tiers.as_deref() {
        Some(tiers) => {
            let tiers: Vec<Tier> = tiers.iter().map(Tier::from).collect();
            (tiered_amount(consumption, &tiers)?, None)
        }
        None => {
            let store = state.store()?;
            let as_of = payload.as_of.unwrap_or_else(|| billing_today(&state));
            let price = RateLookup::new(&store)
                .require_price(payload.category, payload.reference_id, as_of)
                .await?;
            (
                metered_amount(payload.start_reading, payload.end_reading, price)?,
                Some(price),
            )
        }
    };

    Ok(Json(json!({
        "category": payload.category,
        "consumption": consumption,
        "unit_price": unit_price,
        "amount": amount,
    })))
}

async fn quote_service(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ServiceQuoteInput>,
) -> AppResult<Json<Value>> {
    require_internal_key(&state, &headers)?;
    validate_input(&payload)?;

    let store = state.store()?;
    let as_of = payload.as_of.unwrap_or_else(|| billing_today(&state));
    let unit_price = RateLookup::new(&store)
        .require_price(ChargeCategory::Service, Some(payload.service_id), as_of)
        .await?;

    let apartment_area = match payload.apartment_id {
        Some(apartment_id) => {
            let apartment = store.get_apartment(apartment_id).await?.ok_or_else(|| {
                AppError::NotFound(format!("Apartment {apartment_id} not found."))
            })?;
            Some(apartment.area)
        }
        None => None,
    };

    let amount = service_charge(payload.unit, unit_price, payload.quantity, apartment_area)?;
    Ok(Json(json!({
        "service_id": payload.service_id,
        "unit": payload.unit,
        "unit_price": unit_price,
        "quantity": payload.quantity,
        "amount": amount,
    })))
}

fn utility_consumption(start_reading: Decimal, end_reading: Decimal) -> AppResult<Decimal> {
    let consumption = end_reading.checked_sub(start_reading).ok_or_else(|| {
        BillingError::Validation(format!(
            "meter readings out of range: {start_reading} to {end_reading}"
        ))
    })?;
    if consumption < Decimal::ZERO {
        return Err(BillingError::Validation(format!(
            "meter end reading ({end_reading}) cannot be lower than start reading ({start_reading})"
        ))
        .into());
    }
    Ok(consumption)
}

fn require_internal_key(state: &AppState, headers: &HeaderMap) -> AppResult<()> {
    let provided = headers
        .get(INTERNAL_API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    validate_internal_api_key(
        state.config.is_production(),
        state.config.internal_api_key.as_deref(),
        provided,
    )
}

fn validate_internal_api_key(
    is_production: bool,
    expected_key: Option<&str>,
    provided_key: &str,
) -> AppResult<()> {
    let expected = expected_key.map(str::trim).unwrap_or_default();

    if is_production && expected.is_empty() {
        return Err(AppError::Dependency(
            "INTERNAL_API_KEY must be set in production to use billing routes.".to_string(),
        ));
    }

    if !expected.is_empty() && provided_key != expected {
        return Err(AppError::Unauthorized(
            "Invalid or missing API key.".to_string(),
        ));
    }

    Ok(())
}

/// Current date in the billing timezone.
fn billing_today(state: &AppState) -> NaiveDate {
    Utc::now()
        .with_timezone(&state.config.billing_timezone)
        .date_naive()
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use super::{utility_consumption, validate_internal_api_key};
    use crate::error::AppError;

    #[test]
    fn consumption_rejects_rollback_and_out_of_range_readings() {
        assert_eq!(
            utility_consumption(dec!(1250.00), dec!(1300.00)).expect("valid readings"),
            dec!(50.00)
        );
        assert!(matches!(
            utility_consumption(dec!(1300), dec!(1200)),
            Err(AppError::UnprocessableEntity(_))
        ));
        assert!(matches!(
            utility_consumption(Decimal::MIN, Decimal::MAX),
            Err(AppError::UnprocessableEntity(_))
        ));
    }

    #[test]
    fn open_outside_production_without_key() {
        assert!(validate_internal_api_key(false, None, "").is_ok());
    }

    #[test]
    fn production_requires_configured_key() {
        assert!(matches!(
            validate_internal_api_key(true, Some("  "), "anything"),
            Err(AppError::Dependency(_))
        ));
    }

    #[test]
    fn rejects_wrong_key() {
        assert!(matches!(
            validate_internal_api_key(false, Some("secret"), "guess"),
            Err(AppError::Unauthorized(_))
        ));
        assert!(validate_internal_api_key(true, Some("secret"), "secret").is_ok());
    }
}
