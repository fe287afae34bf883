use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::error::BillingError;
use crate::models::BillType;
use crate::repository::BillingStore;
use crate::services::bill_assembler::{generate_bills_for_apartment, AssemblyOptions};
use crate::services::prorata::billing_date_for;

/// Summary of one monthly billing run.
#[derive(Debug, Clone, Serialize)]
pub struct BillingRunStats {
    pub run_id: Uuid,
    pub billing_date: NaiveDate,
    pub apartments_considered: u32,
    pub management_bills_created: u32,
    pub parking_bills_created: u32,
    pub bills_already_existing: u32,
    pub total_amount: Decimal,
    pub errors: Vec<String>,
}

impl BillingRunStats {
    fn new(billing_date: NaiveDate) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            billing_date,
            apartments_considered: 0,
            management_bills_created: 0,
            parking_bills_created: 0,
            bills_already_existing: 0,
            total_amount: Decimal::ZERO,
            errors: Vec::new(),
        }
    }
}

/// Bill every occupied apartment for the month ending on `billing_date`.
///
/// Per-apartment failures are collected into `errors` and the run moves on.
/// All bills are written in a single transaction at the end; if that commit
/// fails nothing is stored and `CommitFailed` carries the collected errors.
pub async fn generate_monthly_bills_for_all<S: BillingStore + ?Sized>(
    store: &S,
    billing_date: NaiveDate,
    options: &AssemblyOptions,
) -> Result<BillingRunStats, BillingError> {
    let mut stats = BillingRunStats::new(billing_date);
    tracing::info!(
        run_id = %stats.run_id,
        billing_date = %billing_date,
        include_parking = options.include_parking,
        "Billing run started"
    );

    let apartments = store.list_occupied_apartments().await?;
    let mut pending = Vec::new();

    for apartment in &apartments {
        stats.apartments_considered += 1;

        let assembled =
            match generate_bills_for_apartment(store, apartment, billing_date, options).await {
                Ok(assembled) => assembled,
                Err(error) => {
                    tracing::warn!(
                        run_id = %stats.run_id,
                        apartment = %apartment.apartment_number,
                        error = %error,
                        "Billing run: apartment skipped"
                    );
                    stats
                        .errors
                        .push(format!("Apartment {}: {error}", apartment.apartment_number));
                    continue;
                }
            };

        for failure in &assembled.charge_failures {
            tracing::warn!(
                run_id = %stats.run_id,
                apartment = %apartment.apartment_number,
                error = %failure,
                "Billing run: charge skipped"
            );
            stats
                .errors
                .push(format!("Apartment {}: {failure}", apartment.apartment_number));
        }

        stats.management_bills_created += assembled.count_of(BillType::ManagementFee);
        stats.parking_bills_created += assembled.count_of(BillType::Parking);
        stats.bills_already_existing += assembled.already_billed.len() as u32;
        stats.total_amount += assembled.total_amount();
        pending.extend(assembled.bills);
    }

    if let Err(error) = store.insert_bills(&pending).await {
        tracing::error!(
            run_id = %stats.run_id,
            bills = pending.len(),
            error = %error,
            "Billing run: commit failed, rolled back"
        );
        return Err(BillingError::CommitFailed {
            message: error.to_string(),
            apartment_errors: stats.errors,
        });
    }

    tracing::info!(
        run_id = %stats.run_id,
        apartments = stats.apartments_considered,
        management_bills = stats.management_bills_created,
        parking_bills = stats.parking_bills_created,
        already_existing = stats.bills_already_existing,
        total_amount = %stats.total_amount,
        errors = stats.errors.len(),
        "Billing run completed"
    );

    Ok(stats)
}

/// Bill the calendar month `year`/`month`, dated on its last day.
pub async fn run_monthly_billing<S: BillingStore + ?Sized>(
    store: &S,
    year: i32,
    month: u32,
    options: &AssemblyOptions,
) -> Result<BillingRunStats, BillingError> {
    let billing_date = billing_date_for(year, month)?;
    generate_monthly_bills_for_all(store, billing_date, options).await
}

/// Month billed by default when a run is triggered on `today`.
pub fn next_billing_month(today: NaiveDate) -> (i32, u32) {
    if today.month() == 12 {
        (today.year() + 1, 1)
    } else {
        (today.year(), today.month() + 1)
    }
}
