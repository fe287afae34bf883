use std::collections::HashSet;

use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::BillingError;
use crate::models::{
    Apartment, ApartmentStatus, Bill, BillStatus, BillType, ChargeCategory, NewBill, Vehicle,
};
use crate::repository::BillingStore;
use crate::services::prorata::{
    billing_period_label, days_in_month, is_prorated, occupied_days, prorated_amount,
    round_money,
};
use crate::services::rates::RateLookup;

pub const DEFAULT_DUE_DAYS: u32 = 15;

#[derive(Debug, Clone, Copy)]
pub struct AssemblyOptions {
    pub include_parking: bool,
    /// Days after the billing date until a bill is due.
    pub due_days: u32,
}

impl Default for AssemblyOptions {
    fn default() -> Self {
        Self {
            include_parking: true,
            due_days: DEFAULT_DUE_DAYS,
        }
    }
}

/// Bills built for one apartment and month, not yet committed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AssembledBills {
    pub bills: Vec<NewBill>,
    /// Bill numbers skipped because they are already stored.
    pub already_billed: Vec<String>,
    /// Charges that could not be built, e.g. a vehicle without a parking rate.
    pub charge_failures: Vec<String>,
}

impl AssembledBills {
    pub fn count_of(&self, bill_type: BillType) -> u32 {
        self.bills
            .iter()
            .filter(|bill| bill.bill_type == bill_type)
            .count() as u32
    }

    pub fn total_amount(&self) -> Decimal {
        self.bills.iter().map(|bill| bill.amount).sum()
    }
}

/// Outcome of the single-apartment entry point.
#[derive(Debug, Clone, Serialize)]
pub struct ApartmentBillingResult {
    pub apartment_number: String,
    pub billing_period: String,
    pub created: Vec<Bill>,
    pub already_billed: Vec<String>,
    pub charge_failures: Vec<String>,
}

pub fn management_bill_number(apartment_number: &str, billing_date: NaiveDate) -> String {
    format!(
        "{}-{apartment_number}-{}",
        BillType::ManagementFee.number_prefix(),
        billing_date.format("%Y%m")
    )
}

/// With `vehicle_suffix` the vehicle id is appended, which keeps the number
/// unique when several vehicles of one category share an apartment.
pub fn parking_bill_number(
    vehicle: &Vehicle,
    apartment_number: &str,
    billing_date: NaiveDate,
    vehicle_suffix: bool,
) -> String {
    let base = format!(
        "{}-{}-{apartment_number}-{}",
        BillType::Parking.number_prefix(),
        vehicle.vehicle_type.as_str().to_ascii_uppercase(),
        billing_date.format("%Y%m")
    );
    if vehicle_suffix {
        format!("{base}-{}", vehicle.id)
    } else {
        base
    }
}

struct Candidate {
    bill: NewBill,
    /// Vehicle-specific number used when `bill.bill_number` is already taken.
    fallback_number: Option<String>,
}

/// Build the bills `apartment` owes for the month ending on `billing_date`.
///
/// A missing management rate fails the whole apartment. A missing parking
/// rate only drops that vehicle's bill and is reported in `charge_failures`.
/// A charge already stored for the same apartment, type, period and vehicle
/// is left out and listed in `already_billed`, so re-running a month never
/// duplicates even if the set of active vehicles changed in between.
pub async fn generate_bills_for_apartment<S: BillingStore + ?Sized>(
    store: &S,
    apartment: &Apartment,
    billing_date: NaiveDate,
    options: &AssemblyOptions,
) -> Result<AssembledBills, BillingError> {
    if apartment.status != ApartmentStatus::Occupied {
        return Err(BillingError::Validation(format!(
            "apartment {} is not occupied",
            apartment.apartment_number
        )));
    }
    let Some(resident_id) = apartment.resident_id else {
        return Err(BillingError::Validation(format!(
            "apartment {} is occupied but has no resident",
            apartment.apartment_number
        )));
    };
    if apartment.area <= Decimal::ZERO {
        return Err(BillingError::Validation(format!(
            "apartment {} has a non-positive area ({})",
            apartment.apartment_number, apartment.area
        )));
    }

    if occupied_days(billing_date, apartment.move_in_date) == 0 {
        tracing::debug!(
            apartment = %apartment.apartment_number,
            move_in_date = ?apartment.move_in_date,
            "Resident moves in after the billing month, nothing owed"
        );
        return Ok(AssembledBills::default());
    }

    let rates = RateLookup::new(store);
    let mut assembled = AssembledBills::default();
    let mut candidates = Vec::new();

    let rate_per_m2 = rates
        .require_price(ChargeCategory::ManagementFeePerM2, None, billing_date)
        .await?;
    candidates.push(Candidate {
        bill: build_management_bill(apartment, resident_id, rate_per_m2, billing_date, options),
        fallback_number: None,
    });

    if options.include_parking {
        let vehicles = store.list_active_vehicles(resident_id).await?;
        let mut categories_seen = HashSet::new();
        for vehicle in &vehicles {
            // Vehicles come ordered by id; the first of each category keeps the plain number.
            let vehicle_suffix = !categories_seen.insert(vehicle.vehicle_type);

            let monthly_fee = match rates
                .require_price(vehicle.vehicle_type.parking_category(), None, billing_date)
                .await
            {
                Ok(price) => price,
                Err(error @ BillingError::Configuration(_)) => {
                    assembled
                        .charge_failures
                        .push(format!("vehicle {}: {error}", vehicle.license_plate));
                    continue;
                }
                Err(error) => return Err(error),
            };
            let bill = build_parking_bill(
                apartment,
                resident_id,
                vehicle,
                vehicle_suffix,
                monthly_fee,
                billing_date,
                options,
            );
            let fallback_number = (!vehicle_suffix).then(|| {
                parking_bill_number(vehicle, &apartment.apartment_number, billing_date, true)
            });
            candidates.push(Candidate {
                bill,
                fallback_number,
            });
        }
    }

    let stored = store
        .existing_period_bills(apartment.id, &billing_period_label(billing_date))
        .await?;
    let mut fresh = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let already = stored.iter().find(|key| {
            key.bill_type == candidate.bill.bill_type
                && key.vehicle_id == candidate.bill.vehicle_id
        });
        match already {
            Some(key) => assembled.already_billed.push(key.bill_number.clone()),
            None => fresh.push(candidate),
        }
    }

    let mut numbers = Vec::with_capacity(fresh.len() * 2);
    for candidate in &fresh {
        numbers.push(candidate.bill.bill_number.clone());
        numbers.extend(candidate.fallback_number.iter().cloned());
    }
    let taken = store.existing_bill_numbers(&numbers).await?;

    for Candidate {
        mut bill,
        fallback_number,
    } in fresh
    {
        if taken.contains(&bill.bill_number) {
            match fallback_number.filter(|number| !taken.contains(number)) {
                Some(number) => bill.bill_number = number,
                None => {
                    assembled.charge_failures.push(format!(
                        "bill number {} is already used by another bill",
                        bill.bill_number
                    ));
                    continue;
                }
            }
        }
        assembled.bills.push(bill);
    }

    Ok(assembled)
}

/// Assemble and commit the bills of a single apartment.
///
/// Operators use this to retry apartments that failed in a batch run.
pub async fn generate_and_commit_for_apartment<S: BillingStore + ?Sized>(
    store: &S,
    apartment_id: i64,
    billing_date: NaiveDate,
    options: &AssemblyOptions,
) -> Result<ApartmentBillingResult, BillingError> {
    let apartment = store
        .get_apartment(apartment_id)
        .await?
        .ok_or_else(|| BillingError::NotFound(format!("apartment {apartment_id} not found")))?;

    let assembled = generate_bills_for_apartment(store, &apartment, billing_date, options).await?;
    let created = store.insert_bills(&assembled.bills).await?;

    tracing::info!(
        apartment = %apartment.apartment_number,
        created = created.len(),
        already_billed = assembled.already_billed.len(),
        charge_failures = assembled.charge_failures.len(),
        "Apartment bills generated"
    );

    Ok(ApartmentBillingResult {
        apartment_number: apartment.apartment_number,
        billing_period: billing_period_label(billing_date),
        created,
        already_billed: assembled.already_billed,
        charge_failures: assembled.charge_failures,
    })
}

fn build_management_bill(
    apartment: &Apartment,
    resident_id: i64,
    rate_per_m2: Decimal,
    billing_date: NaiveDate,
    options: &AssemblyOptions,
) -> NewBill {
    // Bill precision first, so a full month is billed at exactly this amount.
    let monthly_fee = round_money(rate_per_m2 * apartment.area);
    let prorated = is_prorated(billing_date, apartment.move_in_date);

    let mut description = format!(
        "Apartment {} - {} m² x {}/m²",
        apartment.apartment_number,
        apartment.area.normalize(),
        rate_per_m2.normalize()
    );
    if prorated {
        description.push('\n');
        description.push_str(&prorata_note(apartment.move_in_date, billing_date));
    }

    NewBill {
        bill_number: management_bill_number(&apartment.apartment_number, billing_date),
        user_id: resident_id,
        apartment_id: apartment.id,
        vehicle_id: None,
        bill_type: BillType::ManagementFee,
        billing_period: billing_period_label(billing_date),
        title: format!("Management fee {}", billing_date.format("%m/%Y")),
        description: Some(description),
        amount: prorated_amount(monthly_fee, billing_date, apartment.move_in_date),
        due_date: due_date(billing_date, options),
        status: BillStatus::Pending,
        is_prorated: prorated,
    }
}

fn build_parking_bill(
    apartment: &Apartment,
    resident_id: i64,
    vehicle: &Vehicle,
    vehicle_suffix: bool,
    monthly_fee: Decimal,
    billing_date: NaiveDate,
    options: &AssemblyOptions,
) -> NewBill {
    let prorated = is_prorated(billing_date, apartment.move_in_date);

    let mut description = format!(
        "{} parking - plate {}",
        vehicle.vehicle_type.as_str(),
        vehicle.license_plate
    );
    if prorated {
        description.push('\n');
        description.push_str(&prorata_note(apartment.move_in_date, billing_date));
    }

    NewBill {
        bill_number: parking_bill_number(
            vehicle,
            &apartment.apartment_number,
            billing_date,
            vehicle_suffix,
        ),
        user_id: resident_id,
        apartment_id: apartment.id,
        vehicle_id: Some(vehicle.id),
        bill_type: BillType::Parking,
        billing_period: billing_period_label(billing_date),
        title: format!("Parking fee {}", billing_date.format("%m/%Y")),
        description: Some(description),
        amount: prorated_amount(monthly_fee, billing_date, apartment.move_in_date),
        due_date: due_date(billing_date, options),
        status: BillStatus::Pending,
        is_prorated: prorated,
    }
}

fn prorata_note(move_in_date: Option<NaiveDate>, billing_date: NaiveDate) -> String {
    let moved_in = move_in_date
        .map(|date| date.format("%d/%m/%Y").to_string())
        .unwrap_or_default();
    format!(
        "Prorated: moved in {moved_in} ({}/{} days)",
        occupied_days(billing_date, move_in_date),
        days_in_month(billing_date)
    )
}

fn due_date(billing_date: NaiveDate, options: &AssemblyOptions) -> NaiveDate {
    billing_date
        .checked_add_days(Days::new(u64::from(options.due_days)))
        .unwrap_or(billing_date)
}
