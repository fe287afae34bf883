//! Persistence boundary of the billing core.
//!
//! The engine only ever talks to these traits; `postgres` is the production
//! implementation and `memory` backs the tests.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::BillingError;
use crate::models::{Apartment, Bill, BillKey, ChargeCategory, NewBill, PriceRecord, Vehicle};

#[cfg(test)]
pub mod memory;
pub mod postgres;

#[async_trait]
pub trait ApartmentRepository: Send + Sync {
    /// Apartments with status `occupied`, ordered by apartment number.
    async fn list_occupied_apartments(&self) -> Result<Vec<Apartment>, BillingError>;

    async fn get_apartment(&self, apartment_id: i64) -> Result<Option<Apartment>, BillingError>;
}

#[async_trait]
pub trait VehicleRepository: Send + Sync {
    /// Active vehicles owned by `resident_id`, ordered by vehicle id.
    async fn list_active_vehicles(&self, resident_id: i64) -> Result<Vec<Vehicle>, BillingError>;
}

#[async_trait]
pub trait PriceRepository: Send + Sync {
    /// Most recent record of `category`/`reference_id` effective on or before
    /// `as_of`. `reference_id = None` selects global rates only.
    async fn latest_price(
        &self,
        category: ChargeCategory,
        reference_id: Option<i64>,
        as_of: NaiveDate,
    ) -> Result<Option<PriceRecord>, BillingError>;
}

#[async_trait]
pub trait BillRepository: Send + Sync {
    /// Keys of the bills already stored for `apartment_id` and `billing_period`.
    async fn existing_period_bills(
        &self,
        apartment_id: i64,
        billing_period: &str,
    ) -> Result<Vec<BillKey>, BillingError>;

    /// Subset of `bill_numbers` already stored.
    async fn existing_bill_numbers(
        &self,
        bill_numbers: &[String],
    ) -> Result<HashSet<String>, BillingError>;

    /// Insert all bills in one transaction. Nothing is written on error.
    async fn insert_bills(&self, bills: &[NewBill]) -> Result<Vec<Bill>, BillingError>;
}

/// Everything the bill assembler and the batch need from storage.
pub trait BillingStore:
    ApartmentRepository + VehicleRepository + PriceRepository + BillRepository
{
}

impl<T> BillingStore for T where
    T: ApartmentRepository + VehicleRepository + PriceRepository + BillRepository
{
}
