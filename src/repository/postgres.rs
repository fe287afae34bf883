use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::error::BillingError;
use crate::models::{
    Apartment, ApartmentStatus, Bill, BillKey, ChargeCategory, NewBill, PriceRecord, Vehicle,
    VehicleStatus,
};
use crate::repository::{
    ApartmentRepository, BillRepository, PriceRepository, VehicleRepository,
};

const APARTMENT_COLUMNS: &str = "id, apartment_number, building, floor, area, status, resident_id, \
     move_in_date, electricity_meter_start, water_meter_start";

const BILL_COLUMNS: &str = "id, bill_number, user_id, apartment_id, vehicle_id, bill_type, \
     billing_period, title, description, amount, due_date, status, is_prorated, paid_at, created_at";

#[derive(Clone)]
pub struct PgBillingStore {
    pool: PgPool,
}

impl PgBillingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApartmentRepository for PgBillingStore {
    async fn list_occupied_apartments(&self) -> Result<Vec<Apartment>, BillingError> {
        let sql = format!(
            "SELECT {APARTMENT_COLUMNS} FROM apartments WHERE status = $1 ORDER BY apartment_number"
        );
        sqlx::query_as::<_, Apartment>(&sql)
            .bind(ApartmentStatus::Occupied)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)
    }

    async fn get_apartment(&self, apartment_id: i64) -> Result<Option<Apartment>, BillingError> {
        let sql = format!("SELECT {APARTMENT_COLUMNS} FROM apartments WHERE id = $1");
        sqlx::query_as::<_, Apartment>(&sql)
            .bind(apartment_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)
    }
}

#[async_trait]
impl VehicleRepository for PgBillingStore {
    async fn list_active_vehicles(&self, resident_id: i64) -> Result<Vec<Vehicle>, BillingError> {
        sqlx::query_as::<_, Vehicle>(
            "SELECT id, user_id, license_plate, vehicle_type, status
             FROM vehicles
             WHERE user_id = $1 AND status = $2
             ORDER BY id",
        )
        .bind(resident_id)
        .bind(VehicleStatus::Active)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)
    }
}

#[async_trait]
impl PriceRepository for PgBillingStore {
    async fn latest_price(
        &self,
        category: ChargeCategory,
        reference_id: Option<i64>,
        as_of: NaiveDate,
    ) -> Result<Option<PriceRecord>, BillingError> {
        // Midnight UTC at the start of the as-of day.
        let cutoff = as_of.and_time(NaiveTime::MIN).and_utc();

        sqlx::query_as::<_, PriceRecord>(
            "SELECT id, category, reference_id, price, effective_from
             FROM price_histories
             WHERE category = $1
               AND reference_id IS NOT DISTINCT FROM $2
               AND effective_from <= $3
             ORDER BY effective_from DESC, id DESC
             LIMIT 1",
        )
        .bind(category)
        .bind(reference_id)
        .bind(cutoff)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)
    }
}

#[async_trait]
impl BillRepository for PgBillingStore {
    async fn existing_period_bills(
        &self,
        apartment_id: i64,
        billing_period: &str,
    ) -> Result<Vec<BillKey>, BillingError> {
        sqlx::query_as::<_, BillKey>(
            "SELECT bill_type, vehicle_id, bill_number
             FROM bills
             WHERE apartment_id = $1 AND billing_period = $2",
        )
        .bind(apartment_id)
        .bind(billing_period)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)
    }

    async fn existing_bill_numbers(
        &self,
        bill_numbers: &[String],
    ) -> Result<HashSet<String>, BillingError> {
        if bill_numbers.is_empty() {
            return Ok(HashSet::new());
        }
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT bill_number FROM bills WHERE bill_number = ANY($1)")
                .bind(bill_numbers.to_vec())
                .fetch_all(&self.pool)
                .await
                .map_err(map_db_error)?;
        Ok(rows.into_iter().map(|(number,)| number).collect())
    }

    async fn insert_bills(&self, bills: &[NewBill]) -> Result<Vec<Bill>, BillingError> {
        if bills.is_empty() {
            return Ok(Vec::new());
        }

        // Dropping the transaction on any `?` below rolls everything back.
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;
        let mut created = Vec::with_capacity(bills.len());
        for bill in bills {
            let mut query = build_insert_bill(bill);
            let row = query
                .build_query_as::<Bill>()
                .fetch_one(&mut *tx)
                .await
                .map_err(map_db_error)?;
            created.push(row);
        }
        tx.commit().await.map_err(map_db_error)?;

        Ok(created)
    }
}

fn build_insert_bill(bill: &NewBill) -> QueryBuilder<'_, Postgres> {
    let mut query = QueryBuilder::<Postgres>::new(
        "INSERT INTO bills (bill_number, user_id, apartment_id, vehicle_id, bill_type, \
         billing_period, title, description, amount, due_date, status, is_prorated) ",
    );
    query.push_values(std::iter::once(bill), |mut row, bill| {
        row.push_bind(&bill.bill_number)
            .push_bind(bill.user_id)
            .push_bind(bill.apartment_id)
            .push_bind(bill.vehicle_id)
            .push_bind(bill.bill_type)
            .push_bind(&bill.billing_period)
            .push_bind(&bill.title)
            .push_bind(&bill.description)
            .push_bind(bill.amount)
            .push_bind(bill.due_date)
            .push_bind(bill.status)
            .push_bind(bill.is_prorated);
    });
    query.push(" RETURNING ").push(BILL_COLUMNS);
    query
}

fn map_db_error(error: sqlx::Error) -> BillingError {
    let message = error.to_string();
    tracing::error!(db_error = %message, "Database query failed");

    if let sqlx::Error::Database(db_error) = &error {
        if db_error.is_unique_violation() {
            return BillingError::Duplicate(
                db_error
                    .constraint()
                    .map(|constraint| format!("violates unique constraint {constraint}"))
                    .unwrap_or_else(|| "violates a unique constraint".to_string()),
            );
        }
    }
    BillingError::Persistence(message)
}
