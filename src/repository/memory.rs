use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;

use crate::error::BillingError;
use crate::models::{
    Apartment, ApartmentStatus, Bill, BillKey, BillType, ChargeCategory, NewBill, PriceRecord,
    Vehicle, VehicleStatus, VehicleType,
};
use crate::repository::{ApartmentRepository, BillRepository, PriceRepository, VehicleRepository};
use crate::services::rates::select_effective_price;

/// In-memory store mirroring the PostgreSQL constraints that matter to billing.
#[derive(Default)]
pub struct MemoryStore {
    apartments: Mutex<Vec<Apartment>>,
    vehicles: Mutex<Vec<Vehicle>>,
    prices: Mutex<Vec<PriceRecord>>,
    bills: Mutex<Vec<Bill>>,
    fail_next_commit: AtomicBool,
}

impl MemoryStore {
    pub fn add_apartment(
        &self,
        apartment_number: &str,
        area: Decimal,
        resident_id: Option<i64>,
        move_in_date: Option<NaiveDate>,
    ) -> Apartment {
        let mut apartments = self.apartments.lock().expect("apartments lock");
        let apartment = Apartment {
            id: apartments.len() as i64 + 1,
            apartment_number: apartment_number.to_string(),
            building: "A".to_string(),
            floor: 1,
            area,
            status: ApartmentStatus::Occupied,
            resident_id,
            move_in_date,
            electricity_meter_start: None,
            water_meter_start: None,
        };
        apartments.push(apartment.clone());
        apartment
    }

    pub fn set_apartment_status(&self, apartment_id: i64, status: ApartmentStatus) {
        let mut apartments = self.apartments.lock().expect("apartments lock");
        if let Some(apartment) = apartments.iter_mut().find(|a| a.id == apartment_id) {
            apartment.status = status;
        }
    }

    pub fn add_vehicle(
        &self,
        user_id: i64,
        license_plate: &str,
        vehicle_type: VehicleType,
        status: VehicleStatus,
    ) -> Vehicle {
        let mut vehicles = self.vehicles.lock().expect("vehicles lock");
        let vehicle = Vehicle {
            id: vehicles.len() as i64 + 1,
            user_id,
            license_plate: license_plate.to_string(),
            vehicle_type,
            status,
        };
        vehicles.push(vehicle.clone());
        vehicle
    }

    pub fn add_price(
        &self,
        category: ChargeCategory,
        reference_id: Option<i64>,
        price: Decimal,
        effective_from: NaiveDate,
    ) {
        let mut prices = self.prices.lock().expect("prices lock");
        let id = prices.len() as i64 + 1;
        prices.push(PriceRecord {
            id,
            category,
            reference_id,
            price,
            effective_from: effective_from.and_time(NaiveTime::MIN).and_utc(),
        });
    }

    pub fn set_vehicle_status(&self, vehicle_id: i64, status: VehicleStatus) {
        let mut vehicles = self.vehicles.lock().expect("vehicles lock");
        if let Some(vehicle) = vehicles.iter_mut().find(|v| v.id == vehicle_id) {
            vehicle.status = status;
        }
    }

    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    pub fn bills(&self) -> Vec<Bill> {
        self.bills.lock().expect("bills lock").clone()
    }
}

#[async_trait]
impl ApartmentRepository for MemoryStore {
    async fn list_occupied_apartments(&self) -> Result<Vec<Apartment>, BillingError> {
        let mut occupied: Vec<Apartment> = self
            .apartments
            .lock()
            .expect("apartments lock")
            .iter()
            .filter(|apartment| apartment.status == ApartmentStatus::Occupied)
            .cloned()
            .collect();
        occupied.sort_by(|a, b| a.apartment_number.cmp(&b.apartment_number));
        Ok(occupied)
    }

    async fn get_apartment(&self, apartment_id: i64) -> Result<Option<Apartment>, BillingError> {
        Ok(self
            .apartments
            .lock()
            .expect("apartments lock")
            .iter()
            .find(|apartment| apartment.id == apartment_id)
            .cloned())
    }
}

#[async_trait]
impl VehicleRepository for MemoryStore {
    async fn list_active_vehicles(&self, resident_id: i64) -> Result<Vec<Vehicle>, BillingError> {
        let mut vehicles: Vec<Vehicle> = self
            .vehicles
            .lock()
            .expect("vehicles lock")
            .iter()
            .filter(|v| v.user_id == resident_id && v.status == VehicleStatus::Active)
            .cloned()
            .collect();
        vehicles.sort_by_key(|v| v.id);
        Ok(vehicles)
    }
}

#[async_trait]
impl PriceRepository for MemoryStore {
    async fn latest_price(
        &self,
        category: ChargeCategory,
        reference_id: Option<i64>,
        as_of: NaiveDate,
    ) -> Result<Option<PriceRecord>, BillingError> {
        let prices = self.prices.lock().expect("prices lock");
        Ok(select_effective_price(&prices, category, reference_id, as_of).cloned())
    }
}

#[async_trait]
impl BillRepository for MemoryStore {
    async fn existing_period_bills(
        &self,
        apartment_id: i64,
        billing_period: &str,
    ) -> Result<Vec<BillKey>, BillingError> {
        let bills = self.bills.lock().expect("bills lock");
        Ok(bills
            .iter()
            .filter(|b| b.apartment_id == apartment_id && b.billing_period == billing_period)
            .map(|b| BillKey {
                bill_type: b.bill_type,
                vehicle_id: b.vehicle_id,
                bill_number: b.bill_number.clone(),
            })
            .collect())
    }

    async fn existing_bill_numbers(
        &self,
        bill_numbers: &[String],
    ) -> Result<HashSet<String>, BillingError> {
        let bills = self.bills.lock().expect("bills lock");
        Ok(bills
            .iter()
            .filter(|bill| bill_numbers.contains(&bill.bill_number))
            .map(|bill| bill.bill_number.clone())
            .collect())
    }

    async fn insert_bills(&self, new_bills: &[NewBill]) -> Result<Vec<Bill>, BillingError> {
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(BillingError::Persistence("connection reset".to_string()));
        }

        let mut bills = self.bills.lock().expect("bills lock");
        let mut seen: HashSet<(i64, BillType, String, Option<i64>)> = bills
            .iter()
            .map(|b| (b.apartment_id, b.bill_type, b.billing_period.clone(), b.vehicle_id))
            .collect();
        let mut numbers: HashSet<String> = bills.iter().map(|b| b.bill_number.clone()).collect();

        let mut staged = Vec::with_capacity(new_bills.len());
        for (offset, new_bill) in new_bills.iter().enumerate() {
            let period_key = (
                new_bill.apartment_id,
                new_bill.bill_type,
                new_bill.billing_period.clone(),
                new_bill.vehicle_id,
            );
            if !numbers.insert(new_bill.bill_number.clone()) || !seen.insert(period_key) {
                return Err(BillingError::Duplicate(new_bill.bill_number.clone()));
            }
            staged.push(Bill {
                id: (bills.len() + offset) as i64 + 1,
                bill_number: new_bill.bill_number.clone(),
                user_id: new_bill.user_id,
                apartment_id: new_bill.apartment_id,
                vehicle_id: new_bill.vehicle_id,
                bill_type: new_bill.bill_type,
                billing_period: new_bill.billing_period.clone(),
                title: new_bill.title.clone(),
                description: new_bill.description.clone(),
                amount: new_bill.amount,
                due_date: new_bill.due_date,
                status: new_bill.status,
                is_prorated: new_bill.is_prorated,
                paid_at: None,
                created_at: Utc::now(),
            });
        }

        bills.extend(staged.iter().cloned());
        Ok(staged)
    }
}
