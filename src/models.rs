use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "apartment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ApartmentStatus {
    Available,
    Occupied,
    Maintenance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "vehicle_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum VehicleType {
    Car,
    Motorcycle,
    Bicycle,
}

impl VehicleType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Car => "car",
            Self::Motorcycle => "motorcycle",
            Self::Bicycle => "bicycle",
        }
    }

    pub fn parking_category(self) -> ChargeCategory {
        match self {
            Self::Car => ChargeCategory::ParkingCar,
            Self::Motorcycle => ChargeCategory::ParkingMotorcycle,
            Self::Bicycle => ChargeCategory::ParkingBicycle,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "vehicle_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum VehicleStatus {
    Pending,
    Active,
    Expired,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "bill_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BillType {
    ManagementFee,
    Utility,
    Parking,
    Service,
    Other,
}

impl BillType {
    /// Prefix used in deterministic bill numbers.
    pub fn number_prefix(self) -> &'static str {
        match self {
            Self::ManagementFee => "MF",
            Self::Utility => "UT",
            Self::Parking => "PK",
            Self::Service => "SV",
            Self::Other => "OT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "bill_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BillStatus {
    Pending,
    Paid,
    Overdue,
    Cancelled,
}

/// Price categories held in the time-versioned price table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "charge_category", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChargeCategory {
    ManagementFeePerM2,
    ParkingCar,
    ParkingMotorcycle,
    ParkingBicycle,
    Service,
    Electricity,
    Water,
    Other,
}

impl ChargeCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ManagementFeePerM2 => "management_fee_per_m2",
            Self::ParkingCar => "parking_car",
            Self::ParkingMotorcycle => "parking_motorcycle",
            Self::ParkingBicycle => "parking_bicycle",
            Self::Service => "service",
            Self::Electricity => "electricity",
            Self::Water => "water",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Apartment {
    pub id: i64,
    pub apartment_number: String,
    pub building: String,
    pub floor: i32,
    pub area: Decimal,
    pub status: ApartmentStatus,
    pub resident_id: Option<i64>,
    pub move_in_date: Option<NaiveDate>,
    pub electricity_meter_start: Option<Decimal>,
    pub water_meter_start: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Vehicle {
    pub id: i64,
    pub user_id: i64,
    pub license_plate: String,
    pub vehicle_type: VehicleType,
    pub status: VehicleStatus,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PriceRecord {
    pub id: i64,
    pub category: ChargeCategory,
    pub reference_id: Option<i64>,
    pub price: Decimal,
    pub effective_from: DateTime<Utc>,
}

/// A bill built by the assembler and not yet persisted.
///
/// Every column written on insert is a field here; nothing else reaches the
/// `bills` table from this crate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewBill {
    pub bill_number: String,
    pub user_id: i64,
    pub apartment_id: i64,
    pub vehicle_id: Option<i64>,
    pub bill_type: BillType,
    /// `YYYY-MM` of the billed month.
    pub billing_period: String,
    pub title: String,
    pub description: Option<String>,
    pub amount: Decimal,
    pub due_date: NaiveDate,
    pub status: BillStatus,
    pub is_prorated: bool,
}

/// What identifies a stored bill within one apartment and billing period.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct BillKey {
    pub bill_type: BillType,
    pub vehicle_id: Option<i64>,
    pub bill_number: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Bill {
    pub id: i64,
    pub bill_number: String,
    pub user_id: i64,
    pub apartment_id: i64,
    pub vehicle_id: Option<i64>,
    pub bill_type: BillType,
    pub billing_period: String,
    pub title: String,
    pub description: Option<String>,
    pub amount: Decimal,
    pub due_date: NaiveDate,
    pub status: BillStatus,
    pub is_prorated: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
