use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::MonitorError;

/// Shipment lifecycle status. Transitions are not validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShipmentStatus {
    Scheduled,
    #[serde(rename = "In Transit")]
    InTransit,
    Delayed,
    Delivered,
    Cancelled,
}

impl ShipmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShipmentStatus::Scheduled => "Scheduled",
            ShipmentStatus::InTransit => "In Transit",
            ShipmentStatus::Delayed => "Delayed",
            ShipmentStatus::Delivered => "Delivered",
            ShipmentStatus::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShipmentStatus {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Scheduled" => Ok(ShipmentStatus::Scheduled),
            "In Transit" => Ok(ShipmentStatus::InTransit),
            "Delayed" => Ok(ShipmentStatus::Delayed),
            "Delivered" => Ok(ShipmentStatus::Delivered),
            "Cancelled" => Ok(ShipmentStatus::Cancelled),
            other => Err(MonitorError::Validation(format!(
                "Unknown shipment status: '{}'",
                other
            ))),
        }
    }
}

impl TryFrom<String> for ShipmentStatus {
    type Error = MonitorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Shipment {
    pub id: Uuid,
    pub shipment_id: String, // human-facing code, SH-xxxxx
    pub destination: String,
    pub product: String,
    pub target_temperature: f64,
    pub current_temperature: Option<f64>, // NULL until the first reading
    #[sqlx(try_from = "String")]
    pub status: ShipmentStatus,
    pub departure_date: DateTime<Utc>,
    pub estimated_arrival: Option<DateTime<Utc>>,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for a new shipment, as submitted from the creation form.
#[derive(Debug, Clone, Deserialize)]
pub struct NewShipment {
    pub destination: String,
    pub product: String,
    pub target_temperature: f64,
    pub departure_date: DateTime<Utc>,
    pub estimated_arrival: Option<DateTime<Utc>>,
    pub status: ShipmentStatus,
}

impl NewShipment {
    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.destination.trim().chars().count() < 3 {
            return Err(MonitorError::Validation(
                "Destination must be at least 3 characters.".to_string(),
            ));
        }
        if self.product.trim().chars().count() < 2 {
            return Err(MonitorError::Validation(
                "Product must be at least 2 characters.".to_string(),
            ));
        }
        if !self.target_temperature.is_finite() {
            return Err(MonitorError::Validation(
                "Target temperature must be a number".to_string(),
            ));
        }
        Ok(())
    }
}

const CODE_ALPHABET: &[u8; 36] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const CODE_LEN: usize = 5;

/// Generates a shipment code of the form `SH-xxxxx` with a `[a-z0-9]` suffix.
pub fn generate_shipment_code() -> String {
    let mut bits = Uuid::new_v4().as_u128();
    let mut suffix = String::with_capacity(CODE_LEN);
    for _ in 0..CODE_LEN {
        suffix.push(CODE_ALPHABET[(bits % 36) as usize] as char);
        bits /= 36;
    }
    format!("SH-{}", suffix)
}
