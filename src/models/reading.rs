use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::MonitorError;

pub const MIN_READING_TEMPERATURE: f64 = -50.0;
pub const MAX_READING_TEMPERATURE: f64 = 100.0;

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct TemperatureReading {
    pub id: Uuid,
    pub shipment_id: Uuid, // shipments.id
    pub temperature: f64,
    pub recorded_at: DateTime<Utc>,
    pub device_id: Option<String>,
    pub location: Option<String>,
    #[serde(default)]
    pub is_alert: bool,
}

/// A reading as submitted by a user or a device, before `is_alert` is derived.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReading {
    pub shipment_id: Uuid,
    pub temperature: f64,
    pub recorded_at: Option<DateTime<Utc>>, // backend default NOW() when absent
    pub device_id: Option<String>,
    pub location: Option<String>,
}

impl NewReading {
    pub fn new(shipment_id: Uuid, temperature: f64) -> Self {
        Self {
            shipment_id,
            temperature,
            recorded_at: None,
            device_id: None,
            location: None,
        }
    }

    pub fn with_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = non_empty(Some(device_id.into()));
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = non_empty(Some(location.into()));
        self
    }

    pub fn validate(&self) -> Result<(), MonitorError> {
        if !self.temperature.is_finite() {
            return Err(MonitorError::Validation(
                "Temperature must be a number".to_string(),
            ));
        }
        if self.temperature < MIN_READING_TEMPERATURE {
            return Err(MonitorError::Validation(format!(
                "Temperature must be at least {}°C",
                MIN_READING_TEMPERATURE
            )));
        }
        if self.temperature > MAX_READING_TEMPERATURE {
            return Err(MonitorError::Validation(format!(
                "Temperature must be below {}°C",
                MAX_READING_TEMPERATURE
            )));
        }
        Ok(())
    }
}

/// Blank optional form fields are stored as NULL.
pub fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|s| {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
