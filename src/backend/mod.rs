//! Boundary to the managed backend that owns persistence.
//!
//! Every call is a single attempt: a failure is returned to the caller and
//! never retried here.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::MonitorResult;
use crate::models::{NewReading, NewShipment, Shipment, TemperatureReading};
use crate::session::Session;

pub mod memory;
pub mod postgres;

pub use memory::MemoryBackend;
pub use postgres::PgBackend;

/// Number of shipments shown on the dashboard's recent list.
pub const RECENT_SHIPMENTS_LIMIT: i64 = 5;

#[async_trait]
pub trait Backend: Send + Sync {
    /// Shipments ordered by creation time, newest first.
    async fn fetch_shipments(&self, limit: Option<i64>) -> MonitorResult<Vec<Shipment>>;

    /// Readings for one shipment, newest first.
    async fn fetch_readings(&self, shipment_id: Uuid) -> MonitorResult<Vec<TemperatureReading>>;

    async fn fetch_latest_reading(
        &self,
        shipment_id: Uuid,
    ) -> MonitorResult<Option<TemperatureReading>>;

    async fn insert_shipment(
        &self,
        session: &Session,
        shipment: NewShipment,
    ) -> MonitorResult<Shipment>;

    /// Records a reading, derives its `is_alert` flag against the shipment
    /// target and refreshes the shipment's current temperature.
    async fn insert_reading(&self, reading: NewReading) -> MonitorResult<TemperatureReading>;

    async fn update_current_temperature(
        &self,
        shipment_id: Uuid,
        temperature: Option<f64>,
    ) -> MonitorResult<()>;
}
