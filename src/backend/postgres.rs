use async_trait::async_trait;
use sqlx::Row;
use tracing::{debug, info};
use uuid::Uuid;

use crate::backend::Backend;
use crate::db::{queries, DbPool};
use crate::error::{MonitorError, MonitorResult};
use crate::models::shipment::generate_shipment_code;
use crate::models::{NewReading, NewShipment, Shipment, TemperatureReading};
use crate::rules::temperature::exceeds_threshold;
use crate::session::Session;

#[derive(Clone)]
pub struct PgBackend {
    pool: DbPool,
    alert_threshold: f64,
}

impl PgBackend {
    pub fn new(pool: DbPool, alert_threshold: f64) -> Self {
        Self { pool, alert_threshold }
    }
}

#[async_trait]
impl Backend for PgBackend {
    async fn fetch_shipments(&self, limit: Option<i64>) -> MonitorResult<Vec<Shipment>> {
        let shipments = sqlx::query_as::<_, Shipment>(queries::SELECT_SHIPMENTS)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        debug!("Fetched {} shipments", shipments.len());
        Ok(shipments)
    }

    async fn fetch_readings(&self, shipment_id: Uuid) -> MonitorResult<Vec<TemperatureReading>> {
        let readings = sqlx::query_as::<_, TemperatureReading>(queries::SELECT_READINGS)
            .bind(shipment_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(readings)
    }

    async fn fetch_latest_reading(
        &self,
        shipment_id: Uuid,
    ) -> MonitorResult<Option<TemperatureReading>> {
        let reading = sqlx::query_as::<_, TemperatureReading>(queries::SELECT_LATEST_READING)
            .bind(shipment_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(reading)
    }

    async fn insert_shipment(
        &self,
        session: &Session,
        shipment: NewShipment,
    ) -> MonitorResult<Shipment> {
        shipment.validate()?;

        let created = sqlx::query_as::<_, Shipment>(queries::INSERT_SHIPMENT)
            .bind(Uuid::new_v4())
            .bind(generate_shipment_code())
            .bind(&shipment.destination)
            .bind(&shipment.product)
            .bind(shipment.target_temperature)
            .bind(shipment.status.as_str())
            .bind(shipment.departure_date)
            .bind(shipment.estimated_arrival)
            .bind(session.user_id)
            .fetch_one(&self.pool)
            .await?;

        info!("Created shipment {} to {}", created.shipment_id, created.destination);
        Ok(created)
    }

    async fn insert_reading(&self, reading: NewReading) -> MonitorResult<TemperatureReading> {
        reading.validate()?;

        let mut tx = self.pool.begin().await?;

        // Lock the shipment so the snapshot update below follows this insert.
        let target_row = sqlx::query(queries::SELECT_SHIPMENT_TARGET_FOR_UPDATE)
            .bind(reading.shipment_id)
            .fetch_optional(&mut *tx)
            .await?;

        let target: f64 = match target_row {
            Some(row) => row.try_get("target_temperature")?,
            None => return Err(MonitorError::ShipmentNotFound(reading.shipment_id)),
        };

        let is_alert = exceeds_threshold(Some(reading.temperature), target, self.alert_threshold);

        let inserted = sqlx::query_as::<_, TemperatureReading>(queries::INSERT_READING)
            .bind(Uuid::new_v4())
            .bind(reading.shipment_id)
            .bind(reading.temperature)
            .bind(reading.recorded_at)
            .bind(&reading.device_id)
            .bind(&reading.location)
            .bind(is_alert)
            .fetch_one(&mut *tx)
            .await?;

        let snapshot = sqlx::query(queries::UPDATE_CURRENT_TEMPERATURE_FROM_READING)
            .bind(reading.shipment_id)
            .bind(Some(reading.temperature))
            .bind(inserted.recorded_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        if snapshot.rows_affected() == 0 {
            debug!(
                "Reading {} is older than the latest for shipment {}, snapshot kept",
                inserted.id, inserted.shipment_id
            );
        }

        info!(
            "Recorded reading {:.1} for shipment {} (alert: {})",
            inserted.temperature, inserted.shipment_id, inserted.is_alert
        );
        Ok(inserted)
    }

    async fn update_current_temperature(
        &self,
        shipment_id: Uuid,
        temperature: Option<f64>,
    ) -> MonitorResult<()> {
        let result = sqlx::query(queries::UPDATE_CURRENT_TEMPERATURE)
            .bind(shipment_id)
            .bind(temperature)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(MonitorError::ShipmentNotFound(shipment_id));
        }
        Ok(())
    }
}
