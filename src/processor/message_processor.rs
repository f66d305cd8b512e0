use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::backend::Backend;
use crate::error::MonitorResult;
use crate::models::reading::non_empty;
use crate::models::telemetry::DeviceMessage;
use crate::models::{NewReading, TemperatureReading};

/// Turns one device message into a reading insert.
///
/// Messages that cannot become a reading (unparseable, no shipment, no
/// temperature) are logged and skipped with `Ok(None)`. Backend failures are
/// returned to the caller.
pub async fn process_message(
    backend: &dyn Backend,
    payload: &[u8],
) -> MonitorResult<Option<TemperatureReading>> {
    let message: DeviceMessage = match serde_json::from_slice(payload) {
        Ok(m) => m,
        Err(e) => {
            warn!("Failed to parse telemetry message: {}", e);
            return Ok(None);
        }
    };

    let shipment_id = match message.data.shipment_id.as_deref().map(|s| Uuid::parse_str(s.trim())) {
        Some(Ok(id)) => id,
        Some(Err(_)) | None => {
            warn!(
                "Telemetry message {:?} has no valid SHIPMENT_ID, skipping",
                message.uuid
            );
            return Ok(None);
        }
    };

    let Some(temperature) = message.data.temperature else {
        warn!("Telemetry message for shipment {} missing TEMPERATURE, skipping", shipment_id);
        return Ok(None);
    };

    let recorded_at = match message.data.recorded_at.as_deref() {
        None => None,
        Some(raw) => match parse_recorded_at(raw) {
            Some(ts) => Some(ts),
            None => {
                warn!("Invalid RECORDED_AT: '{}'", raw);
                return Ok(None);
            }
        },
    };

    let device_id = non_empty(message.get_device_id().cloned());
    let reading = NewReading {
        shipment_id,
        temperature,
        recorded_at,
        device_id,
        location: non_empty(message.data.location.clone()),
    };

    let inserted = backend.insert_reading(reading).await?;
    info!(
        "Stored device reading {} for shipment {} from {:?}",
        inserted.temperature, inserted.shipment_id, inserted.device_id
    );
    Ok(Some(inserted))
}

/// Accepts RFC 3339 or the gateway's naive `YYYY-MM-DD HH:MM:SS`, taken as UTC.
fn parse_recorded_at(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .map(|naive| naive.and_utc())
}
