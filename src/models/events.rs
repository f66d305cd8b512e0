use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::MonitorResult;
use crate::models::reading::TemperatureReading;
use crate::models::shipment::Shipment;

pub const READINGS_TABLE: &str = "temperature_logs";
pub const SHIPMENTS_TABLE: &str = "shipments";

/// A typed change pushed by the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    ReadingInserted(TemperatureReading),
    ShipmentUpdated {
        old: Option<Shipment>,
        new: Shipment,
    },
}

impl ChangeEvent {
    pub fn shipment_id(&self) -> Uuid {
        match self {
            ChangeEvent::ReadingInserted(reading) => reading.shipment_id,
            ChangeEvent::ShipmentUpdated { new, .. } => new.id,
        }
    }

    /// Decodes a notification payload. Events that no subscriber cares about
    /// (a reading update, a shipment insert) decode to `None`.
    pub fn from_payload(payload: &str) -> MonitorResult<Option<ChangeEvent>> {
        let envelope: ChangeEnvelope = serde_json::from_str(payload)?;

        let event = match (envelope.table.as_str(), envelope.op.as_str()) {
            (READINGS_TABLE, "INSERT") => {
                let reading: TemperatureReading = serde_json::from_value(envelope.record)?;
                Some(ChangeEvent::ReadingInserted(reading))
            }
            (SHIPMENTS_TABLE, "UPDATE") => {
                let new: Shipment = serde_json::from_value(envelope.record)?;
                let old = match envelope.old_record {
                    Some(Value::Null) | None => None,
                    Some(value) => Some(serde_json::from_value(value)?),
                };
                Some(ChangeEvent::ShipmentUpdated { old, new })
            }
            _ => None,
        };

        Ok(event)
    }
}

#[derive(Debug, Deserialize)]
struct ChangeEnvelope {
    table: String,
    #[serde(rename = "type")]
    op: String,
    record: Value,
    #[serde(default)]
    old_record: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::shipment::ShipmentStatus;

    #[test]
    fn test_reading_insert_payload() {
        let payload = r#"
        {
            "table": "temperature_logs",
            "type": "INSERT",
            "record": {
                "id": "6f1c5c1e-6c6b-4b7a-9a39-3c1f4f9d2b10",
                "shipment_id": "0b7f9a5e-2a53-4c56-8f0e-0e8d6f1b9a11",
                "temperature": 7.4,
                "recorded_at": "2025-05-05T10:15:00.123456+00:00",
                "device_id": "GT-45",
                "location": null,
                "is_alert": true
            },
            "old_record": null
        }
        "#;

        let event = ChangeEvent::from_payload(payload).unwrap().unwrap();
        match event {
            ChangeEvent::ReadingInserted(reading) => {
                assert_eq!(reading.temperature, 7.4);
                assert!(reading.is_alert);
                assert_eq!(reading.device_id.as_deref(), Some("GT-45"));
                assert_eq!(reading.location, None);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_shipment_update_payload() {
        let payload = r#"
        {
            "table": "shipments",
            "type": "UPDATE",
            "record": {
                "id": "0b7f9a5e-2a53-4c56-8f0e-0e8d6f1b9a11",
                "shipment_id": "SH-a1b2c",
                "destination": "Medan Distribution",
                "product": "Dairy Products",
                "target_temperature": 2,
                "current_temperature": 6.5,
                "status": "In Transit",
                "departure_date": "2025-05-04T06:00:00+00:00",
                "estimated_arrival": null,
                "user_id": "00000000-0000-0000-0000-000000000000",
                "created_at": "2025-05-04T05:00:00+00:00",
                "updated_at": "2025-05-05T10:15:00+00:00"
            },
            "old_record": {
                "id": "0b7f9a5e-2a53-4c56-8f0e-0e8d6f1b9a11",
                "shipment_id": "SH-a1b2c",
                "destination": "Medan Distribution",
                "product": "Dairy Products",
                "target_temperature": 2,
                "current_temperature": null,
                "status": "In Transit",
                "departure_date": "2025-05-04T06:00:00+00:00",
                "estimated_arrival": null,
                "user_id": "00000000-0000-0000-0000-000000000000",
                "created_at": "2025-05-04T05:00:00+00:00",
                "updated_at": "2025-05-04T05:00:00+00:00"
            }
        }
        "#;

        let event = ChangeEvent::from_payload(payload).unwrap().unwrap();
        match event {
            ChangeEvent::ShipmentUpdated { old, new } => {
                assert_eq!(new.status, ShipmentStatus::InTransit);
                assert_eq!(new.current_temperature, Some(6.5));
                assert_eq!(old.unwrap().current_temperature, None);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_ignored_and_malformed_payloads() {
        let shipment_insert = r#"{"table":"shipments","type":"INSERT","record":{}}"#;
        assert!(ChangeEvent::from_payload(shipment_insert).unwrap().is_none());

        assert!(ChangeEvent::from_payload("not json").is_err());
    }
}
