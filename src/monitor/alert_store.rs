use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::Shipment;
use crate::rules::temperature::format_temperature;

/// One shipment currently outside its alert threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertEntry {
    pub shipment_id: Uuid,
    pub shipment_code: Option<String>,
    pub current_temperature: Option<f64>,
    pub target_temperature: Option<f64>,
    pub since: DateTime<Utc>,
}

impl AlertEntry {
    pub fn from_shipment(shipment: &Shipment, since: DateTime<Utc>) -> Self {
        Self {
            shipment_id: shipment.id,
            shipment_code: Some(shipment.shipment_id.clone()),
            current_temperature: shipment.current_temperature,
            target_temperature: Some(shipment.target_temperature),
            since,
        }
    }

    pub fn label(&self) -> String {
        self.shipment_code
            .clone()
            .unwrap_or_else(|| self.shipment_id.to_string())
    }

    pub fn describe(&self) -> String {
        match self.target_temperature {
            Some(target) => format!(
                "Shipment {} temperature is {}, which is outside the target of {}",
                self.label(),
                format_temperature(self.current_temperature),
                format_temperature(Some(target)),
            ),
            None => format!(
                "Shipment {} temperature is {}",
                self.label(),
                format_temperature(self.current_temperature)
            ),
        }
    }
}

/// Shipments currently alerting, keyed by shipment id, in the order they
/// started alerting.
#[derive(Debug, Clone, Default)]
pub struct ActiveAlerts {
    entries: Vec<AlertEntry>,
}

impl ActiveAlerts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when the shipment was not alerting before. An existing
    /// entry keeps its position and `since`, only its temperatures refresh.
    pub fn insert(&mut self, entry: AlertEntry) -> bool {
        match self.entries.iter_mut().find(|e| e.shipment_id == entry.shipment_id) {
            Some(existing) => {
                existing.current_temperature = entry.current_temperature;
                if entry.target_temperature.is_some() {
                    existing.target_temperature = entry.target_temperature;
                }
                if entry.shipment_code.is_some() {
                    existing.shipment_code = entry.shipment_code;
                }
                false
            }
            None => {
                self.entries.push(entry);
                true
            }
        }
    }

    pub fn remove(&mut self, shipment_id: Uuid) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.shipment_id != shipment_id);
        self.entries.len() != before
    }

    pub fn contains(&self, shipment_id: Uuid) -> bool {
        self.entries.iter().any(|e| e.shipment_id == shipment_id)
    }

    pub fn get(&self, shipment_id: Uuid) -> Option<&AlertEntry> {
        self.entries.iter().find(|e| e.shipment_id == shipment_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AlertEntry> {
        self.entries.iter()
    }

    pub fn snapshot(&self) -> Vec<AlertEntry> {
        self.entries.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: Uuid, current: f64) -> AlertEntry {
        AlertEntry {
            shipment_id: id,
            shipment_code: Some("SH-a1b2c".to_string()),
            current_temperature: Some(current),
            target_temperature: Some(2.0),
            since: Utc::now(),
        }
    }

    #[test]
    fn test_insert_is_idempotent() {
        let mut alerts = ActiveAlerts::new();
        let id = Uuid::new_v4();

        assert!(alerts.insert(entry(id, 6.0)));
        assert!(!alerts.insert(entry(id, 7.5)));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts.get(id).unwrap().current_temperature, Some(7.5));
    }

    #[test]
    fn test_remove_and_order() {
        let mut alerts = ActiveAlerts::new();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        alerts.insert(entry(a, 6.0));
        alerts.insert(entry(b, 6.0));
        alerts.insert(entry(c, 6.0));

        assert!(alerts.remove(b));
        assert!(!alerts.remove(b));
        let order: Vec<Uuid> = alerts.iter().map(|e| e.shipment_id).collect();
        assert_eq!(order, vec![a, c]);
    }

    #[test]
    fn test_description_uses_one_decimal() {
        let e = entry(Uuid::new_v4(), 6.04);
        assert_eq!(
            e.describe(),
            "Shipment SH-a1b2c temperature is 6.0°C, which is outside the target of 2.0°C"
        );
    }
}
