use uuid::Uuid;

use crate::models::TemperatureReading;
use crate::rules::temperature::{chart_series, classify, ChartPoint, TemperatureStatus};

/// The reading history of one open shipment view, newest first.
#[derive(Debug, Clone)]
pub struct ReadingsView {
    shipment_id: Uuid,
    target_temperature: f64,
    readings: Vec<TemperatureReading>,
}

impl ReadingsView {
    /// `readings` must already be ordered newest first, as the backend returns them.
    pub fn open(shipment_id: Uuid, target_temperature: f64, readings: Vec<TemperatureReading>) -> Self {
        Self {
            shipment_id,
            target_temperature,
            readings,
        }
    }

    pub fn shipment_id(&self) -> Uuid {
        self.shipment_id
    }

    pub fn target_temperature(&self) -> f64 {
        self.target_temperature
    }

    pub fn set_target_temperature(&mut self, target: f64) {
        self.target_temperature = target;
    }

    /// Places a pushed reading by `recorded_at`, so a backdated reading lands
    /// behind newer ones. Readings for other shipments and readings already
    /// present (same id) are ignored.
    pub fn insert(&mut self, reading: TemperatureReading) -> bool {
        if reading.shipment_id != self.shipment_id || self.readings.iter().any(|r| r.id == reading.id) {
            return false;
        }
        // ties go in front: the later arrival is the newer reading
        let at = self
            .readings
            .partition_point(|r| r.recorded_at > reading.recorded_at);
        self.readings.insert(at, reading);
        true
    }

    pub fn readings(&self) -> &[TemperatureReading] {
        &self.readings
    }

    pub fn latest(&self) -> Option<&TemperatureReading> {
        self.readings.first()
    }

    pub fn latest_status(&self) -> TemperatureStatus {
        classify(self.latest().map(|r| r.temperature), self.target_temperature)
    }

    pub fn chart(&self) -> Vec<ChartPoint> {
        chart_series(&self.readings)
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn reading(shipment_id: Uuid, temperature: f64) -> TemperatureReading {
        TemperatureReading {
            id: Uuid::new_v4(),
            shipment_id,
            temperature,
            recorded_at: Utc::now(),
            device_id: None,
            location: None,
            is_alert: false,
        }
    }

    fn reading_at(shipment_id: Uuid, temperature: f64, hour: u32) -> TemperatureReading {
        TemperatureReading {
            recorded_at: Utc.with_ymd_and_hms(2025, 5, 5, hour, 0, 0).unwrap(),
            ..reading(shipment_id, temperature)
        }
    }

    #[test]
    fn test_insert_keeps_newest_first() {
        let id = Uuid::new_v4();
        let mut view = ReadingsView::open(id, 2.0, vec![reading(id, 2.1)]);
        assert_eq!(view.latest_status(), TemperatureStatus::Normal);

        let mut pushed = reading(id, 6.5);
        pushed.recorded_at = view.latest().unwrap().recorded_at + Duration::seconds(1);
        assert!(view.insert(pushed.clone()));
        assert!(!view.insert(pushed));
        assert!(!view.insert(reading(Uuid::new_v4(), 1.0)));

        assert_eq!(view.len(), 2);
        assert_eq!(view.latest().unwrap().temperature, 6.5);
        assert_eq!(view.latest_status(), TemperatureStatus::Critical);
        assert_eq!(view.chart().last().unwrap().temperature, 6.5);
    }

    #[test]
    fn test_backdated_reading_goes_behind_newer_ones() {
        let id = Uuid::new_v4();
        let mut view = ReadingsView::open(id, 2.0, vec![reading_at(id, 2.1, 10)]);

        assert!(view.insert(reading_at(id, 9.0, 9)));
        assert!(view.insert(reading_at(id, 2.4, 11)));
        assert!(view.insert(reading_at(id, 5.0, 8)));

        let temps: Vec<f64> = view.readings().iter().map(|r| r.temperature).collect();
        assert_eq!(temps, vec![2.4, 2.1, 9.0, 5.0]);
        assert_eq!(view.latest().unwrap().temperature, 2.4);
        assert_eq!(view.latest_status(), TemperatureStatus::Normal);

        let chart: Vec<f64> = view.chart().iter().map(|p| p.temperature).collect();
        assert_eq!(chart, vec![5.0, 9.0, 2.1, 2.4]);
    }

    #[test]
    fn test_empty_view_is_unknown() {
        let view = ReadingsView::open(Uuid::new_v4(), -18.0, Vec::new());
        assert!(view.is_empty());
        assert_eq!(view.latest_status(), TemperatureStatus::Unknown);
    }
}
