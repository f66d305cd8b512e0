use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::backend::Backend;
use crate::error::{MonitorError, MonitorResult};
use crate::models::shipment::generate_shipment_code;
use crate::models::{
    ChangeEvent, NewReading, NewShipment, Shipment, ShipmentStatus, TemperatureReading,
};
use crate::realtime::{ChangeFeed, Subscription, Topic, SUBSCRIPTION_BUFFER};
use crate::rules::temperature::exceeds_threshold;
use crate::session::Session;

#[derive(Default)]
struct MemoryState {
    shipments: Vec<Shipment>,
    readings: Vec<TemperatureReading>,
}

/// In-process backend with the same semantics as the Postgres one, including
/// change notifications for reading inserts and shipment updates.
pub struct MemoryBackend {
    state: RwLock<MemoryState>,
    changes: broadcast::Sender<ChangeEvent>,
    alert_threshold: f64,
}

impl MemoryBackend {
    pub fn new(alert_threshold: f64) -> Self {
        let (changes, _) = broadcast::channel(SUBSCRIPTION_BUFFER);
        Self {
            state: RwLock::new(MemoryState::default()),
            changes,
            alert_threshold,
        }
    }

    /// Seeds the dashboard's sample shipments, owned by `session`.
    pub async fn seed_demo_shipments(&self, session: &Session) -> Vec<Shipment> {
        let samples = [
            ("Jakarta Cold Storage", "Frozen Seafood", -18.0, -18.2, ShipmentStatus::InTransit),
            ("Medan Distribution", "Dairy Products", 2.0, 2.1, ShipmentStatus::Delivered),
            ("Surabaya Market", "Vaccines", 3.0, 3.2, ShipmentStatus::InTransit),
            ("Makassar Medical", "Pharmaceuticals", 2.0, 2.9, ShipmentStatus::Delayed),
            ("Batam Cold Chain", "Fresh Produce", 3.0, 3.5, ShipmentStatus::Delivered),
        ];

        let base = Utc::now();
        let mut state = self.state.write().await;
        let mut seeded = Vec::with_capacity(samples.len());
        for (i, (destination, product, target, current, status)) in samples.into_iter().enumerate() {
            let created_at = base + Duration::seconds(i as i64);
            let shipment = Shipment {
                id: Uuid::new_v4(),
                shipment_id: generate_shipment_code(),
                destination: destination.to_string(),
                product: product.to_string(),
                target_temperature: target,
                current_temperature: Some(current),
                status,
                departure_date: created_at,
                estimated_arrival: None,
                user_id: session.user_id,
                created_at,
                updated_at: created_at,
            };
            state.shipments.push(shipment.clone());
            seeded.push(shipment);
        }
        info!("Seeded {} demo shipments", seeded.len());
        seeded
    }

    fn publish(&self, event: ChangeEvent) {
        // no receivers is not an error
        let _ = self.changes.send(event);
    }

    fn apply_temperature(
        state: &mut MemoryState,
        shipment_id: Uuid,
        temperature: Option<f64>,
        now: DateTime<Utc>,
    ) -> MonitorResult<(Shipment, Shipment)> {
        let shipment = state
            .shipments
            .iter_mut()
            .find(|s| s.id == shipment_id)
            .ok_or(MonitorError::ShipmentNotFound(shipment_id))?;
        let old = shipment.clone();
        shipment.current_temperature = temperature;
        shipment.updated_at = now;
        Ok((old, shipment.clone()))
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn fetch_shipments(&self, limit: Option<i64>) -> MonitorResult<Vec<Shipment>> {
        let state = self.state.read().await;
        let mut shipments = state.shipments.clone();
        shipments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = limit {
            shipments.truncate(limit.max(0) as usize);
        }
        Ok(shipments)
    }

    async fn fetch_readings(&self, shipment_id: Uuid) -> MonitorResult<Vec<TemperatureReading>> {
        let state = self.state.read().await;
        let mut readings: Vec<TemperatureReading> = state
            .readings
            .iter()
            .filter(|r| r.shipment_id == shipment_id)
            .cloned()
            .collect();
        readings.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        Ok(readings)
    }

    async fn fetch_latest_reading(
        &self,
        shipment_id: Uuid,
    ) -> MonitorResult<Option<TemperatureReading>> {
        Ok(self.fetch_readings(shipment_id).await?.into_iter().next())
    }

    async fn insert_shipment(
        &self,
        session: &Session,
        shipment: NewShipment,
    ) -> MonitorResult<Shipment> {
        shipment.validate()?;

        let now = Utc::now();
        let created = Shipment {
            id: Uuid::new_v4(),
            shipment_id: generate_shipment_code(),
            destination: shipment.destination,
            product: shipment.product,
            target_temperature: shipment.target_temperature,
            current_temperature: None,
            status: shipment.status,
            departure_date: shipment.departure_date,
            estimated_arrival: shipment.estimated_arrival,
            user_id: session.user_id,
            created_at: now,
            updated_at: now,
        };

        self.state.write().await.shipments.push(created.clone());
        info!("Created shipment {} to {}", created.shipment_id, created.destination);
        Ok(created)
    }

    async fn insert_reading(&self, reading: NewReading) -> MonitorResult<TemperatureReading> {
        reading.validate()?;

        let now = Utc::now();
        let (inserted, snapshot) = {
            let mut state = self.state.write().await;
            let target = state
                .shipments
                .iter()
                .find(|s| s.id == reading.shipment_id)
                .map(|s| s.target_temperature)
                .ok_or(MonitorError::ShipmentNotFound(reading.shipment_id))?;

            let inserted = TemperatureReading {
                id: Uuid::new_v4(),
                shipment_id: reading.shipment_id,
                temperature: reading.temperature,
                recorded_at: reading.recorded_at.unwrap_or(now),
                device_id: reading.device_id,
                location: reading.location,
                is_alert: exceeds_threshold(Some(reading.temperature), target, self.alert_threshold),
            };
            let superseded = state
                .readings
                .iter()
                .any(|r| r.shipment_id == inserted.shipment_id && r.recorded_at > inserted.recorded_at);
            state.readings.push(inserted.clone());

            let snapshot = if superseded {
                None
            } else {
                Some(Self::apply_temperature(
                    &mut state,
                    reading.shipment_id,
                    Some(reading.temperature),
                    now,
                )?)
            };
            (inserted, snapshot)
        };

        self.publish(ChangeEvent::ReadingInserted(inserted.clone()));
        if let Some((old, new)) = snapshot {
            self.publish(ChangeEvent::ShipmentUpdated { old: Some(old), new });
        }
        Ok(inserted)
    }

    async fn update_current_temperature(
        &self,
        shipment_id: Uuid,
        temperature: Option<f64>,
    ) -> MonitorResult<()> {
        let (old, new) = {
            let mut state = self.state.write().await;
            Self::apply_temperature(&mut state, shipment_id, temperature, Utc::now())?
        };
        self.publish(ChangeEvent::ShipmentUpdated { old: Some(old), new });
        Ok(())
    }
}

#[async_trait]
impl ChangeFeed for MemoryBackend {
    async fn subscribe(&self, topic: Topic) -> MonitorResult<Subscription> {
        let mut changes = self.changes.subscribe();
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);

        let task = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(event) => {
                        if topic.accepts(&event) && tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Subscription {:?} lagged, {} events skipped", topic, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(Subscription::new(topic, rx, task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::temperature::ALERT_THRESHOLD;
    use chrono::TimeZone;

    fn new_shipment(target: f64) -> NewShipment {
        NewShipment {
            destination: "Makassar Medical".to_string(),
            product: "Pharmaceuticals".to_string(),
            target_temperature: target,
            departure_date: Utc.with_ymd_and_hms(2025, 5, 5, 8, 0, 0).unwrap(),
            estimated_arrival: None,
            status: ShipmentStatus::Scheduled,
        }
    }

    #[tokio::test]
    async fn test_insert_reading_derives_alert_and_updates_snapshot() {
        let backend = MemoryBackend::new(ALERT_THRESHOLD);
        let session = Session::new(Uuid::new_v4());
        let shipment = backend.insert_shipment(&session, new_shipment(2.0)).await.unwrap();
        assert_eq!(shipment.current_temperature, None);
        assert_eq!(shipment.user_id, session.user_id);

        let ok = backend.insert_reading(NewReading::new(shipment.id, 2.9)).await.unwrap();
        assert!(!ok.is_alert);
        let hot = backend.insert_reading(NewReading::new(shipment.id, 6.0)).await.unwrap();
        assert!(hot.is_alert);

        let shipments = backend.fetch_shipments(None).await.unwrap();
        assert_eq!(shipments[0].current_temperature, Some(6.0));

        let latest = backend.fetch_latest_reading(shipment.id).await.unwrap().unwrap();
        assert_eq!(latest.id, hot.id);
    }

    #[tokio::test]
    async fn test_readings_newest_first_and_limit() {
        let backend = MemoryBackend::new(ALERT_THRESHOLD);
        let session = Session::new(Uuid::nil());
        let seeded = backend.seed_demo_shipments(&session).await;

        let recent = backend.fetch_shipments(Some(3)).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].id, seeded[4].id);

        let id = seeded[0].id;
        let t0 = Utc.with_ymd_and_hms(2025, 5, 5, 9, 0, 0).unwrap();
        for (minutes, temp) in [(0, -18.0), (20, -17.5), (10, -18.4)] {
            let mut reading = NewReading::new(id, temp);
            reading.recorded_at = Some(t0 + Duration::minutes(minutes));
            backend.insert_reading(reading).await.unwrap();
        }
        let temps: Vec<f64> = backend
            .fetch_readings(id)
            .await
            .unwrap()
            .iter()
            .map(|r| r.temperature)
            .collect();
        assert_eq!(temps, vec![-17.5, -18.4, -18.0]);
    }

    #[tokio::test]
    async fn test_backdated_reading_keeps_snapshot() {
        let backend = MemoryBackend::new(ALERT_THRESHOLD);
        let shipment = backend
            .insert_shipment(&Session::new(Uuid::nil()), new_shipment(2.0))
            .await
            .unwrap();
        let mut updates = backend.subscribe_shipment_updates().await.unwrap();

        let ten = Utc.with_ymd_and_hms(2025, 5, 5, 10, 0, 0).unwrap();
        let mut current = NewReading::new(shipment.id, 2.1);
        current.recorded_at = Some(ten);
        backend.insert_reading(current).await.unwrap();

        let mut late = NewReading::new(shipment.id, 9.0);
        late.recorded_at = Some(ten - Duration::hours(1));
        let late = backend.insert_reading(late).await.unwrap();
        assert!(late.is_alert);

        let stored = backend.fetch_shipments(None).await.unwrap();
        assert_eq!(stored[0].current_temperature, Some(2.1));
        let latest = backend.fetch_latest_reading(shipment.id).await.unwrap().unwrap();
        assert_eq!(latest.recorded_at, ten);

        // only the in-order reading moved the snapshot
        let first = updates.recv().await.unwrap();
        assert!(matches!(first, ChangeEvent::ShipmentUpdated { ref new, .. } if new.current_temperature == Some(2.1)));
        backend.update_current_temperature(shipment.id, Some(2.2)).await.unwrap();
        match updates.recv().await.unwrap() {
            ChangeEvent::ShipmentUpdated { old, .. } => {
                assert_eq!(old.unwrap().current_temperature, Some(2.1))
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_shipment_and_invalid_input() {
        let backend = MemoryBackend::new(ALERT_THRESHOLD);
        let missing = Uuid::new_v4();

        let err = backend.insert_reading(NewReading::new(missing, 4.0)).await.unwrap_err();
        assert!(matches!(err, MonitorError::ShipmentNotFound(id) if id == missing));

        let err = backend.insert_reading(NewReading::new(missing, 140.0)).await.unwrap_err();
        assert!(matches!(err, MonitorError::Validation(_)));

        let err = backend.update_current_temperature(missing, Some(1.0)).await.unwrap_err();
        assert!(matches!(err, MonitorError::ShipmentNotFound(_)));
    }

    #[tokio::test]
    async fn test_subscriptions_receive_filtered_changes() {
        let backend = MemoryBackend::new(ALERT_THRESHOLD);
        let session = Session::new(Uuid::nil());
        let watched = backend.insert_shipment(&session, new_shipment(2.0)).await.unwrap();
        let other = backend.insert_shipment(&session, new_shipment(2.0)).await.unwrap();

        let mut readings = backend.subscribe_readings(Some(watched.id)).await.unwrap();
        let mut updates = backend.subscribe_shipment_updates().await.unwrap();

        backend.insert_reading(NewReading::new(other.id, 3.0)).await.unwrap();
        backend.insert_reading(NewReading::new(watched.id, 7.0)).await.unwrap();

        match readings.recv().await.unwrap() {
            ChangeEvent::ReadingInserted(r) => assert_eq!(r.shipment_id, watched.id),
            other => panic!("unexpected event: {:?}", other),
        }

        let first = updates.recv().await.unwrap();
        let second = updates.recv().await.unwrap();
        assert_eq!(first.shipment_id(), other.id);
        match second {
            ChangeEvent::ShipmentUpdated { old, new } => {
                assert_eq!(old.unwrap().current_temperature, None);
                assert_eq!(new.current_temperature, Some(7.0));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
