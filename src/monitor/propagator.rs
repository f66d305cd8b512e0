use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use std::collections::HashMap;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{ChangeEvent, Shipment, TemperatureReading};
use crate::monitor::alert_store::{ActiveAlerts, AlertEntry};
use crate::monitor::notification::{Notification, NotificationKind, Notifier};
use crate::monitor::readings_view::ReadingsView;
use crate::rules::temperature::{exceeds_threshold, format_temperature};

/// Requests from the view layer to the running propagator.
#[derive(Debug)]
pub enum Command {
    /// Hide an alert. Not persisted: a later out-of-range event re-adds it.
    Dismiss(Uuid),
    /// Replace the shipment cache after a refetch and re-evaluate membership.
    Refresh(Vec<Shipment>),
    OpenView(ReadingsView),
    CloseView,
}

/// Handles held by the view layer while the propagator runs.
pub struct MonitorHandle {
    pub commands: mpsc::Sender<Command>,
    pub alerts: watch::Receiver<Vec<AlertEntry>>,
    pub task: JoinHandle<()>,
}

/// Applies pushed change events to the active-alert set and the open
/// readings view. It is the only writer of both.
pub struct AlertPropagator {
    alert_threshold: f64,
    shipments: HashMap<Uuid, Shipment>,
    // recorded_at of the newest reading seen per shipment
    latest_reading_at: HashMap<Uuid, DateTime<Utc>>,
    alerts: ActiveAlerts,
    view: Option<ReadingsView>,
}

impl AlertPropagator {
    pub fn new(alert_threshold: f64) -> Self {
        Self {
            alert_threshold,
            shipments: HashMap::new(),
            latest_reading_at: HashMap::new(),
            alerts: ActiveAlerts::new(),
            view: None,
        }
    }

    pub fn alerts(&self) -> &ActiveAlerts {
        &self.alerts
    }

    pub fn view(&self) -> Option<&ReadingsView> {
        self.view.as_ref()
    }

    pub fn shipment(&self, id: Uuid) -> Option<&Shipment> {
        self.shipments.get(&id)
    }

    fn is_alerting(&self, current: Option<f64>, target: f64) -> bool {
        exceeds_threshold(current, target, self.alert_threshold)
    }

    /// Loads fetched shipments and re-evaluates membership without
    /// notifying. A previously dismissed alert can come back here.
    pub fn load_shipments(&mut self, shipments: Vec<Shipment>) {
        let now = Utc::now();
        for shipment in shipments {
            if self.is_alerting(shipment.current_temperature, shipment.target_temperature) {
                self.alerts.insert(AlertEntry::from_shipment(&shipment, now));
            } else {
                self.alerts.remove(shipment.id);
            }
            self.shipments.insert(shipment.id, shipment);
        }
        debug!(
            "Shipment cache holds {} shipments, {} alerting",
            self.shipments.len(),
            self.alerts.len()
        );
    }

    pub fn open_view(&mut self, view: ReadingsView) {
        info!("Opened readings view for shipment {}", view.shipment_id());
        if let Some(latest) = view.latest() {
            self.note_reading_at(latest.shipment_id, latest.recorded_at);
        }
        self.view = Some(view);
    }

    pub fn close_view(&mut self) {
        self.view = None;
    }

    pub fn dismiss(&mut self, shipment_id: Uuid) -> bool {
        let removed = self.alerts.remove(shipment_id);
        if removed {
            info!("Alert for shipment {} dismissed", shipment_id);
        }
        removed
    }

    pub fn apply(&mut self, command: Command) {
        match command {
            Command::Dismiss(id) => {
                self.dismiss(id);
            }
            Command::Refresh(shipments) => self.load_shipments(shipments),
            Command::OpenView(view) => self.open_view(view),
            Command::CloseView => self.close_view(),
        }
    }

    /// Applies one event and returns the notifications it raises.
    pub fn handle(&mut self, event: ChangeEvent) -> Vec<Notification> {
        match event {
            ChangeEvent::ReadingInserted(reading) => self.on_reading(reading),
            ChangeEvent::ShipmentUpdated { old, new } => self.on_shipment_update(old, new),
        }
    }

    /// Records a reading time and returns whether it is the newest known for
    /// the shipment. Equal timestamps count as newer.
    fn note_reading_at(&mut self, shipment_id: Uuid, recorded_at: DateTime<Utc>) -> bool {
        match self.latest_reading_at.get(&shipment_id) {
            Some(latest) if *latest > recorded_at => false,
            _ => {
                self.latest_reading_at.insert(shipment_id, recorded_at);
                true
            }
        }
    }

    fn on_reading(&mut self, reading: TemperatureReading) -> Vec<Notification> {
        let mut notifications = Vec::new();

        if let Some(view) = self.view.as_mut() {
            view.insert(reading.clone());
        }

        if self.note_reading_at(reading.shipment_id, reading.recorded_at) {
            self.apply_latest_reading(&reading);
        } else {
            debug!(
                "Reading {} for shipment {} is older than the latest known, membership unchanged",
                reading.id, reading.shipment_id
            );
        }

        if reading.is_alert {
            let label = self
                .shipments
                .get(&reading.shipment_id)
                .map(|s| s.shipment_id.clone())
                .unwrap_or_else(|| reading.shipment_id.to_string());
            notifications.push(
                Notification::new(
                    NotificationKind::ReadingAlert,
                    "Temperature Alert!",
                    format!(
                        "Temperature reading of {} exceeds threshold for shipment {}",
                        format_temperature(Some(reading.temperature)),
                        label
                    ),
                )
                .for_shipment(reading.shipment_id),
            );
        }

        notifications
    }

    /// Updates the cached snapshot and alert membership from the newest reading.
    fn apply_latest_reading(&mut self, reading: &TemperatureReading) {
        let alerting = match self.shipments.get_mut(&reading.shipment_id) {
            Some(shipment) => {
                shipment.current_temperature = Some(reading.temperature);
                exceeds_threshold(
                    Some(reading.temperature),
                    shipment.target_temperature,
                    self.alert_threshold,
                )
            }
            // no target known, trust the backend's flag
            None => reading.is_alert,
        };

        if alerting {
            let entry = match self.shipments.get(&reading.shipment_id) {
                Some(shipment) => AlertEntry::from_shipment(shipment, reading.recorded_at),
                None => AlertEntry {
                    shipment_id: reading.shipment_id,
                    shipment_code: None,
                    current_temperature: Some(reading.temperature),
                    target_temperature: None,
                    since: reading.recorded_at,
                },
            };
            self.alerts.insert(entry);
        } else {
            self.alerts.remove(reading.shipment_id);
        }
    }

    fn on_shipment_update(&mut self, old: Option<Shipment>, new: Shipment) -> Vec<Notification> {
        let temperature_changed = old
            .as_ref()
            .map(|o| o.current_temperature != new.current_temperature)
            .unwrap_or(true);

        if let Some(view) = self.view.as_mut() {
            if view.shipment_id() == new.id {
                view.set_target_temperature(new.target_temperature);
            }
        }

        let shipment_id = new.id;
        self.shipments.insert(shipment_id, new);

        if !temperature_changed {
            return Vec::new();
        }

        let Some(shipment) = self.shipments.get(&shipment_id) else {
            return Vec::new();
        };

        if !self.is_alerting(shipment.current_temperature, shipment.target_temperature) {
            if self.alerts.remove(shipment_id) {
                info!("Shipment {} back within range", shipment.shipment_id);
            }
            return Vec::new();
        }

        let entry = AlertEntry::from_shipment(shipment, shipment.updated_at);
        if !self.alerts.insert(entry) {
            return Vec::new();
        }

        vec![Notification::new(
            NotificationKind::ShipmentAlert,
            "Temperature Alert",
            format!("Shipment {} temperature is out of range!", shipment.shipment_id),
        )
        .for_shipment(shipment_id)]
    }

    /// Runs until the event stream ends, draining commands in between events.
    pub async fn run<S>(
        mut self,
        mut events: S,
        mut commands: mpsc::Receiver<Command>,
        notifier: Notifier,
        alerts: watch::Sender<Vec<AlertEntry>>,
    ) where
        S: Stream<Item = ChangeEvent> + Unpin,
    {
        alerts.send_replace(self.alerts.snapshot());

        loop {
            tokio::select! {
                event = events.next() => {
                    let Some(event) = event else {
                        info!("Change feed closed, stopping propagator");
                        break;
                    };
                    for notification in self.handle(event) {
                        notifier.notify(notification).await;
                    }
                }
                Some(command) = commands.recv() => {
                    self.apply(command);
                }
            }
            let snapshot = self.alerts.snapshot();
            alerts.send_if_modified(|current| {
                if *current == snapshot {
                    false
                } else {
                    *current = snapshot;
                    true
                }
            });
        }
    }

    pub fn spawn<S>(self, events: S, notifier: Notifier) -> MonitorHandle
    where
        S: Stream<Item = ChangeEvent> + Unpin + Send + 'static,
    {
        let (commands_tx, commands_rx) = mpsc::channel(16);
        let (alerts_tx, alerts_rx) = watch::channel(Vec::new());
        let task = tokio::spawn(self.run(events, commands_rx, notifier, alerts_tx));

        MonitorHandle {
            commands: commands_tx,
            alerts: alerts_rx,
            task,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ShipmentStatus;
    use crate::rules::temperature::ALERT_THRESHOLD;
    use chrono::TimeZone;

    fn shipment(target: f64, current: Option<f64>) -> Shipment {
        let ts = Utc.with_ymd_and_hms(2025, 5, 5, 8, 0, 0).unwrap();
        Shipment {
            id: Uuid::new_v4(),
            shipment_id: "SH-k3v9q".to_string(),
            destination: "Medan Distribution".to_string(),
            product: "Dairy Products".to_string(),
            target_temperature: target,
            current_temperature: current,
            status: ShipmentStatus::InTransit,
            departure_date: ts,
            estimated_arrival: None,
            user_id: Uuid::nil(),
            created_at: ts,
            updated_at: ts,
        }
    }

    fn reading(shipment_id: Uuid, temperature: f64, is_alert: bool) -> TemperatureReading {
        TemperatureReading {
            id: Uuid::new_v4(),
            shipment_id,
            temperature,
            recorded_at: Utc::now(),
            device_id: Some("GT-45".to_string()),
            location: None,
            is_alert,
        }
    }

    fn update(old: &Shipment, current: Option<f64>) -> ChangeEvent {
        let mut new = old.clone();
        new.current_temperature = current;
        ChangeEvent::ShipmentUpdated {
            old: Some(old.clone()),
            new,
        }
    }

    #[test]
    fn test_flagged_reading_adds_once_and_notifies_once() {
        let mut propagator = AlertPropagator::new(ALERT_THRESHOLD);
        let s = shipment(2.0, Some(2.1));
        propagator.load_shipments(vec![s.clone()]);
        assert!(propagator.alerts().is_empty());

        let notifications = propagator.handle(ChangeEvent::ReadingInserted(reading(s.id, 7.2, true)));

        assert_eq!(propagator.alerts().len(), 1);
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].kind, NotificationKind::ReadingAlert);
        assert_eq!(
            notifications[0].description,
            "Temperature reading of 7.2°C exceeds threshold for shipment SH-k3v9q"
        );
        assert_eq!(propagator.shipment(s.id).unwrap().current_temperature, Some(7.2));
    }

    #[test]
    fn test_reading_for_uncached_shipment_uses_flag() {
        let mut propagator = AlertPropagator::new(ALERT_THRESHOLD);
        let id = Uuid::new_v4();

        propagator.handle(ChangeEvent::ReadingInserted(reading(id, 9.0, true)));
        let entry = propagator.alerts().get(id).unwrap();
        assert_eq!(entry.shipment_code, None);
        assert_eq!(entry.target_temperature, None);

        propagator.handle(ChangeEvent::ReadingInserted(reading(id, 2.0, false)));
        assert!(!propagator.alerts().contains(id));
    }

    #[test]
    fn test_shipment_update_membership_transitions() {
        let mut propagator = AlertPropagator::new(ALERT_THRESHOLD);
        let base = shipment(2.0, Some(2.0));
        propagator.load_shipments(vec![base.clone()]);

        let hot = update(&base, Some(6.5));
        let notifications = propagator.handle(hot.clone());
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].kind, NotificationKind::ShipmentAlert);
        assert_eq!(notifications[0].description, "Shipment SH-k3v9q temperature is out of range!");
        assert!(propagator.alerts().contains(base.id));

        // still alerting, no duplicate entry or notification
        let mut hotter_old = base.clone();
        hotter_old.current_temperature = Some(6.5);
        assert!(propagator.handle(update(&hotter_old, Some(7.0))).is_empty());
        assert_eq!(propagator.alerts().len(), 1);

        let mut cool_old = base.clone();
        cool_old.current_temperature = Some(7.0);
        assert!(propagator.handle(update(&cool_old, Some(3.0))).is_empty());
        assert!(propagator.alerts().is_empty());
    }

    #[test]
    fn test_update_without_temperature_change_is_ignored() {
        let mut propagator = AlertPropagator::new(ALERT_THRESHOLD);
        let s = shipment(2.0, Some(9.0));
        let mut new = s.clone();
        new.status = ShipmentStatus::Delayed;

        let notifications = propagator.handle(ChangeEvent::ShipmentUpdated { old: Some(s.clone()), new });
        assert!(notifications.is_empty());
        assert!(propagator.alerts().is_empty());
        assert_eq!(propagator.shipment(s.id).unwrap().status, ShipmentStatus::Delayed);
    }

    #[test]
    fn test_unknown_temperature_never_alerts() {
        let mut propagator = AlertPropagator::new(ALERT_THRESHOLD);
        let s = shipment(3.0, Some(9.0));
        propagator.load_shipments(vec![s.clone()]);
        assert!(propagator.alerts().contains(s.id));

        assert!(propagator.handle(update(&s, None)).is_empty());
        assert!(propagator.alerts().is_empty());
    }

    #[test]
    fn test_dismissed_alert_resurfaces() {
        let mut propagator = AlertPropagator::new(ALERT_THRESHOLD);
        let s = shipment(2.0, Some(8.0));
        propagator.load_shipments(vec![s.clone()]);

        assert!(propagator.dismiss(s.id));
        assert!(propagator.alerts().is_empty());

        propagator.apply(Command::Refresh(vec![s.clone()]));
        assert!(propagator.alerts().contains(s.id));
    }

    #[test]
    fn test_open_view_receives_pushed_readings() {
        let mut propagator = AlertPropagator::new(ALERT_THRESHOLD);
        let s = shipment(-18.0, None);
        let other = Uuid::new_v4();
        propagator.load_shipments(vec![s.clone()]);
        propagator.open_view(ReadingsView::open(s.id, s.target_temperature, Vec::new()));

        propagator.handle(ChangeEvent::ReadingInserted(reading(s.id, -18.2, false)));
        propagator.handle(ChangeEvent::ReadingInserted(reading(other, 4.0, false)));
        propagator.handle(ChangeEvent::ReadingInserted(reading(s.id, -17.9, false)));

        let temps: Vec<f64> = propagator.view().unwrap().readings().iter().map(|r| r.temperature).collect();
        assert_eq!(temps, vec![-17.9, -18.2]);

        propagator.close_view();
        assert!(propagator.view().is_none());
    }

    #[test]
    fn test_backdated_reading_keeps_order_and_membership() {
        let mut propagator = AlertPropagator::new(ALERT_THRESHOLD);
        let s = shipment(2.0, Some(2.1));
        let ten = Utc.with_ymd_and_hms(2025, 5, 5, 10, 0, 0).unwrap();
        let current = TemperatureReading {
            recorded_at: ten,
            ..reading(s.id, 2.1, false)
        };
        propagator.load_shipments(vec![s.clone()]);
        propagator.open_view(ReadingsView::open(s.id, s.target_temperature, vec![current]));

        let late = TemperatureReading {
            recorded_at: ten - chrono::Duration::hours(1),
            ..reading(s.id, 9.0, true)
        };
        let notifications = propagator.handle(ChangeEvent::ReadingInserted(late));

        let view = propagator.view().unwrap();
        let order: Vec<f64> = view.readings().iter().map(|r| r.temperature).collect();
        assert_eq!(order, vec![2.1, 9.0]);
        assert_eq!(view.latest().unwrap().recorded_at, ten);
        assert_eq!(propagator.shipment(s.id).unwrap().current_temperature, Some(2.1));
        assert!(!propagator.alerts().contains(s.id));
        // the reading itself was flagged, so it is still reported
        assert_eq!(notifications.len(), 1);

        // a newer reading still drives membership
        let newer = TemperatureReading {
            recorded_at: ten + chrono::Duration::minutes(5),
            ..reading(s.id, 6.0, true)
        };
        propagator.handle(ChangeEvent::ReadingInserted(newer));
        assert!(propagator.alerts().contains(s.id));
        assert_eq!(propagator.shipment(s.id).unwrap().current_temperature, Some(6.0));
    }
}
