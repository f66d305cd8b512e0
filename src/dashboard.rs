//! User actions against the backend. Each action is one backend call; on
//! failure the error is surfaced once on the notifier and the local state
//! is left as it was.

use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::backend::Backend;
use crate::models::{NewReading, NewShipment, Shipment, TemperatureReading};
use crate::monitor::{Notification, NotificationKind, Notifier, ReadingsView};
use crate::rules::temperature::{summarize, StatusFilter, StatusSummary};
use crate::session::Session;

#[derive(Clone)]
pub struct Dashboard {
    backend: Arc<dyn Backend>,
    session: Session,
    notifier: Notifier,
    recent_limit: i64,
}

impl Dashboard {
    pub fn new(backend: Arc<dyn Backend>, session: Session, notifier: Notifier, recent_limit: i64) -> Self {
        Self {
            backend,
            session,
            notifier,
            recent_limit,
        }
    }

    pub async fn shipments(&self) -> Option<Vec<Shipment>> {
        match self.backend.fetch_shipments(None).await {
            Ok(shipments) => Some(shipments),
            Err(e) => {
                self.notifier.report_failure("Error fetching shipments", &e).await;
                None
            }
        }
    }

    pub async fn recent_shipments(&self) -> Option<Vec<Shipment>> {
        match self.backend.fetch_shipments(Some(self.recent_limit)).await {
            Ok(shipments) => Some(shipments),
            Err(e) => {
                self.notifier.report_failure("Error fetching recent shipments", &e).await;
                None
            }
        }
    }

    /// Shipments matching `filter`, together with the status counts of the
    /// whole fleet.
    pub async fn temperature_overview(&self, filter: StatusFilter) -> Option<(Vec<Shipment>, StatusSummary)> {
        let shipments = self.shipments().await?;
        let summary = summarize(&shipments);
        let matching = filter.apply(&shipments).into_iter().cloned().collect();
        Some((matching, summary))
    }

    /// Loads the reading history for a shipment view.
    pub async fn open_shipment(&self, shipment: &Shipment) -> Option<ReadingsView> {
        match self.backend.fetch_readings(shipment.id).await {
            Ok(readings) => Some(ReadingsView::open(shipment.id, shipment.target_temperature, readings)),
            Err(e) => {
                self.notifier.report_failure("Error loading temperature logs", &e).await;
                None
            }
        }
    }

    pub async fn last_reading(&self, shipment_id: Uuid) -> Option<TemperatureReading> {
        match self.backend.fetch_latest_reading(shipment_id).await {
            Ok(reading) => reading,
            Err(e) => {
                self.notifier.report_failure("Error loading last reading", &e).await;
                None
            }
        }
    }

    pub async fn create_shipment(&self, form: NewShipment) -> Option<Shipment> {
        match self.backend.insert_shipment(&self.session, form).await {
            Ok(shipment) => {
                info!("Shipment {} created by {}", shipment.shipment_id, self.session.user_id);
                self.notifier
                    .notify(
                        Notification::new(
                            NotificationKind::Info,
                            "Shipment created",
                            format!("Shipment {} to {} has been created.", shipment.shipment_id, shipment.destination),
                        )
                        .for_shipment(shipment.id),
                    )
                    .await;
                Some(shipment)
            }
            Err(e) => {
                self.notifier.report_failure("Error creating shipment", &e).await;
                None
            }
        }
    }

    pub async fn add_reading(&self, reading: NewReading) -> Option<TemperatureReading> {
        match self.backend.insert_reading(reading).await {
            Ok(inserted) => {
                self.notifier
                    .notify(
                        Notification::new(
                            NotificationKind::Info,
                            "Temperature reading added",
                            "The temperature reading has been recorded successfully.",
                        )
                        .for_shipment(inserted.shipment_id),
                    )
                    .await;
                Some(inserted)
            }
            Err(e) => {
                self.notifier.report_failure("Error adding temperature reading", &e).await;
                None
            }
        }
    }
}
