//! Push notifications from the backend, delivered as typed event streams.

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::MonitorResult;
use crate::models::ChangeEvent;

pub mod pg_listener;

pub use pg_listener::PgChangeFeed;

pub const SUBSCRIPTION_BUFFER: usize = 100;

/// What a subscription is listening for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    /// Reading inserts, optionally only for one shipment.
    Readings(Option<Uuid>),
    ShipmentUpdates,
    /// Reading inserts (optionally only for one shipment) and every shipment
    /// update on one feed, in commit order.
    All(Option<Uuid>),
}

impl Topic {
    pub fn accepts(&self, event: &ChangeEvent) -> bool {
        match (self, event) {
            (Topic::Readings(None), ChangeEvent::ReadingInserted(_)) => true,
            (Topic::Readings(Some(id)), ChangeEvent::ReadingInserted(reading)) => {
                reading.shipment_id == *id
            }
            (Topic::ShipmentUpdates, ChangeEvent::ShipmentUpdated { .. }) => true,
            (Topic::All(filter), ChangeEvent::ReadingInserted(_)) => {
                Topic::Readings(*filter).accepts(event)
            }
            (Topic::All(_), ChangeEvent::ShipmentUpdated { .. }) => true,
            _ => false,
        }
    }
}

#[async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn subscribe(&self, topic: Topic) -> MonitorResult<Subscription>;

    async fn subscribe_readings(&self, shipment_id: Option<Uuid>) -> MonitorResult<Subscription> {
        self.subscribe(Topic::Readings(shipment_id)).await
    }

    async fn subscribe_shipment_updates(&self) -> MonitorResult<Subscription> {
        self.subscribe(Topic::ShipmentUpdates).await
    }

    /// Both kinds of change on a single subscription. A reading insert is
    /// always delivered before the shipment update it caused.
    async fn subscribe_all(&self, shipment_id: Option<Uuid>) -> MonitorResult<Subscription> {
        self.subscribe(Topic::All(shipment_id)).await
    }
}

/// A live subscription. Dropping it detaches the listener.
pub struct Subscription {
    topic: Topic,
    events: mpsc::Receiver<ChangeEvent>,
    listener: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(topic: Topic, events: mpsc::Receiver<ChangeEvent>, listener: JoinHandle<()>) -> Self {
        Self {
            topic,
            events,
            listener: Some(listener),
        }
    }

    /// A subscription fed directly by the caller, with no listener task.
    pub fn from_channel(topic: Topic, events: mpsc::Receiver<ChangeEvent>) -> Self {
        Self {
            topic,
            events,
            listener: None,
        }
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }
}

impl Stream for Subscription {
    type Item = ChangeEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}
