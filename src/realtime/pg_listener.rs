use async_trait::async_trait;
use sqlx::postgres::PgListener;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::db::schema::{READINGS_CHANNEL, SHIPMENTS_CHANNEL};
use crate::db::DbPool;
use crate::error::{MonitorError, MonitorResult};
use crate::models::ChangeEvent;
use crate::realtime::{ChangeFeed, Subscription, Topic, SUBSCRIPTION_BUFFER};

/// Change feed backed by Postgres `LISTEN/NOTIFY`.
#[derive(Clone)]
pub struct PgChangeFeed {
    pool: DbPool,
}

impl PgChangeFeed {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

// One connection per subscription, so notifications on all of its channels
// arrive in commit order.
fn channels_for(topic: Topic) -> &'static [&'static str] {
    match topic {
        Topic::Readings(_) => &[READINGS_CHANNEL],
        Topic::ShipmentUpdates => &[SHIPMENTS_CHANNEL],
        Topic::All(_) => &[READINGS_CHANNEL, SHIPMENTS_CHANNEL],
    }
}

#[async_trait]
impl ChangeFeed for PgChangeFeed {
    async fn subscribe(&self, topic: Topic) -> MonitorResult<Subscription> {
        let channels = channels_for(topic);

        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .map_err(|e| MonitorError::Subscription(e.to_string()))?;
        listener
            .listen_all(channels.iter().copied())
            .await
            .map_err(|e| MonitorError::Subscription(e.to_string()))?;
        info!("Listening on {} for {:?}", channels.join(", "), topic);

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);

        let task = tokio::spawn(async move {
            loop {
                match listener.recv().await {
                    Ok(notification) => {
                        let event = match ChangeEvent::from_payload(notification.payload()) {
                            Ok(Some(event)) => event,
                            Ok(None) => continue,
                            Err(e) => {
                                warn!("Failed to parse change notification: {}", e);
                                continue;
                            }
                        };

                        if !topic.accepts(&event) {
                            continue;
                        }

                        debug!("Change event for shipment {}", event.shipment_id());
                        if tx.send(event).await.is_err() {
                            // subscriber is gone
                            break;
                        }
                    }
                    Err(e) => {
                        // the listener reconnects on the next recv
                        error!("Change feed connection error on {:?}: {}", topic, e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
            info!("Stopped listening for {:?}", topic);
        });

        Ok(Subscription::new(topic, rx, task))
    }
}
