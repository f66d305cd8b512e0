use coldchain_monitor::backend::{Backend, MemoryBackend, PgBackend};
use coldchain_monitor::config::{AppConfig, BackendKind};
use coldchain_monitor::dashboard::Dashboard;
use coldchain_monitor::db;
use coldchain_monitor::kafka;
use coldchain_monitor::monitor::{AlertPropagator, NotificationKind, Notifier};
use coldchain_monitor::realtime::{ChangeFeed, PgChangeFeed};
use coldchain_monitor::rules::temperature::{format_temperature, summarize};
use coldchain_monitor::session::Session;
use std::sync::Arc;
use tokio::signal::ctrl_c;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load config
    let config = AppConfig::load()?;

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(&config.log_level)
        .init();

    info!("Starting Cold Chain Monitor ({:?} backend)...", config.backend);

    let session = Session::new(config.session_user_id);

    let (backend, feed): (Arc<dyn Backend>, Arc<dyn ChangeFeed>) = match config.backend {
        BackendKind::Postgres => {
            let pool = db::init_pool(&config.database_url, config.db_max_connections).await?;
            info!("Connected to database");
            if config.schema_bootstrap {
                db::schema::apply_schema(&pool).await?;
            }
            let backend: Arc<dyn Backend> = Arc::new(PgBackend::new(pool.clone(), config.alert_threshold));
            let feed: Arc<dyn ChangeFeed> = Arc::new(PgChangeFeed::new(pool));
            (backend, feed)
        }
        BackendKind::Memory => {
            let memory = Arc::new(MemoryBackend::new(config.alert_threshold));
            memory.seed_demo_shipments(&session).await;
            let backend: Arc<dyn Backend> = memory.clone();
            let feed: Arc<dyn ChangeFeed> = memory;
            (backend, feed)
        }
    };

    let (notifier, mut notifications) = Notifier::channel(64);
    tokio::spawn(async move {
        while let Some(notification) = notifications.recv().await {
            match notification.kind {
                NotificationKind::Error => error!("{}", notification),
                NotificationKind::ReadingAlert | NotificationKind::ShipmentAlert => {
                    warn!("{}", notification)
                }
                NotificationKind::Info => info!("{}", notification),
            }
        }
    });

    let dashboard = Dashboard::new(
        backend.clone(),
        session,
        notifier.clone(),
        config.recent_shipments_limit,
    );

    // Subscribe before the first fetch so no change between the two is missed.
    // One feed keeps each reading ahead of the shipment update it caused.
    let events = feed.subscribe_all(config.watch_shipment_id).await?;

    let mut propagator = AlertPropagator::new(config.alert_threshold);

    if let Some(recent) = dashboard.recent_shipments().await {
        for shipment in &recent {
            info!(
                "{} {} -> {} [{}] {} (target {})",
                shipment.shipment_id,
                shipment.product,
                shipment.destination,
                shipment.status,
                format_temperature(shipment.current_temperature),
                format_temperature(Some(shipment.target_temperature)),
            );
        }
    }

    if let Some(shipments) = dashboard.shipments().await {
        let summary = summarize(&shipments);
        info!(
            "Monitoring {} shipments: {} normal, {} warning, {} critical, {} unknown",
            summary.total(),
            summary.normal,
            summary.warning,
            summary.critical,
            summary.unknown
        );

        if let Some(watch_id) = config.watch_shipment_id {
            match shipments.iter().find(|s| s.id == watch_id) {
                Some(shipment) => {
                    if let Some(view) = dashboard.open_shipment(shipment).await {
                        info!(
                            "Watching {} with {} readings, latest {}",
                            shipment.shipment_id,
                            view.len(),
                            format_temperature(view.latest().map(|r| r.temperature))
                        );
                        propagator.open_view(view);
                    }
                }
                None => warn!("WATCH_SHIPMENT_ID {} not found", watch_id),
            }
        }

        propagator.load_shipments(shipments);
    }

    let mut handle = propagator.spawn(events, notifier.clone());

    let mut alerts = handle.alerts.clone();
    tokio::spawn(async move {
        while alerts.changed().await.is_ok() {
            let active = alerts.borrow_and_update().clone();
            info!("{} active temperature alerts", active.len());
            for entry in &active {
                warn!("{}", entry.describe());
            }
        }
    });

    if config.kafka_enabled {
        let kafka_config = config.clone();
        let kafka_backend = backend.clone();
        let kafka_notifier = notifier.clone();
        tokio::spawn(async move {
            if let Err(e) =
                kafka::start_kafka_consumer(&kafka_config, kafka_backend, kafka_notifier).await
            {
                error!("Kafka consumer stopped: {}", e);
            }
        });
    }

    tokio::select! {
        _ = ctrl_c() => {
            info!("Received shutdown signal. Shutting down gracefully...");
        }
        _ = &mut handle.task => {
            warn!("Alert propagator stopped");
        }
    }

    handle.task.abort();
    Ok(())
}
