use crate::backend::Backend;
use crate::config::AppConfig;
use crate::monitor::Notifier;
use crate::processor::message_processor;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Consumes device telemetry with SASL/SCRAM authentication and a circuit breaker.
///
/// Each message is written through the backend exactly once; a failed
/// insert is reported on the notifier and not retried.
pub async fn start_kafka_consumer(
    config: &AppConfig,
    backend: Arc<dyn Backend>,
    notifier: Notifier,
) -> anyhow::Result<()> {
    info!("Initializing Kafka consumer for topic: {}", config.kafka_topic);

    let mut client_config = ClientConfig::new();
    client_config
        .set("bootstrap.servers", &config.kafka_bootstrap_servers)
        .set("group.id", &config.kafka_group_id)
        .set("auto.offset.reset", &config.kafka_auto_offset_reset)
        .set("security.protocol", &config.kafka_security_protocol)
        .set("sasl.mechanism", &config.kafka_sasl_mechanism)
        .set("sasl.username", &config.kafka_username)
        .set("sasl.password", &config.kafka_password);

    let consumer: StreamConsumer = client_config.create()?;

    consumer.subscribe(&[&config.kafka_topic])?;
    info!("Subscribed to topic: {}", config.kafka_topic);

    let mut breaker = CircuitBreaker::new(
        config.kafka_max_retries,
        Duration::from_secs(config.kafka_circuit_breaker_cooldown),
    );

    loop {
        breaker.wait_if_tripped().await;

        match consumer.recv().await {
            Ok(m) => {
                breaker.record_success();

                let Some(payload) = m.payload().map(|p| p.to_vec()) else {
                    warn!("Received empty telemetry payload from Kafka");
                    continue;
                };

                let backend = backend.clone();
                let notifier = notifier.clone();

                // keep the consumer loop free while the insert runs
                tokio::spawn(async move {
                    if let Err(e) = message_processor::process_message(backend.as_ref(), &payload).await {
                        notifier.report_failure("Error adding temperature reading", &e).await;
                    }
                });
            }
            Err(e) => {
                let failures = breaker.record_failure();
                error!("Kafka error: {} ({} / {} consecutive failures)", e, failures, breaker.max_failures);
                tokio::time::sleep(RECV_ERROR_BACKOFF).await;
            }
        }
    }
}

const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(500);

/// Counts consecutive receive failures; once `max_failures` is reached the
/// consumer pauses for `cooldown` before polling again.
#[derive(Debug)]
struct CircuitBreaker {
    max_failures: u32,
    cooldown: Duration,
    consecutive_failures: u32,
}

impl CircuitBreaker {
    fn new(max_failures: u32, cooldown: Duration) -> Self {
        Self {
            max_failures,
            cooldown,
            consecutive_failures: 0,
        }
    }

    fn is_tripped(&self) -> bool {
        self.consecutive_failures >= self.max_failures
    }

    fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    fn record_failure(&mut self) -> u32 {
        self.consecutive_failures += 1;
        self.consecutive_failures
    }

    async fn wait_if_tripped(&mut self) {
        if !self.is_tripped() {
            return;
        }
        warn!(
            "Circuit breaker tripped ({} consecutive failures), pausing telemetry for {:?}",
            self.consecutive_failures, self.cooldown
        );
        tokio::time::sleep(self.cooldown).await;
        self.consecutive_failures = 0;
        info!("Circuit breaker reset, resuming telemetry consumption");
    }
}
