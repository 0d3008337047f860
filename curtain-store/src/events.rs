use async_trait::async_trait;
use curtain_core::{EventPublisher, PublishError};
use curtain_shared::models::events::BookingEvent;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::{error, info};

#[derive(Clone)]
pub struct EventProducer {
    producer: FutureProducer,
}

impl EventProducer {
    pub fn new(brokers: &str) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self { producer })
    }

    pub async fn send(&self, topic: &str, key: &str, payload: &str) -> Result<(), rdkafka::error::KafkaError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
            Ok(delivery) => {
                info!(
                    topic,
                    key,
                    partition = delivery.partition,
                    offset = delivery.offset,
                    "event delivered"
                );
                Ok(())
            }
            Err((e, _msg)) => {
                error!(topic, error = %e, "event delivery failed");
                Err(e)
            }
        }
    }
}

/// Every booking event goes to its own topic, keyed by slot so one showing's
/// events stay in order.
#[async_trait]
impl EventPublisher for EventProducer {
    async fn publish(&self, event: &BookingEvent) -> Result<(), PublishError> {
        let payload = serde_json::to_string(event).map_err(|e| PublishError(e.to_string()))?;
        self.send(event.topic(), &event.partition_key(), &payload)
            .await
            .map_err(|e| PublishError(e.to_string()))
    }
}
