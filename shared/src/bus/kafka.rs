use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{future, StreamExt};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::BorrowedMessage;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::Message;
use tracing::{debug, error, info};

use super::{consume, BusError, Publisher};
use crate::router::{Delivery, Router};
use crate::shutdown::ShutdownSignal;

#[derive(Clone, Debug)]
pub struct KafkaConfig {
    pub brokers: String,
    pub group_id: String,
    pub send_timeout: Duration,
}

impl KafkaConfig {
    pub fn new(brokers: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            brokers: brokers.into(),
            group_id: group_id.into(),
            send_timeout: Duration::from_secs(5),
        }
    }

    fn producer_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", "all");
        config
    }

    fn consumer_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("group.id", &self.group_id)
            .set("bootstrap.servers", &self.brokers)
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", "6000")
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest");
        config
    }
}

pub struct KafkaPublisher {
    producer: FutureProducer,
    send_timeout: Duration,
}

impl KafkaPublisher {
    pub fn new(config: &KafkaConfig) -> Result<Self, BusError> {
        let producer: FutureProducer = config
            .producer_config()
            .create()
            .map_err(|e| BusError::Connection(format!("create producer: {e}")))?;

        Ok(Self {
            producer,
            send_timeout: config.send_timeout,
        })
    }
}

#[async_trait]
impl Publisher for KafkaPublisher {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<(), BusError> {
        let record = FutureRecord::to(topic).payload(&payload).key(key);

        self.producer
            .send(record, self.send_timeout)
            .await
            .map_err(|(e, _)| BusError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;

        debug!(topic = %topic, key = %key, "published");
        Ok(())
    }
}

/// Consumer-group subscription feeding a router. Partition assignment and
/// offsets are left to the broker; the offset of a message is committed once
/// its handlers have been launched.
pub struct KafkaConsumer {
    consumer: StreamConsumer,
    group_id: String,
}

impl KafkaConsumer {
    pub fn subscribe(config: &KafkaConfig, topics: &[&str]) -> Result<Self, BusError> {
        let consumer: StreamConsumer = config
            .consumer_config()
            .create()
            .map_err(|e| BusError::Connection(format!("create consumer: {e}")))?;

        consumer
            .subscribe(topics)
            .map_err(|e| BusError::Subscribe(e.to_string()))?;

        info!(group_id = %config.group_id, topics = ?topics, "subscribed to kafka topics");

        Ok(Self {
            consumer,
            group_id: config.group_id.clone(),
        })
    }

    /// Runs the consume loop until the stream ends or `shutdown` fires.
    pub async fn run(self, router: Arc<Router>, shutdown: ShutdownSignal) {
        let messages = self.consumer.stream().filter_map(|next| {
            future::ready(match next {
                Ok(message) => Some((delivery_of(&message), message)),
                Err(e) => {
                    error!(error = %e, "kafka consumer error");
                    None
                }
            })
        });

        let dispatched = consume(&router, messages, shutdown, |message| {
            if let Err(e) = self.consumer.commit_message(&message, CommitMode::Async) {
                error!(error = %e, "commit offset");
            }
        })
        .await;

        self.consumer.unsubscribe();
        info!(group_id = %self.group_id, dispatched, "consume loop stopped");
    }
}

fn delivery_of(message: &BorrowedMessage<'_>) -> Delivery {
    Delivery {
        topic: message.topic().to_string(),
        key: message
            .key()
            .map(|k| String::from_utf8_lossy(k).into_owned()),
        payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        partition: message.partition(),
        offset: message.offset(),
    }
}
