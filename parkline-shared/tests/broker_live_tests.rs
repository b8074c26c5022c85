//! End-to-end tests against live RabbitMQ and Redis
//!
//! Run with: `cargo test -- --ignored` and `RABBITMQ_URL`/`REDIS_ADDR` set.

use async_trait::async_trait;
use lapin::options::{QueueDeclareOptions, QueueDeleteOptions};
use lapin::types::FieldTable;
use parkline_shared::config::{BrokerConfig, StoreConfig};
use parkline_shared::connector::{OnExhausted, ResilientConnector};
use parkline_shared::context::CallContext;
use parkline_shared::events::{decode, EntryEvent};
use parkline_shared::messaging::{
    BrokerConnection, BrokerError, EventConsumer, EventPublisher, MessageHandler,
};
use parkline_shared::presence::{PresenceTracker, RedisStore};
use parkline_shared::telemetry::Logger;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

struct Forward(mpsc::UnboundedSender<EntryEvent>);

#[async_trait]
impl MessageHandler for Forward {
    async fn process_message(&self, body: &[u8]) -> anyhow::Result<()> {
        let event: EntryEvent = decode(body)?;
        self.0.send(event)?;
        Ok(())
    }
}

async fn connect_broker() -> Arc<BrokerConnection> {
    let connector =
        ResilientConnector::new(Logger::disabled()).on_exhausted(OnExhausted::ReturnError);
    let config = BrokerConfig::from_env().expect("broker config");
    Arc::new(
        BrokerConnection::connect(config, &connector, Logger::disabled())
            .await
            .expect("broker reachable"),
    )
}

#[tokio::test]
#[ignore] // Requires running RabbitMQ instance
async fn test_publish_then_consume_round_trip() {
    let connection = connect_broker().await;
    let queue = format!("parkline-test-{}", uuid::Uuid::new_v4());

    let setup = connection.open_channel().await.unwrap();
    setup
        .queue_declare(&queue, QueueDeclareOptions::default(), FieldTable::default())
        .await
        .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let consumer = EventConsumer::new(connection.clone(), Logger::disabled());
    let handle = consumer.consume(&queue, Arc::new(Forward(tx))).await.unwrap();

    let publisher = EventPublisher::new(connection.clone(), Logger::disabled());
    let sent = EntryEvent::new("KA01AB1234", chrono::Utc::now());
    publisher.publish(&queue, &sent).await.unwrap();

    let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, sent);

    handle.cancel().await.unwrap();
    setup
        .queue_delete(&queue, QueueDeleteOptions::default())
        .await
        .unwrap();
    connection.close().await.unwrap();
}

#[tokio::test]
#[ignore] // Requires running RabbitMQ instance
async fn test_closed_connection_refuses_channels() {
    let connection = connect_broker().await;
    connection.close().await.unwrap();

    assert!(!connection.is_connected());
    assert!(matches!(connection.open_channel().await, Err(BrokerError::NotConnected)));
    // Closing twice is fine
    connection.close().await.unwrap();
}

#[tokio::test]
#[ignore] // Requires running Redis instance
async fn test_redis_presence_round_trip() {
    let connector =
        ResilientConnector::new(Logger::disabled()).on_exhausted(OnExhausted::ReturnError);
    let config = StoreConfig::from_env().expect("store config");
    let store = RedisStore::connect(config, &connector, Logger::disabled())
        .await
        .expect("redis reachable");
    let tracker = PresenceTracker::new(store, Logger::disabled());
    let ctx = CallContext::background().with_timeout(Duration::from_secs(5));
    let set = format!("parkline-test-{}", uuid::Uuid::new_v4());

    tracker.ping(&ctx).await.unwrap();
    tracker.add(&ctx, &set, "KA01AB1234").await.unwrap();
    assert!(tracker.is_not_empty(&ctx, &set).await.unwrap());
    assert_eq!(tracker.random_member(&ctx, &set).await.unwrap(), "KA01AB1234");
    tracker.remove(&ctx, &set, "KA01AB1234").await.unwrap();
    assert!(!tracker.is_not_empty(&ctx, &set).await.unwrap());

    tracker.store().close();
}
