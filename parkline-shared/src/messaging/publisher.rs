/// Event publishing to broker queues
///
/// Events are published straight to a queue through the default exchange,
/// as JSON with content type `application/json`. Each publish opens its own
/// channel and closes it again, so one connection can serve concurrent
/// publishes.
///
/// # Delivery
///
/// - `mandatory = false`, `immediate = false`: if the queue does not exist
///   the broker drops the message without telling anyone.
/// - No publisher confirms are awaited.
///
/// # Example
///
/// ```no_run
/// use parkline_shared::events::EntryEvent;
/// use parkline_shared::messaging::{BrokerConnection, EventPublisher};
/// use parkline_shared::telemetry::Logger;
/// use chrono::Utc;
/// use std::sync::Arc;
///
/// # async fn example(connection: Arc<BrokerConnection>) -> Result<(), Box<dyn std::error::Error>> {
/// let publisher = EventPublisher::new(connection, Logger::new("publisher"));
///
/// let event = EntryEvent::new("KA01AB1234", Utc::now());
/// publisher.publish("entry", &event).await?;
/// # Ok(())
/// # }
/// ```

use crate::messaging::connection::{release_channel, BrokerConnection};
use crate::messaging::error::PublishError;
use crate::telemetry::Logger;
use lapin::options::BasicPublishOptions;
use lapin::{BasicProperties, Channel};
use serde::Serialize;
use std::sync::Arc;

/// Content type set on every published message
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Publishes serialized events to named queues
#[derive(Clone)]
pub struct EventPublisher {
    connection: Arc<BrokerConnection>,
    logger: Logger,
}

impl EventPublisher {
    /// Creates a publisher on `connection`
    pub fn new(connection: Arc<BrokerConnection>, logger: Logger) -> Self {
        Self { connection, logger }
    }

    /// Publishes `event` to `queue`
    ///
    /// The channel opened for this call is closed on every path out.
    ///
    /// # Errors
    ///
    /// - `PublishError::NotConnected` if the connection is closed
    /// - `PublishError::Broker` if the broker refuses a channel
    /// - `PublishError::MalformedPayload` if `event` cannot be serialized (fatal)
    /// - `PublishError::Transport` if the publish itself fails
    pub async fn publish<T>(&self, queue: &str, event: &T) -> Result<(), PublishError>
    where
        T: Serialize + ?Sized,
    {
        let channel = self.connection.open_channel().await?;
        let result = self.publish_on(&channel, queue, event).await;
        release_channel(&channel, &self.logger).await;
        result
    }

    async fn publish_on<T>(
        &self,
        channel: &Channel,
        queue: &str,
        event: &T,
    ) -> Result<(), PublishError>
    where
        T: Serialize + ?Sized,
    {
        let body = match encode_payload(event) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(
                    parent: self.logger.span(),
                    queue = %queue,
                    error = %e,
                    "JSON conversion error"
                );
                return Err(e);
            }
        };

        channel
            .basic_publish(
                "",    // Default exchange
                queue, // Routing key = queue name
                BasicPublishOptions {
                    mandatory: false,
                    immediate: false,
                },
                &body,
                BasicProperties::default().with_content_type(CONTENT_TYPE_JSON.into()),
            )
            .await
            .map_err(|source| PublishError::Transport {
                queue: queue.to_string(),
                source,
            })?;

        tracing::info!(
            parent: self.logger.span(),
            queue = %queue,
            "Published event: {}",
            String::from_utf8_lossy(&body)
        );
        Ok(())
    }
}

/// Serializes an event body for publishing
///
/// # Errors
///
/// `PublishError::MalformedPayload` if serialization fails.
pub fn encode_payload<T: Serialize + ?Sized>(event: &T) -> Result<Vec<u8>, PublishError> {
    serde_json::to_vec(event).map_err(PublishError::MalformedPayload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EntryEvent;
    use crate::fatal::Severity;
    use chrono::Utc;

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("sensor returned garbage"))
        }
    }

    #[test]
    fn test_encode_payload_is_json() {
        let event = EntryEvent::new("KA01AB1234", Utc::now());
        let body = encode_payload(&event).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["vehicle_plate"], "KA01AB1234");
    }

    #[test]
    fn test_malformed_payload_is_fatal() {
        let err = encode_payload(&Unserializable).unwrap_err();
        assert!(matches!(err, PublishError::MalformedPayload(_)));
        assert!(err.is_fatal());
        assert!(err.to_string().contains("sensor returned garbage"));
    }
}
