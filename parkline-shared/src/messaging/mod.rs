/// Message delivery over the AMQP broker
///
/// # Architecture
///
/// ```text
/// ┌──────────────────┐  open_channel()  ┌────────────────┐
/// │ BrokerConnection │◄─────────────────│ EventPublisher │ one channel per publish
/// └────────┬─────────┘                  └────────────────┘
///          │ open_channel()
///          ▼
/// ┌──────────────────┐  spawn_dispatch  ┌────────────────┐
/// │  EventConsumer   │─────────────────►│ dispatch task  │──► MessageHandler
/// └──────────────────┘                  └────────────────┘
/// ```
///
/// Queues are addressed by name through the default exchange. Nothing in
/// this module declares queues; they must already exist on the broker.

pub mod connection;
pub mod consumer;
pub mod error;
pub mod publisher;

// Re-export common types for convenience
pub use connection::BrokerConnection;
pub use consumer::{
    dispatch, spawn_dispatch, spawn_dispatch_with_release, ConsumerHandle, DispatchSummary,
    EventConsumer, HandlerFailurePolicy, MessageHandler,
};
pub use error::{BrokerError, ConsumeError, PublishError, SubscribeError};
pub use publisher::{encode_payload, EventPublisher, CONTENT_TYPE_JSON};
