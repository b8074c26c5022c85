use crate::connector::BoxError;
use crate::fatal::Severity;
use thiserror::Error;

/// Broker connection and channel errors
#[derive(Error, Debug)]
pub enum BrokerError {
    /// The connection reports closed
    #[error("Broker not connected")]
    NotConnected,

    /// Opening a channel failed
    #[error("Failed to open channel: {0}")]
    Channel(#[source] lapin::Error),

    /// Closing the connection or a channel failed
    #[error("Failed to close: {0}")]
    Close(#[source] lapin::Error),
}

impl Severity for BrokerError {
    fn is_fatal(&self) -> bool {
        false
    }
}

/// Publish errors
#[derive(Error, Debug)]
pub enum PublishError {
    /// The connection reports closed
    #[error("Broker not connected")]
    NotConnected,

    /// Could not get a channel
    #[error(transparent)]
    Broker(BrokerError),

    /// Event could not be serialized; never retried
    #[error("Malformed payload: {0}")]
    MalformedPayload(#[source] serde_json::Error),

    /// Broker rejected or dropped the publish
    #[error("Failed to publish to {queue}: {source}")]
    Transport {
        queue: String,
        #[source]
        source: lapin::Error,
    },
}

impl From<BrokerError> for PublishError {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::NotConnected => PublishError::NotConnected,
            other => PublishError::Broker(other),
        }
    }
}

impl Severity for PublishError {
    fn is_fatal(&self) -> bool {
        matches!(self, PublishError::MalformedPayload(_))
    }
}

/// Subscription errors
#[derive(Error, Debug)]
pub enum SubscribeError {
    /// Could not get a channel
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// basic.consume was refused
    #[error("Failed to consume from {queue}: {source}")]
    Consume {
        queue: String,
        #[source]
        source: lapin::Error,
    },
}

impl Severity for SubscribeError {
    fn is_fatal(&self) -> bool {
        false
    }
}

/// Errors that end a dispatch loop
#[derive(Error, Debug)]
pub enum ConsumeError {
    /// Handler failed under `HandlerFailurePolicy::Abort`
    #[error("Failed to process message from {queue}: {source}")]
    Handler {
        queue: String,
        #[source]
        source: BoxError,
    },

    /// The delivery stream reported an error
    #[error("Delivery stream for {queue} failed: {message}")]
    Delivery { queue: String, message: String },

    /// The dispatch task panicked or was aborted
    #[error("Dispatch task for {queue} did not finish: {message}")]
    TaskFailed { queue: String, message: String },
}

impl Severity for ConsumeError {
    fn is_fatal(&self) -> bool {
        matches!(self, ConsumeError::Handler { .. })
    }
}
