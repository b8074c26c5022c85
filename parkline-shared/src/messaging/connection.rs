/// Broker connection
///
/// [`BrokerConnection`] owns one AMQP connection. Publishers and consumers
/// open their own channels on it; the connection itself is never used for
/// traffic directly. Once closed (by its owner or by the broker) every
/// channel request fails fast with `BrokerError::NotConnected`.

use crate::config::BrokerConfig;
use crate::connector::{ConnectError, ResilientConnector};
use crate::messaging::error::BrokerError;
use crate::telemetry::Logger;
use lapin::{Channel, Connection, ConnectionProperties};

/// Reply code sent when closing normally
const REPLY_SUCCESS: u16 = 200;

/// Live AMQP connection
pub struct BrokerConnection {
    inner: Connection,
    config: BrokerConfig,
    logger: Logger,
}

impl BrokerConnection {
    /// Dials the broker, retrying on the connector's schedule
    ///
    /// # Errors
    ///
    /// Returns the connector's error once every attempt has failed.
    pub async fn connect(
        config: BrokerConfig,
        connector: &ResilientConnector,
        logger: Logger,
    ) -> Result<Self, ConnectError> {
        let target = format!("RabbitMQ at {}", config.redacted_url());

        let inner = connector
            .connect(&target, |_| {
                let properties = ConnectionProperties::default()
                    .with_connection_name(config.connection_name.clone().into());
                Connection::connect(&config.url, properties)
            })
            .await?;

        Ok(Self {
            inner,
            config,
            logger,
        })
    }

    /// Broker configuration
    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Whether the connection is still open
    pub fn is_connected(&self) -> bool {
        self.inner.status().connected()
    }

    /// Opens a new channel
    ///
    /// # Errors
    ///
    /// `BrokerError::NotConnected` if the connection is closed,
    /// `BrokerError::Channel` if the broker refuses the channel.
    pub async fn open_channel(&self) -> Result<Channel, BrokerError> {
        if !self.is_connected() {
            return Err(BrokerError::NotConnected);
        }

        let channel = self.inner.create_channel().await.map_err(BrokerError::Channel)?;
        tracing::trace!(parent: self.logger.span(), channel_id = channel.id(), "Channel opened");
        Ok(channel)
    }

    /// Closes the connection
    ///
    /// Closing an already closed connection is a no-op.
    pub async fn close(&self) -> Result<(), BrokerError> {
        if !self.is_connected() {
            return Ok(());
        }

        self.inner
            .close(REPLY_SUCCESS, "closing")
            .await
            .map_err(BrokerError::Close)?;

        tracing::info!(
            parent: self.logger.span(),
            url = %self.config.redacted_url(),
            "Broker connection closed"
        );
        Ok(())
    }
}

/// Closes a channel if it is still open, logging failures
pub(crate) async fn release_channel(channel: &Channel, logger: &Logger) {
    if !channel.status().connected() {
        return;
    }

    if let Err(e) = channel.close(REPLY_SUCCESS, "done").await {
        tracing::warn!(
            parent: logger.span(),
            channel_id = channel.id(),
            error = %e,
            "Failed to close channel"
        );
    }
}
