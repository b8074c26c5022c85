/// Queue consumption with handler dispatch
///
/// [`EventConsumer::consume`] subscribes to a queue and returns as soon as
/// the broker has accepted the subscription. Deliveries are handed to a
/// [`MessageHandler`] on a separate tokio task that lives until the delivery
/// stream ends.
///
/// # Delivery Guarantees
///
/// Subscriptions use auto-acknowledge: the broker forgets a message the
/// moment it is sent to us, before the handler runs. A handler error never
/// causes redelivery. This is at-most-once, best-effort delivery.
///
/// # Handler Failures
///
/// What happens when the handler returns an error is configured with
/// [`HandlerFailurePolicy`]:
///
/// - `LogAndContinue` (default): log at error level, drop the message, keep going
/// - `Abort`: log at error level and stop the loop; the handle resolves to a
///   fatal `ConsumeError::Handler` for the binary's `FatalPolicy`
///
/// # Cancellation
///
/// Closing the connection, or calling [`ConsumerHandle::cancel`], ends the
/// delivery stream and with it the dispatch task. When the task stops on its
/// own (stream error or an aborting handler) it closes the subscription
/// channel itself, so the broker stops pushing to a dead consumer.
///
/// # Example
///
/// ```no_run
/// use parkline_shared::messaging::{BrokerConnection, EventConsumer, MessageHandler};
/// use parkline_shared::telemetry::Logger;
/// use async_trait::async_trait;
/// use std::sync::Arc;
///
/// struct PrintHandler;
///
/// #[async_trait]
/// impl MessageHandler for PrintHandler {
///     async fn process_message(&self, body: &[u8]) -> anyhow::Result<()> {
///         println!("{}", String::from_utf8_lossy(body));
///         Ok(())
///     }
/// }
///
/// # async fn example(connection: Arc<BrokerConnection>) -> Result<(), Box<dyn std::error::Error>> {
/// let consumer = EventConsumer::new(connection, Logger::new("consumer"));
/// let mut handle = consumer.consume("entry", Arc::new(PrintHandler)).await?;
///
/// let summary = handle.wait().await?;
/// println!("processed {} messages", summary.delivered);
/// # Ok(())
/// # }
/// ```

use crate::config::ConfigError;
use crate::messaging::connection::{release_channel, BrokerConnection};
use crate::messaging::error::{BrokerError, ConsumeError, SubscribeError};
use crate::telemetry::Logger;
use async_trait::async_trait;
use futures::Stream;
use lapin::options::BasicConsumeOptions;
use lapin::types::FieldTable;
use lapin::Channel;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;

/// Processes one delivered message body
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Handles the raw bytes of one message
    async fn process_message(&self, body: &[u8]) -> anyhow::Result<()>;
}

/// What the dispatch loop does when the handler fails
///
/// The message has already been acknowledged either way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HandlerFailurePolicy {
    /// Log the error and move on to the next message
    #[default]
    LogAndContinue,

    /// Stop consuming and report a fatal error
    Abort,
}

impl FromStr for HandlerFailurePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "log_and_continue" | "continue" => Ok(HandlerFailurePolicy::LogAndContinue),
            "abort" => Ok(HandlerFailurePolicy::Abort),
            _ => Err(ConfigError::Invalid {
                name: "HANDLER_FAILURE_POLICY",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for HandlerFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerFailurePolicy::LogAndContinue => write!(f, "log_and_continue"),
            HandlerFailurePolicy::Abort => write!(f, "abort"),
        }
    }
}

/// Counts from a finished dispatch loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Messages handed to the handler
    pub delivered: u64,

    /// Messages whose handler returned an error
    pub failed: u64,
}

/// Subscribes handlers to queues
pub struct EventConsumer {
    connection: Arc<BrokerConnection>,
    policy: HandlerFailurePolicy,
    logger: Logger,
}

impl EventConsumer {
    /// Creates a consumer with the default failure policy
    pub fn new(connection: Arc<BrokerConnection>, logger: Logger) -> Self {
        Self {
            connection,
            policy: HandlerFailurePolicy::default(),
            logger,
        }
    }

    /// Selects the handler failure policy
    pub fn with_failure_policy(mut self, policy: HandlerFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Failure policy in use
    pub fn failure_policy(&self) -> HandlerFailurePolicy {
        self.policy
    }

    /// Subscribes `handler` to `queue`
    ///
    /// Returns once the subscription is established; messages are processed
    /// on a spawned task.
    ///
    /// # Errors
    ///
    /// Returns an error if no channel can be opened or the broker refuses
    /// the subscription. The channel is released in both cases.
    pub async fn consume<H>(
        &self,
        queue: &str,
        handler: Arc<H>,
    ) -> Result<ConsumerHandle, SubscribeError>
    where
        H: MessageHandler + ?Sized,
    {
        let channel = self.connection.open_channel().await?;

        let consumer = match channel
            .basic_consume(
                queue,
                "", // Broker-generated consumer tag
                BasicConsumeOptions {
                    no_local: false,
                    no_ack: true,
                    exclusive: false,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await
        {
            Ok(consumer) => consumer,
            Err(source) => {
                release_channel(&channel, &self.logger).await;
                return Err(SubscribeError::Consume {
                    queue: queue.to_string(),
                    source,
                });
            }
        };

        tracing::info!(
            parent: self.logger.span(),
            queue = %queue,
            consumer_tag = %consumer.tag().as_str(),
            policy = %self.policy,
            "Subscribed to queue"
        );

        let deliveries = Box::pin(consumer.map(|delivery| delivery.map(|d| d.data)));
        let release_channel_on_exit = channel.clone();
        let release_logger = self.logger.clone();
        let mut handle = spawn_dispatch_with_release(
            queue,
            deliveries,
            handler,
            self.policy,
            self.logger.clone(),
            move || async move { release_channel(&release_channel_on_exit, &release_logger).await },
        );
        handle.channel = Some(channel);
        Ok(handle)
    }
}

/// Handle to a running dispatch task
pub struct ConsumerHandle {
    queue: String,
    channel: Option<Channel>,
    task: Option<JoinHandle<Result<DispatchSummary, ConsumeError>>>,
    logger: Logger,
}

impl ConsumerHandle {
    /// Queue being consumed
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Whether the dispatch task has stopped
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }

    /// Ends the subscription by closing its channel
    ///
    /// The dispatch task finishes once the delivery stream notices.
    pub async fn cancel(&self) -> Result<(), BrokerError> {
        let Some(channel) = &self.channel else {
            return Ok(());
        };
        if !channel.status().connected() {
            return Ok(());
        }
        channel
            .close(200, "consumer cancelled")
            .await
            .map_err(BrokerError::Close)?;
        tracing::info!(parent: self.logger.span(), queue = %self.queue, "Subscription cancelled");
        Ok(())
    }

    /// Waits for the dispatch task to finish
    ///
    /// Cancel-safe. After it has returned once, later calls return an
    /// empty summary immediately.
    pub async fn wait(&mut self) -> Result<DispatchSummary, ConsumeError> {
        let Some(task) = self.task.as_mut() else {
            return Ok(DispatchSummary::default());
        };

        let joined = task.await;
        self.task = None;

        joined.map_err(|e| ConsumeError::TaskFailed {
            queue: self.queue.clone(),
            message: e.to_string(),
        })?
    }
}

/// Spawns the dispatch loop over any delivery stream
///
/// Used by tests and alternative transports that own no broker resources.
pub fn spawn_dispatch<S, E, H>(
    queue: &str,
    deliveries: S,
    handler: Arc<H>,
    policy: HandlerFailurePolicy,
    logger: Logger,
) -> ConsumerHandle
where
    S: Stream<Item = Result<Vec<u8>, E>> + Send + Unpin + 'static,
    E: fmt::Display + Send + 'static,
    H: MessageHandler + ?Sized,
{
    spawn_dispatch_with_release(queue, deliveries, handler, policy, logger, || async {})
}

/// Spawns the dispatch loop and runs `release` once it ends
///
/// `release` runs on every exit from the loop: stream end, stream error and
/// an aborting handler failure. [`EventConsumer::consume`] uses it to close
/// the subscription channel.
pub fn spawn_dispatch_with_release<S, E, H, F, Fut>(
    queue: &str,
    deliveries: S,
    handler: Arc<H>,
    policy: HandlerFailurePolicy,
    logger: Logger,
    release: F,
) -> ConsumerHandle
where
    S: Stream<Item = Result<Vec<u8>, E>> + Send + Unpin + 'static,
    E: fmt::Display + Send + 'static,
    H: MessageHandler + ?Sized,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let task_queue = queue.to_string();
    let task_logger = logger.clone();
    let task = tokio::spawn(async move {
        let result = dispatch(task_queue, deliveries, handler, policy, task_logger).await;
        release().await;
        result
    });

    ConsumerHandle {
        queue: queue.to_string(),
        channel: None,
        task: Some(task),
        logger,
    }
}

/// Feeds each delivery to the handler until the stream ends
pub async fn dispatch<S, E, H>(
    queue: String,
    mut deliveries: S,
    handler: Arc<H>,
    policy: HandlerFailurePolicy,
    logger: Logger,
) -> Result<DispatchSummary, ConsumeError>
where
    S: Stream<Item = Result<Vec<u8>, E>> + Unpin,
    E: fmt::Display,
    H: MessageHandler + ?Sized,
{
    let mut summary = DispatchSummary::default();

    while let Some(delivery) = deliveries.next().await {
        let body = match delivery {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(
                    parent: logger.span(),
                    queue = %queue,
                    error = %e,
                    "Delivery stream failed"
                );
                return Err(ConsumeError::Delivery {
                    queue,
                    message: e.to_string(),
                });
            }
        };

        summary.delivered += 1;
        if let Err(e) = handler.process_message(&body).await {
            summary.failed += 1;
            tracing::error!(
                parent: logger.span(),
                queue = %queue,
                error = %e,
                policy = %policy,
                "Failed to process consumed message body"
            );

            if policy == HandlerFailurePolicy::Abort {
                return Err(ConsumeError::Handler {
                    queue,
                    source: e.into(),
                });
            }
        }
    }

    tracing::info!(
        parent: logger.span(),
        queue = %queue,
        delivered = summary.delivered,
        failed = summary.failed,
        "Delivery stream closed"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_policy_default_is_log_and_continue() {
        assert_eq!(HandlerFailurePolicy::default(), HandlerFailurePolicy::LogAndContinue);
    }

    #[test]
    fn test_failure_policy_parse() {
        assert_eq!(
            "abort".parse::<HandlerFailurePolicy>().unwrap(),
            HandlerFailurePolicy::Abort
        );
        assert_eq!(
            "log-and-continue".parse::<HandlerFailurePolicy>().unwrap(),
            HandlerFailurePolicy::LogAndContinue
        );
        assert!("retry".parse::<HandlerFailurePolicy>().is_err());
    }

    #[test]
    fn test_failure_policy_display_round_trips() {
        for policy in [HandlerFailurePolicy::LogAndContinue, HandlerFailurePolicy::Abort] {
            assert_eq!(policy.to_string().parse::<HandlerFailurePolicy>().unwrap(), policy);
        }
    }
}
