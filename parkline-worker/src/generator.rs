/// Synthetic entry/exit traffic
///
/// Every tick the generator looks at the presence set. If vehicles are
/// parked and a random draw falls below the exit ratio, one of them (picked
/// with `random_member`) leaves; otherwise a new vehicle with a random plate
/// arrives.
///
/// # Example
///
/// ```no_run
/// use parkline_shared::messaging::EventPublisher;
/// use parkline_shared::presence::{PresenceTracker, RedisStore};
/// use parkline_shared::telemetry::Logger;
/// use parkline_worker::config::PipelineConfig;
/// use parkline_worker::generator::EventGenerator;
/// use std::sync::Arc;
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example(publisher: EventPublisher, tracker: Arc<PresenceTracker<RedisStore>>) -> anyhow::Result<()> {
/// let generator = EventGenerator::new(publisher, tracker, PipelineConfig::default(), 0.5, Logger::new("generator"));
/// generator.run(Duration::from_secs(1), CancellationToken::new()).await?;
/// # Ok(())
/// # }
/// ```

use chrono::Utc;
use parkline_shared::context::CallContext;
use parkline_shared::events::{EntryEvent, ExitEvent};
use parkline_shared::fatal::Severity;
use parkline_shared::messaging::{EventPublisher, PublishError};
use parkline_shared::presence::{PresenceError, PresenceStore, PresenceTracker};
use parkline_shared::telemetry::Logger;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::PipelineConfig;
use crate::handlers::STORE_CALL_TIMEOUT;

/// Generator errors
#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("Presence lookup failed: {0}")]
    Presence(#[from] PresenceError),

    #[error("Publish failed: {0}")]
    Publish(#[from] PublishError),
}

impl GeneratorError {
    /// Whether the broker connection is gone for good
    pub fn is_disconnected(&self) -> bool {
        matches!(
            self,
            GeneratorError::Publish(PublishError::NotConnected)
                | GeneratorError::Presence(PresenceError::NotConnected)
        )
    }
}

impl Severity for GeneratorError {
    fn is_fatal(&self) -> bool {
        match self {
            GeneratorError::Presence(e) => e.is_fatal(),
            GeneratorError::Publish(e) => e.is_fatal(),
        }
    }
}

/// Kind of event to generate next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Entry,
    Exit,
}

/// Picks the next event kind
///
/// Exits are only possible while something is parked.
pub fn choose_kind(parked: bool, draw: f64, exit_ratio: f64) -> EventKind {
    if parked && draw < exit_ratio {
        EventKind::Exit
    } else {
        EventKind::Entry
    }
}

/// Random plate like `KA01AB1234`
pub fn random_plate<R: Rng + ?Sized>(rng: &mut R) -> String {
    let mut plate = String::with_capacity(10);
    push_letters(&mut plate, rng, 2);
    plate.push_str(&format!("{:02}", rng.gen_range(0..100)));
    push_letters(&mut plate, rng, 2);
    plate.push_str(&format!("{:04}", rng.gen_range(0..10_000)));
    plate
}

fn push_letters<R: Rng + ?Sized>(plate: &mut String, rng: &mut R, count: usize) {
    for _ in 0..count {
        plate.push(char::from(rng.gen_range(b'A'..=b'Z')));
    }
}

/// Event chosen for one tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedEvent {
    Entry(EntryEvent),
    Exit(ExitEvent),
}

impl PlannedEvent {
    pub fn plate(&self) -> &str {
        match self {
            PlannedEvent::Entry(e) => &e.vehicle_plate,
            PlannedEvent::Exit(e) => &e.vehicle_plate,
        }
    }
}

/// Publishes synthetic traffic on a fixed interval
pub struct EventGenerator<S> {
    publisher: EventPublisher,
    tracker: Arc<PresenceTracker<S>>,
    pipeline: PipelineConfig,
    exit_ratio: f64,
    logger: Logger,
}

impl<S: PresenceStore> EventGenerator<S> {
    pub fn new(
        publisher: EventPublisher,
        tracker: Arc<PresenceTracker<S>>,
        pipeline: PipelineConfig,
        exit_ratio: f64,
        logger: Logger,
    ) -> Self {
        Self {
            publisher,
            tracker,
            pipeline,
            exit_ratio,
            logger,
        }
    }

    /// Ticks every `interval` until `shutdown` fires
    ///
    /// Recoverable failures are logged and the next tick goes ahead.
    ///
    /// # Errors
    ///
    /// Returns fatal errors and errors meaning a connection is closed.
    pub async fn run(
        &self,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> Result<(), GeneratorError> {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(parent: self.logger.span(), "Generator stopped");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }

            match self.tick().await {
                Ok(_) => {}
                Err(e) if e.is_fatal() || e.is_disconnected() => return Err(e),
                Err(e) => {
                    tracing::warn!(parent: self.logger.span(), error = %e, "Generator tick failed");
                }
            }
        }
    }

    /// Plans one event and publishes it to its queue
    pub async fn tick(&self) -> Result<PlannedEvent, GeneratorError> {
        let planned = self.plan().await?;
        match &planned {
            PlannedEvent::Entry(event) => {
                self.publisher.publish(&self.pipeline.entry_queue, event).await?
            }
            PlannedEvent::Exit(event) => {
                self.publisher.publish(&self.pipeline.exit_queue, event).await?
            }
        }
        Ok(planned)
    }

    /// Chooses the next event from the current presence set
    pub async fn plan(&self) -> Result<PlannedEvent, PresenceError> {
        plan_event(&self.tracker, &self.pipeline.presence_set, self.exit_ratio).await
    }
}

/// Chooses the next event for `presence_set`
///
/// A set emptied between the size check and the pick falls back to an entry.
pub async fn plan_event<S: PresenceStore>(
    tracker: &PresenceTracker<S>,
    presence_set: &str,
    exit_ratio: f64,
) -> Result<PlannedEvent, PresenceError> {
    let ctx = CallContext::background().with_timeout(STORE_CALL_TIMEOUT);
    let parked = tracker.is_not_empty(&ctx, presence_set).await?;
    let draw: f64 = rand::thread_rng().gen();

    if choose_kind(parked, draw, exit_ratio) == EventKind::Exit {
        match tracker.random_member(&ctx, presence_set).await {
            Ok(plate) => return Ok(PlannedEvent::Exit(ExitEvent::new(plate, Utc::now()))),
            Err(PresenceError::EmptySet(_)) => {}
            Err(e) => return Err(e),
        }
    }

    let plate = random_plate(&mut rand::thread_rng());
    Ok(PlannedEvent::Entry(EntryEvent::new(plate, Utc::now())))
}
