/// Entry and exit message handlers
///
/// Each handler decodes one event body and applies it to the presence
/// state: the presence set says who is inside, the per-vehicle hash says
/// when they moved.
///
/// ```text
/// entry queue ──> EntryHandler ──> SADD vehicles_parked <plate>
///                                  HSET vehicle:<plate> entry_date_time <time>
///
/// exit queue  ──> ExitHandler  ──> SREM vehicles_parked <plate>
///                                  HSET vehicle:<plate> exit_date_time <time>
/// ```
///
/// A body that does not decode is a handler error and goes through the
/// consumer's failure policy like any other.

use anyhow::Context;
use async_trait::async_trait;
use parkline_shared::context::CallContext;
use parkline_shared::events::{decode, EntryEvent, ExitEvent};
use parkline_shared::messaging::MessageHandler;
use parkline_shared::presence::{PresenceStore, PresenceTracker};
use parkline_shared::telemetry::Logger;
use std::sync::Arc;
use std::time::Duration;

/// Hash field holding the last entry time
pub const ENTRY_TIME_FIELD: &str = "entry_date_time";

/// Hash field holding the last exit time
pub const EXIT_TIME_FIELD: &str = "exit_date_time";

/// Upper bound for the store calls made per message
pub const STORE_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Key of the timed hash for `plate`
pub fn vehicle_hash_key(plate: &str) -> String {
    format!("vehicle:{}", plate)
}

/// Applies entry events
pub struct EntryHandler<S> {
    tracker: Arc<PresenceTracker<S>>,
    presence_set: String,
    logger: Logger,
}

impl<S: PresenceStore> EntryHandler<S> {
    pub fn new(
        tracker: Arc<PresenceTracker<S>>,
        presence_set: impl Into<String>,
        logger: Logger,
    ) -> Self {
        Self {
            tracker,
            presence_set: presence_set.into(),
            logger,
        }
    }
}

#[async_trait]
impl<S: PresenceStore + 'static> MessageHandler for EntryHandler<S> {
    async fn process_message(&self, body: &[u8]) -> anyhow::Result<()> {
        let event: EntryEvent = decode(body).context("Failed to decode entry event")?;
        let ctx = CallContext::background().with_timeout(STORE_CALL_TIMEOUT);
        let key = vehicle_hash_key(&event.vehicle_plate);

        self.tracker
            .add(&ctx, &self.presence_set, &event.vehicle_plate)
            .await
            .with_context(|| format!("Failed to mark {} as parked", event.vehicle_plate))?;
        self.tracker
            .set_hash_field(&ctx, &key, ENTRY_TIME_FIELD, event.entry_date_time)
            .await
            .with_context(|| format!("Failed to record entry time for {}", event.vehicle_plate))?;

        tracing::info!(
            parent: self.logger.span(),
            event_id = %event.id,
            plate = %event.vehicle_plate,
            at = %event.entry_date_time,
            "Vehicle entered"
        );
        Ok(())
    }
}

/// Applies exit events
pub struct ExitHandler<S> {
    tracker: Arc<PresenceTracker<S>>,
    presence_set: String,
    logger: Logger,
}

impl<S: PresenceStore> ExitHandler<S> {
    pub fn new(
        tracker: Arc<PresenceTracker<S>>,
        presence_set: impl Into<String>,
        logger: Logger,
    ) -> Self {
        Self {
            tracker,
            presence_set: presence_set.into(),
            logger,
        }
    }
}

#[async_trait]
impl<S: PresenceStore + 'static> MessageHandler for ExitHandler<S> {
    async fn process_message(&self, body: &[u8]) -> anyhow::Result<()> {
        let event: ExitEvent = decode(body).context("Failed to decode exit event")?;
        let ctx = CallContext::background().with_timeout(STORE_CALL_TIMEOUT);
        let key = vehicle_hash_key(&event.vehicle_plate);

        self.tracker
            .remove(&ctx, &self.presence_set, &event.vehicle_plate)
            .await
            .with_context(|| format!("Failed to mark {} as gone", event.vehicle_plate))?;
        self.tracker
            .set_hash_field(&ctx, &key, EXIT_TIME_FIELD, event.exit_date_time)
            .await
            .with_context(|| format!("Failed to record exit time for {}", event.vehicle_plate))?;

        tracing::info!(
            parent: self.logger.span(),
            event_id = %event.id,
            plate = %event.vehicle_plate,
            at = %event.exit_date_time,
            "Vehicle exited"
        );
        Ok(())
    }
}
