/// Presence tracking on top of a store backend
///
/// [`PresenceTracker`] maintains which entities are currently present
/// (presence sets) and when they last changed state (timed hashes). Each
/// operation is exactly one store round trip, so atomicity is whatever the
/// store guarantees per command. Nothing is cached locally.
///
/// Every operation takes a [`CallContext`]; the call is abandoned when the
/// context is cancelled or its deadline passes.
///
/// # Example
///
/// ```no_run
/// use parkline_shared::context::CallContext;
/// use parkline_shared::presence::{MemoryStore, PresenceTracker, TimeLayout};
/// use parkline_shared::telemetry::Logger;
/// use chrono::Utc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let tracker = PresenceTracker::new(MemoryStore::new(), Logger::new("presence"));
/// let ctx = CallContext::background();
///
/// tracker.add(&ctx, "vehicles_parked", "KA01AB1234").await?;
/// tracker.set_hash_field(&ctx, "vehicle:KA01AB1234", "entry_date_time", Utc::now()).await?;
///
/// if tracker.is_not_empty(&ctx, "vehicles_parked").await? {
///     let plate = tracker.random_member(&ctx, "vehicles_parked").await?;
///     let entered = tracker
///         .get_hash_field_as_time(&ctx, &format!("vehicle:{}", plate), "entry_date_time", &TimeLayout::Rfc3339)
///         .await?;
///     println!("{} parked since {}", plate, entered);
/// }
/// # Ok(())
/// # }
/// ```

use crate::context::CallContext;
use crate::presence::error::PresenceError;
use crate::presence::layout::{format_timestamp, TimeLayout};
use crate::presence::store::PresenceStore;
use crate::telemetry::Logger;
use chrono::{DateTime, Utc};

/// Presence sets and timed hashes
pub struct PresenceTracker<S> {
    store: S,
    logger: Logger,
}

impl<S: PresenceStore> PresenceTracker<S> {
    /// Creates a tracker over `store`
    pub fn new(store: S, logger: Logger) -> Self {
        Self { store, logger }
    }

    /// Underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Checks the store is reachable
    pub async fn ping(&self, ctx: &CallContext) -> Result<(), PresenceError> {
        ctx.run(self.store.ping()).await??;
        Ok(())
    }

    /// Number of members in `set`
    pub async fn cardinality(&self, ctx: &CallContext, set: &str) -> Result<u64, PresenceError> {
        match ctx.run(self.store.set_cardinality(set)).await? {
            Ok(count) => {
                tracing::debug!(
                    parent: self.logger.span(),
                    set = %set,
                    count,
                    "{} items available in set {}",
                    count,
                    set
                );
                Ok(count)
            }
            Err(e) => {
                tracing::error!(
                    parent: self.logger.span(),
                    set = %set,
                    error = %e,
                    "Error checking set size"
                );
                Err(e.into())
            }
        }
    }

    /// Whether `set` has at least one member
    pub async fn is_not_empty(&self, ctx: &CallContext, set: &str) -> Result<bool, PresenceError> {
        Ok(self.cardinality(ctx, set).await? > 0)
    }

    /// Adds `member` to `set`; adding an existing member is a no-op
    pub async fn add(
        &self,
        ctx: &CallContext,
        set: &str,
        member: &str,
    ) -> Result<(), PresenceError> {
        match ctx.run(self.store.set_add(set, member)).await? {
            Ok(added) => {
                tracing::debug!(
                    parent: self.logger.span(),
                    set = %set,
                    member = %member,
                    added,
                    "Added to set"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    parent: self.logger.span(),
                    set = %set,
                    member = %member,
                    error = %e,
                    "Failed to add member to set"
                );
                Err(e.into())
            }
        }
    }

    /// Removes `member` from `set`; removing a non-member is a no-op
    pub async fn remove(
        &self,
        ctx: &CallContext,
        set: &str,
        member: &str,
    ) -> Result<(), PresenceError> {
        match ctx.run(self.store.set_remove(set, member)).await? {
            Ok(removed) => {
                tracing::debug!(
                    parent: self.logger.span(),
                    set = %set,
                    member = %member,
                    removed,
                    "Removed from set"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    parent: self.logger.span(),
                    set = %set,
                    member = %member,
                    error = %e,
                    "Failed to remove member from set"
                );
                Err(e.into())
            }
        }
    }

    /// A uniformly random current member of `set`
    ///
    /// # Errors
    ///
    /// Returns `PresenceError::EmptySet` if `set` has no members.
    pub async fn random_member(
        &self,
        ctx: &CallContext,
        set: &str,
    ) -> Result<String, PresenceError> {
        ctx.run(self.store.set_random_member(set))
            .await??
            .ok_or_else(|| PresenceError::EmptySet(set.to_string()))
    }

    /// Records `time` under `field` of hash `key`
    pub async fn set_hash_field(
        &self,
        ctx: &CallContext,
        key: &str,
        field: &str,
        time: DateTime<Utc>,
    ) -> Result<(), PresenceError> {
        let value = format_timestamp(&time);
        match ctx.run(self.store.hash_set(key, field, &value)).await? {
            Ok(()) => {
                tracing::debug!(
                    parent: self.logger.span(),
                    key = %key,
                    field = %field,
                    value = %value,
                    "Hash field set"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    parent: self.logger.span(),
                    key = %key,
                    field = %field,
                    error = %e,
                    "Error setting hash field"
                );
                Err(e.into())
            }
        }
    }

    /// Reads `field` of hash `key` and parses it with `layout`
    ///
    /// # Errors
    ///
    /// - `PresenceError::FieldAbsent` if the hash or field does not exist
    /// - `PresenceError::MalformedValue` if the value does not parse
    pub async fn get_hash_field_as_time(
        &self,
        ctx: &CallContext,
        key: &str,
        field: &str,
        layout: &TimeLayout,
    ) -> Result<DateTime<Utc>, PresenceError> {
        let value = ctx
            .run(self.store.hash_get(key, field))
            .await??
            .ok_or_else(|| PresenceError::FieldAbsent {
                key: key.to_string(),
                field: field.to_string(),
            })?;

        layout.parse(&value).map_err(|source| PresenceError::MalformedValue {
            key: key.to_string(),
            field: field.to_string(),
            value,
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::memory::MemoryStore;
    use chrono::TimeZone;

    fn tracker() -> PresenceTracker<MemoryStore> {
        PresenceTracker::new(MemoryStore::new(), Logger::disabled())
    }

    #[tokio::test]
    async fn test_cardinality_counts_members() {
        let tracker = tracker();
        let ctx = CallContext::background();

        assert_eq!(tracker.cardinality(&ctx, "s").await.unwrap(), 0);
        tracker.add(&ctx, "s", "a").await.unwrap();
        tracker.add(&ctx, "s", "b").await.unwrap();
        assert_eq!(tracker.cardinality(&ctx, "s").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_set_hash_field_stores_rfc3339() {
        let tracker = tracker();
        let ctx = CallContext::background();
        let time = Utc.with_ymd_and_hms(2025, 1, 4, 12, 0, 0).unwrap();

        tracker.set_hash_field(&ctx, "vehicle:1", "entered", time).await.unwrap();

        let raw = tracker.store().hash_get("vehicle:1", "entered").await.unwrap();
        assert_eq!(raw.as_deref(), Some("2025-01-04T12:00:00Z"));
    }

    #[tokio::test]
    async fn test_cancelled_context_short_circuits() {
        let tracker = tracker();
        let token = tokio_util::sync::CancellationToken::new();
        token.cancel();
        let ctx = CallContext::new(token);

        assert!(matches!(
            tracker.add(&ctx, "s", "a").await,
            Err(PresenceError::Cancelled)
        ));
        assert!(tracker.store().members("s").is_empty());
    }
}
