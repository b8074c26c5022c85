/// In-memory presence store for testing and demos
///
/// Implements [`PresenceStore`] over process-local maps with the same
/// observable semantics as the Redis backend: idempotent SADD/SREM, `None`
/// from SRANDMEMBER on an empty set, `None` from HGET on a missing field.
/// Empty sets disappear like Redis keys do.
///
/// # Example
///
/// ```no_run
/// use parkline_shared::presence::{MemoryStore, PresenceStore};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MemoryStore::new();
/// store.set_add("vehicles_parked", "KA01AB1234").await?;
/// assert_eq!(store.set_cardinality("vehicles_parked").await?, 1);
/// # Ok(())
/// # }
/// ```

use crate::presence::store::{PresenceStore, StoreError};
use async_trait::async_trait;
use rand::seq::IteratorRandom;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Keyspace {
    sets: HashMap<String, HashSet<String>>,
    hashes: HashMap<String, HashMap<String, String>>,
}

/// Process-local presence store
///
/// Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    keyspace: Arc<Mutex<Keyspace>>,
    closed: Arc<AtomicBool>,
}

impl MemoryStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later command fail with `StoreError::NotConnected`
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Whether the store is still usable
    pub fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    /// Current members of `set`, for assertions
    pub fn members(&self, set: &str) -> HashSet<String> {
        self.lock()
            .sets
            .get(set)
            .cloned()
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, Keyspace> {
        // A panicked writer cannot leave a half-applied command behind.
        self.keyspace
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn guard(&self) -> Result<MutexGuard<'_, Keyspace>, StoreError> {
        if self.is_connected() {
            Ok(self.lock())
        } else {
            Err(StoreError::NotConnected)
        }
    }
}

#[async_trait]
impl PresenceStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.guard().map(|_| ())
    }

    async fn set_cardinality(&self, set: &str) -> Result<u64, StoreError> {
        let keyspace = self.guard()?;
        Ok(keyspace.sets.get(set).map_or(0, |members| members.len() as u64))
    }

    async fn set_add(&self, set: &str, member: &str) -> Result<bool, StoreError> {
        let mut keyspace = self.guard()?;
        Ok(keyspace
            .sets
            .entry(set.to_string())
            .or_default()
            .insert(member.to_string()))
    }

    async fn set_remove(&self, set: &str, member: &str) -> Result<bool, StoreError> {
        let mut keyspace = self.guard()?;
        let Some(members) = keyspace.sets.get_mut(set) else {
            return Ok(false);
        };
        let removed = members.remove(member);
        if members.is_empty() {
            keyspace.sets.remove(set);
        }
        Ok(removed)
    }

    async fn set_random_member(&self, set: &str) -> Result<Option<String>, StoreError> {
        let keyspace = self.guard()?;
        Ok(keyspace
            .sets
            .get(set)
            .and_then(|members| members.iter().choose(&mut rand::thread_rng()).cloned()))
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        let mut keyspace = self.guard()?;
        keyspace
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let keyspace = self.guard()?;
        Ok(keyspace
            .hashes
            .get(key)
            .and_then(|fields| fields.get(field))
            .cloned())
    }
}
