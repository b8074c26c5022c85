/// Presence tracking in the key/value store
///
/// This module keeps track of which vehicles are currently inside and when
/// they moved:
/// - Presence sets: `SADD` on entry, `SREM` on exit, `SCARD`/`SRANDMEMBER` to query
/// - Timed hashes: one hash per vehicle, one RFC 3339 field per transition
///
/// # Architecture
///
/// ```text
/// ┌──────────────────┐
/// │ PresenceTracker  │  logging, call contexts, time parsing, error kinds
/// └────────┬─────────┘
///          │ PresenceStore (one command per call)
///    ┌─────┴──────┐
///    ▼            ▼
/// RedisStore   MemoryStore
/// ```

pub mod error;
pub mod layout;
pub mod memory;
pub mod redis_store;
pub mod store;
pub mod tracker;

// Re-export common types for convenience
pub use error::PresenceError;
pub use layout::{format_timestamp, TimeLayout};
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use store::{PresenceStore, StoreError};
pub use tracker::PresenceTracker;

/// Presence set used by the pipeline when none is configured
pub const DEFAULT_PRESENCE_SET: &str = "vehicles_parked";
