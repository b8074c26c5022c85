/// Store backend seam for presence tracking
///
/// [`PresenceStore`] is the set of primitive commands the tracker needs.
/// Every method is a single round trip and is atomic at the store. Redis
/// provides the production backend; `MemoryStore` backs tests.

use async_trait::async_trait;
use thiserror::Error;

/// Store backend errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Connection was closed by its owner
    #[error("Store not connected")]
    NotConnected,

    /// Redis reported an error
    #[error("Redis command error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Health check got something other than PONG
    #[error("Unexpected health check response: {0}")]
    UnexpectedPing(String),
}

/// Primitive set and hash commands
#[async_trait]
pub trait PresenceStore: Send + Sync {
    /// PING
    async fn ping(&self) -> Result<(), StoreError>;

    /// SCARD: number of members in `set`
    async fn set_cardinality(&self, set: &str) -> Result<u64, StoreError>;

    /// SADD: returns whether `member` was newly added
    async fn set_add(&self, set: &str, member: &str) -> Result<bool, StoreError>;

    /// SREM: returns whether `member` was present
    async fn set_remove(&self, set: &str, member: &str) -> Result<bool, StoreError>;

    /// SRANDMEMBER: one random member, `None` when the set is empty
    async fn set_random_member(&self, set: &str) -> Result<Option<String>, StoreError>;

    /// HSET of a single field
    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError>;

    /// HGET: `None` when the field is absent
    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, StoreError>;
}
