/// Redis backend for presence tracking
///
/// Wraps a `redis::aio::ConnectionManager`, which multiplexes commands over
/// one connection and is cheap to clone. Connecting goes through the
/// [`ResilientConnector`]: each attempt opens a client and must answer PING
/// before it counts as connected.
///
/// [`RedisStore::close`] drops the store's connection manager. Every clone
/// shares it, so the TCP session ends once commands already in flight
/// finish, and every later command fails with `StoreError::NotConnected`.
///
/// # Example
///
/// ```no_run
/// use parkline_shared::config::StoreConfig;
/// use parkline_shared::connector::ResilientConnector;
/// use parkline_shared::presence::RedisStore;
/// use parkline_shared::telemetry::Logger;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = StoreConfig::from_env()?;
/// let connector = ResilientConnector::new(Logger::new("connector"));
/// let store = RedisStore::connect(config, &connector, Logger::new("store")).await?;
///
/// // ... use the store ...
///
/// store.close();
/// # Ok(())
/// # }
/// ```

use crate::config::StoreConfig;
use crate::connector::{ConnectError, ResilientConnector};
use crate::presence::store::{PresenceStore, StoreError};
use crate::telemetry::Logger;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, IntoConnectionInfo};
use std::sync::{Arc, RwLock};

/// Redis-backed presence store
#[derive(Clone)]
pub struct RedisStore {
    manager: Arc<RwLock<Option<ConnectionManager>>>,
    config: Arc<StoreConfig>,
    logger: Logger,
}

impl RedisStore {
    /// Connects to Redis, retrying on the connector's schedule
    ///
    /// # Errors
    ///
    /// Returns the connector's error once every attempt has failed. An
    /// invalid address fails each attempt the same way.
    pub async fn connect(
        config: StoreConfig,
        connector: &ResilientConnector,
        logger: Logger,
    ) -> Result<Self, ConnectError> {
        let target = format!("Redis at {}", config.redacted_url());

        let manager = connector
            .connect(&target, |_| open_and_ping(&config, &logger))
            .await?;

        Ok(Self {
            manager: Arc::new(RwLock::new(Some(manager))),
            config: Arc::new(config),
            logger,
        })
    }

    /// Store configuration
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Whether the store is still usable
    pub fn is_connected(&self) -> bool {
        self.manager
            .read()
            .map_or_else(|poisoned| poisoned.into_inner().is_some(), |guard| guard.is_some())
    }

    /// Drops the connection manager
    ///
    /// Closing twice is a no-op.
    pub fn close(&self) {
        let mut guard = self.manager.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        if guard.take().is_some() {
            tracing::info!(
                parent: self.logger.span(),
                url = %self.config.redacted_url(),
                "Redis store closed"
            );
        }
    }

    fn connection(&self) -> Result<ConnectionManager, StoreError> {
        let guard = self.manager.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.clone().ok_or(StoreError::NotConnected)
    }
}

async fn open_and_ping(
    config: &StoreConfig,
    logger: &Logger,
) -> Result<ConnectionManager, StoreError> {
    tracing::info!(parent: logger.span(), url = %config.redacted_url(), "Connecting to Redis");

    let mut info = config.url().as_str().into_connection_info()?;
    if !config.password.is_empty() {
        info.redis.password = Some(config.password.clone());
    }
    info.redis.db = config.database;

    let client = Client::open(info)?;
    let mut manager = ConnectionManager::new(client).await?;
    ping(&mut manager).await?;
    Ok(manager)
}

async fn ping(conn: &mut ConnectionManager) -> Result<(), StoreError> {
    let pong: String = redis::cmd("PING").query_async(conn).await?;
    if pong == "PONG" {
        Ok(())
    } else {
        Err(StoreError::UnexpectedPing(pong))
    }
}

#[async_trait]
impl PresenceStore for RedisStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection()?;
        ping(&mut conn).await
    }

    async fn set_cardinality(&self, set: &str) -> Result<u64, StoreError> {
        let mut conn = self.connection()?;
        Ok(conn.scard(set).await?)
    }

    async fn set_add(&self, set: &str, member: &str) -> Result<bool, StoreError> {
        let mut conn = self.connection()?;
        let added: i64 = conn.sadd(set, member).await?;
        Ok(added > 0)
    }

    async fn set_remove(&self, set: &str, member: &str) -> Result<bool, StoreError> {
        let mut conn = self.connection()?;
        let removed: i64 = conn.srem(set, member).await?;
        Ok(removed > 0)
    }

    async fn set_random_member(&self, set: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection()?;
        Ok(conn.srandmember(set).await?)
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.connection()?;
        let _: i64 = conn.hset(key, field, value).await?;
        Ok(())
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection()?;
        let value: Option<String> = conn.hget(key, field).await?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config() -> StoreConfig {
        StoreConfig {
            addr: std::env::var("REDIS_ADDR").unwrap_or_else(|_| "localhost:6379".to_string()),
            password: std::env::var("REDIS_PASSWORD").unwrap_or_default(),
            database: 15,
        }
    }

    #[tokio::test]
    #[ignore] // Requires running Redis instance
    async fn test_redis_store_set_commands() {
        let connector = ResilientConnector::new(Logger::disabled());
        let store = RedisStore::connect(local_config(), &connector, Logger::disabled())
            .await
            .unwrap();
        let set = format!("test_presence_{}", uuid::Uuid::new_v4());

        store.ping().await.unwrap();
        assert!(store.set_add(&set, "KA01AB1234").await.unwrap());
        assert!(!store.set_add(&set, "KA01AB1234").await.unwrap());
        assert_eq!(store.set_cardinality(&set).await.unwrap(), 1);
        assert_eq!(
            store.set_random_member(&set).await.unwrap().as_deref(),
            Some("KA01AB1234")
        );
        assert!(store.set_remove(&set, "KA01AB1234").await.unwrap());
        assert_eq!(store.set_random_member(&set).await.unwrap(), None);
    }

    #[tokio::test]
    #[ignore] // Requires running Redis instance
    async fn test_redis_store_closed_fails_fast() {
        let connector = ResilientConnector::new(Logger::disabled());
        let store = RedisStore::connect(local_config(), &connector, Logger::disabled())
            .await
            .unwrap();

        let clone = store.clone();
        store.close();
        store.close();
        assert!(!store.is_connected());
        assert!(!clone.is_connected());
        assert!(matches!(store.ping().await, Err(StoreError::NotConnected)));
        assert!(matches!(
            clone.set_cardinality("vehicles_parked").await,
            Err(StoreError::NotConnected)
        ));
        assert!(matches!(
            store.hash_get("vehicle:KA01AB1234", "entry_date_time").await,
            Err(StoreError::NotConnected)
        ));
    }
}
