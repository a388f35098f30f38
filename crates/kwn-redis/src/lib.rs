//! Redis-backed KeyValueStore for the dedup records.

use std::time::Duration;

use async_trait::async_trait;
use redis::{aio::MultiplexedConnection, AsyncCommands};
use tokio::sync::RwLock;
use tracing::{debug, info};

use kwn_core::{errors::Error, ports::KeyValueStore, Result};

pub struct RedisStore {
    client: redis::Client,
    conn: RwLock<Option<MultiplexedConnection>>,
}

impl RedisStore {
    /// Parse the URL. No connection is made until [`KeyValueStore::connect`].
    pub fn open(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).map_err(map_err)?;
        Ok(Self {
            client,
            conn: RwLock::new(None),
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection> {
        self.conn
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::Store("redis store is not connected".to_string()))
    }
}

fn map_err(e: redis::RedisError) -> Error {
    Error::Store(format!("redis: {e}"))
}

/// SETEX rejects a zero expiry; round sub-second TTLs up to one second.
fn ttl_seconds(ttl: Duration) -> u64 {
    let secs = ttl.as_secs();
    if ttl.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs.max(1)
    }
}

/// Values may come from other writers sharing the key prefix; bytes that are
/// not UTF-8 still count as a present record.
fn decode_value(raw: Option<Vec<u8>>) -> Option<String> {
    raw.map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn connect(&self) -> Result<()> {
        let mut guard = self.conn.write().await;
        if guard.is_some() {
            return Ok(());
        }
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(map_err)?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(map_err)?;
        *guard = Some(conn);
        info!("connected to redis");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.conn.write().await.take().is_some() {
            info!("redis connection closed");
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        let value: Option<Vec<u8>> = conn.get(key).await.map_err(map_err)?;
        Ok(decode_value(value))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.connection().await?;
        conn.set_ex::<_, _, ()>(key, value, ttl_seconds(ttl))
            .await
            .map_err(map_err)?;
        debug!(key, ttl_secs = ttl_seconds(ttl), "stored dedup record");
        Ok(())
    }
}
