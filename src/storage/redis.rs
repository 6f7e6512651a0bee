//! Redis-backed store sharing one multiplexed connection.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, ConnectionAddr, ConnectionInfo, RedisConnectionInfo};

use super::{KeyValueStore, StoreError};
use crate::config::RedisConfig;

#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
}

impl RedisStore {
    /// Connects to Redis. The connection lives until [`RedisStore::close`]
    /// or until the last clone is dropped.
    pub async fn open(config: &RedisConfig) -> Result<Self, StoreError> {
        let info = ConnectionInfo {
            addr: ConnectionAddr::Tcp(config.host.clone(), config.port),
            redis: RedisConnectionInfo {
                db: config.db,
                username: config.user.clone(),
                password: config.password.clone(),
                ..Default::default()
            },
        };
        let client = redis::Client::open(info).map_err(unavailable)?;
        let conn = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(unavailable)?;
        log::info!("Connected to Redis at {}:{}", config.host, config.port);
        Ok(Self { conn })
    }

    pub fn close(self) {
        drop(self.conn);
        log::info!("Redis connection closed");
    }
}

fn unavailable(err: redis::RedisError) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(unavailable)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key, value).await.map_err(unavailable)
    }
}
