//! Key-value persistence for user preferences and session state.

pub mod memory;
pub mod redis;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::session::{SessionState, UserId};

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Plain text key-value service.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

fn genre_key(user: UserId) -> String {
    format!("user:{}:genre", user)
}

fn session_key(user: UserId) -> String {
    format!("user:{}:session", user)
}

/// Genre chosen by each user. Survives restarts of the bot.
#[derive(Clone)]
pub struct PreferenceStore {
    kv: Arc<dyn KeyValueStore>,
}

impl PreferenceStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    pub async fn get(&self, user: UserId) -> Result<Option<String>, StoreError> {
        self.kv.get(&genre_key(user)).await
    }

    pub async fn set(&self, user: UserId, genre: &str) -> Result<(), StoreError> {
        self.kv.set(&genre_key(user), genre).await
    }
}

#[derive(Clone)]
pub struct SessionStore {
    kv: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Users we have never seen start out idle. An unreadable record is
    /// treated the same way.
    pub async fn load(&self, user: UserId) -> Result<SessionState, StoreError> {
        let Some(raw) = self.kv.get(&session_key(user)).await? else {
            return Ok(SessionState::default());
        };
        match serde_json::from_str(&raw) {
            Ok(state) => Ok(state),
            Err(err) => {
                log::warn!("Discarding unreadable session of user {user}: {err}");
                Ok(SessionState::default())
            }
        }
    }

    pub async fn save(&self, user: UserId, state: &SessionState) -> Result<(), StoreError> {
        let raw = serde_json::to_string(state)
            .map_err(|e| StoreError::Unavailable(format!("cannot encode session: {e}")))?;
        self.kv.set(&session_key(user), &raw).await
    }
}
