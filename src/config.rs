//! Settings read from the environment (and `.env`, if present).

use std::env;

use thiserror::Error;

const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_SUPPORT_CONTACT: &str = "Questions or ideas? Write to the bot maintainer.";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required setting {0} is not set")]
    Missing(&'static str),
    #[error("setting {name} has an invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub storage: StorageBackend,
    pub support_contact: String,
}

/// Where preferences and sessions live. `STORAGE=memory` keeps them in the
/// process, which is handy for local runs without Redis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Redis(RedisConfig),
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub db: i64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "redis".to_string(),
            port: 6379,
            user: Some("default".to_string()),
            password: None,
            db: 0,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from an arbitrary variable source. Empty values
    /// count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let required = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let storage = match get("STORAGE").as_deref().map(str::trim) {
            None | Some("redis") => {
                let defaults = RedisConfig::default();
                StorageBackend::Redis(RedisConfig {
                    host: get("REDIS_HOST").unwrap_or(defaults.host),
                    port: parse_or("REDIS_PORT", get("REDIS_PORT"), defaults.port)?,
                    user: get("REDIS_USER").or(defaults.user),
                    password: get("REDIS_PASSWORD"),
                    db: parse_or("REDIS_DB", get("REDIS_DB"), defaults.db)?,
                })
            }
            Some("memory") => StorageBackend::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "STORAGE",
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            bot_token: required("BOT_TOKEN")?,
            gemini_api_key: required("GEMINI_API_KEY")?,
            gemini_model: get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            storage,
            support_contact: get("SUPPORT_CONTACT")
                .unwrap_or_else(|| DEFAULT_SUPPORT_CONTACT.to_string()),
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    name: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}
