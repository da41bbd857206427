use crate::domain::Decimal;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    /// Decay applied to listings created without an explicit rate.
    pub default_decay_rate_per_hour: Decimal,
    /// Upper bound on waiting for another purchase of the same listing to finish.
    pub purchase_lock_timeout: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = env_map
            .get("PORT")
            .map(|s| s.as_str())
            .unwrap_or("7266")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let default_decay_rate_per_hour = env_map
            .get("DECAY_RATE_PER_HOUR")
            .map(|s| s.as_str())
            .unwrap_or("1")
            .parse::<Decimal>()
            .ok()
            .filter(|rate| rate.is_positive())
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "DECAY_RATE_PER_HOUR".to_string(),
                    "must be a decimal greater than 0".to_string(),
                )
            })?;

        let purchase_lock_timeout_ms = env_map
            .get("PURCHASE_LOCK_TIMEOUT_MS")
            .map(|s| s.as_str())
            .unwrap_or("5000")
            .parse::<u64>()
            .ok()
            .filter(|ms| *ms > 0)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "PURCHASE_LOCK_TIMEOUT_MS".to_string(),
                    "must be a positive integer".to_string(),
                )
            })?;

        Ok(Config {
            port,
            database_path,
            default_decay_rate_per_hour,
            purchase_lock_timeout: Duration::from_millis(purchase_lock_timeout_ms),
        })
    }
}
