use std::{env, fmt::Display, str::FromStr};

use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("environment variable {0} is required")]
    Missing(&'static str),
    #[error("invalid {key} value: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_pool_size: usize,
    pub bind_addr: String,
    pub jwt_secret: String,
    pub token_ttl_seconds: i64,
    pub webhook_secret: String,
    pub webhook_tolerance_seconds: i64,
    pub menu_cache_path: String,
    pub menu_cache_ttl_seconds: u64,
    pub settings_cache_ttl_seconds: u64,
    pub notification_timeout_ms: u64,
    pub pickup_reminder_after_minutes: i64,
    pub pickup_reminder_window_minutes: i64,
    pub phone_country_code: String,
    /// Expose dependency error details in responses.
    pub debug: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::with_secrets(
            &required("DATABASE_URL")?,
            &required("JWT_SECRET")?,
            &required("WEBHOOK_SECRET")?,
        );
        config.database_pool_size = try_load("DATABASE_POOL_SIZE", "10")?;
        config.bind_addr = try_load("BIND_ADDR", "0.0.0.0:8100")?;
        config.token_ttl_seconds = try_load("TOKEN_TTL_SECONDS", "28800")?;
        config.webhook_tolerance_seconds = try_load("WEBHOOK_TOLERANCE_SECONDS", "300")?;
        config.menu_cache_path = try_load("MENU_CACHE_PATH", "/tmp/bistro-menu.json")?;
        config.menu_cache_ttl_seconds = try_load("MENU_CACHE_TTL_SECONDS", "300")?;
        config.settings_cache_ttl_seconds = try_load("SETTINGS_CACHE_TTL_SECONDS", "60")?;
        config.notification_timeout_ms = try_load("NOTIFICATION_TIMEOUT_MS", "5000")?;
        config.pickup_reminder_after_minutes = try_load("PICKUP_REMINDER_AFTER_MINUTES", "20")?;
        config.pickup_reminder_window_minutes = try_load("PICKUP_REMINDER_WINDOW_MINUTES", "30")?;
        config.phone_country_code = try_load("PHONE_COUNTRY_CODE", "27")?;
        config.debug = try_load("APP_DEBUG", "false")?;
        if config.debug {
            warn!("APP_DEBUG is on, dependency errors are exposed to clients");
        }
        Ok(config)
    }

    /// Defaults for everything except the secrets.
    pub fn with_secrets(database_url: &str, jwt_secret: &str, webhook_secret: &str) -> Self {
        Self {
            database_url: database_url.to_string(),
            database_pool_size: 10,
            bind_addr: "0.0.0.0:8100".to_string(),
            jwt_secret: jwt_secret.to_string(),
            token_ttl_seconds: 28800,
            webhook_secret: webhook_secret.to_string(),
            webhook_tolerance_seconds: 300,
            menu_cache_path: "/tmp/bistro-menu.json".to_string(),
            menu_cache_ttl_seconds: 300,
            settings_cache_ttl_seconds: 60,
            notification_timeout_ms: 5000,
            pickup_reminder_after_minutes: 20,
            pickup_reminder_window_minutes: 30,
            phone_country_code: "27".to_string(),
            debug: false,
        }
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn try_load<T: FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    env::var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .trim()
        .parse()
        .map_err(|e: T::Err| {
            warn!("Invalid {key} value: {e}");
            ConfigError::Invalid {
                key,
                reason: e.to_string(),
            }
        })
}
