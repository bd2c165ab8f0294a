use std::{env, fmt::Display, str::FromStr, time::Duration};

use crate::error::ConfigError;

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_TOKEN_MINUTES: i64 = 30;
const DEFAULT_CORS_ORIGINS: &str = "http://localhost:3000";
const DEFAULT_SEND_QUEUE: usize = 256;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub secret_key: String,
    pub access_token_expire_minutes: i64,
    /// Empty means mirror the request origin.
    pub cors_origins: Vec<String>,
    pub realtime: RealtimeConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealtimeConfig {
    /// Outbound frames buffered per connection before it counts as too slow.
    pub send_queue: usize,
    pub global_receives_poll_events: bool,
    pub idle_timeout: Option<Duration>,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            send_queue: DEFAULT_SEND_QUEUE,
            global_receives_poll_events: true,
            idle_timeout: None,
        }
    }
}

impl Config {
    /// Read the process environment, after loading `.env` if one exists.
    pub fn load() -> Result<Self, ConfigError> {
        if dotenvy::dotenv().is_err() {
            debug!("No .env file found, using process environment");
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let send_queue: usize = parse_or(&lookup, "WS_SEND_QUEUE", DEFAULT_SEND_QUEUE)?;
        if send_queue == 0 {
            return Err(ConfigError::Invalid {
                key: "WS_SEND_QUEUE",
                message: "must be greater than zero".to_string(),
            });
        }

        let idle_secs: u64 = parse_or(&lookup, "WS_IDLE_TIMEOUT_SECS", 0)?;

        Ok(Self {
            database_url: required(&lookup, "DATABASE_URL")?,
            port: parse_or(&lookup, "PORT", DEFAULT_PORT)?,
            secret_key: required(&lookup, "SECRET_KEY")?,
            access_token_expire_minutes: parse_or(
                &lookup,
                "ACCESS_TOKEN_EXPIRE_MINUTES",
                DEFAULT_TOKEN_MINUTES,
            )?,
            cors_origins: lookup("CORS_ORIGINS")
                .unwrap_or_else(|| DEFAULT_CORS_ORIGINS.to_string())
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(String::from)
                .collect(),
            realtime: RealtimeConfig {
                send_queue,
                global_receives_poll_events: parse_or(
                    &lookup,
                    "WS_GLOBAL_RECEIVES_POLL_EVENTS",
                    true,
                )?,
                idle_timeout: (idle_secs > 0).then(|| Duration::from_secs(idle_secs)),
            },
        })
    }
}

fn required<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|value| !value.trim().is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Display,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| {
            warn!("Invalid {key} value: {e}");
            ConfigError::Invalid {
                key,
                message: e.to_string(),
            }
        }),
        None => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}
