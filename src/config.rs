use crate::schedule::{DEFAULT_MAX_CONFIRMED_UPDATES, DEFAULT_STALE_OVERRIDE_WARNING};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const ENV_BACKEND_URL: &str = "SCHEDULE_BOARD_BACKEND_URL";
pub const ENV_FILE: &str = "SCHEDULE_BOARD_FILE";
pub const ENV_HTTP_ADDR: &str = "SCHEDULE_BOARD_HTTP_ADDR";
pub const ENV_FETCH_TIMEOUT_MS: &str = "SCHEDULE_BOARD_FETCH_TIMEOUT_MS";
pub const ENV_CACHE_WINDOW_MS: &str = "SCHEDULE_BOARD_CACHE_WINDOW_MS";
pub const ENV_MAX_CONFIRMED: &str = "SCHEDULE_BOARD_MAX_CONFIRMED";
pub const ENV_STALE_WARNING: &str = "SCHEDULE_BOARD_STALE_WARNING";
pub const ENV_LOG: &str = "SCHEDULE_BOARD_LOG";
pub const ENV_LOG_JSON: &str = "SCHEDULE_BOARD_LOG_JSON";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid value '{value}' for {key}: {reason}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Base URL of the scheduling backend; takes precedence over `schedule_file`.
    pub backend_url: Option<String>,
    /// JSON schedule document served by the file backend.
    pub schedule_file: Option<PathBuf>,
    pub http_addr: SocketAddr,
    pub fetch_timeout: Duration,
    /// Fetches inside this window share one backend request.
    pub cache_window: Duration,
    pub max_confirmed_updates: usize,
    /// Mismatched fetches after which a still-overridden job is logged.
    pub stale_override_warning: u32,
    pub log_filter: String,
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: None,
            schedule_file: None,
            http_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            fetch_timeout: Duration::from_millis(10_000),
            cache_window: Duration::from_millis(3_000),
            max_confirmed_updates: DEFAULT_MAX_CONFIRMED_UPDATES,
            stale_override_warning: DEFAULT_STALE_OVERRIDE_WARNING,
            log_filter: "info".to_string(),
            log_json: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let text = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Ok(Self {
            backend_url: text(ENV_BACKEND_URL),
            schedule_file: text(ENV_FILE).map(PathBuf::from),
            http_addr: parse(ENV_HTTP_ADDR, text(ENV_HTTP_ADDR))?.unwrap_or(defaults.http_addr),
            fetch_timeout: parse::<u64>(ENV_FETCH_TIMEOUT_MS, text(ENV_FETCH_TIMEOUT_MS))?
                .map(Duration::from_millis)
                .unwrap_or(defaults.fetch_timeout),
            cache_window: parse::<u64>(ENV_CACHE_WINDOW_MS, text(ENV_CACHE_WINDOW_MS))?
                .map(Duration::from_millis)
                .unwrap_or(defaults.cache_window),
            max_confirmed_updates: parse(ENV_MAX_CONFIRMED, text(ENV_MAX_CONFIRMED))?
                .unwrap_or(defaults.max_confirmed_updates),
            stale_override_warning: parse(ENV_STALE_WARNING, text(ENV_STALE_WARNING))?
                .unwrap_or(defaults.stale_override_warning),
            log_filter: text(ENV_LOG).unwrap_or(defaults.log_filter),
            log_json: parse_bool(ENV_LOG_JSON, text(ENV_LOG_JSON))?.unwrap_or(defaults.log_json),
        })
    }
}

fn parse<T>(key: &'static str, value: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .map(|raw| {
            raw.parse::<T>().map_err(|err| ConfigError {
                key,
                value: raw.clone(),
                reason: err.to_string(),
            })
        })
        .transpose()
}

fn parse_bool(key: &'static str, value: Option<String>) -> Result<Option<bool>, ConfigError> {
    value
        .map(|raw| match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError {
                key,
                value: raw.clone(),
                reason: "expected a boolean".to_string(),
            }),
        })
        .transpose()
}
