use std::{env, fmt::Display, path::PathBuf, str::FromStr, time::Duration};

use tracing::{info, warn};

use crate::error::AppError;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:3001";
pub const DEFAULT_STATE_DIR: &str = ".scholar-browser";

/// Server-side settings. `DATABASE_URL` wins over `SCHOLARS_DATA_FILE`; one
/// of them must be present to serve.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_url: Option<String>,
    pub data_file: Option<PathBuf>,
    pub bind_addr: String,
    pub port: u16,
    pub max_connections: u32,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: non_empty_var("DATABASE_URL"),
            data_file: non_empty_var("SCHOLARS_DATA_FILE").map(PathBuf::from),
            bind_addr: non_empty_var("BIND_ADDR").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: try_load("PORT", 3001),
            max_connections: try_load("DB_MAX_CONNECTIONS", 5),
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    pub fn require_database_url(&self) -> Result<&str, AppError> {
        self.database_url.as_deref().ok_or_else(|| {
            AppError::Config("DATABASE_URL must be set to a Postgres instance".to_string())
        })
    }
}

/// Settings for the client commands that talk to a running API.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: String,
    pub state_dir: PathBuf,
    pub debounce: Duration,
}

impl ClientConfig {
    pub fn from_env() -> Self {
        let debounce_ms: u64 = try_load("FETCH_DEBOUNCE_MS", 400);
        Self {
            api_url: non_empty_var("SCHOLARS_API_URL")
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            state_dir: non_empty_var("SCHOLARS_STATE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR)),
            debounce: Duration::from_millis(debounce_ms),
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn try_load<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match non_empty_var(key) {
        None => {
            info!("{key} not set, using default: {default}");
            default
        }
        Some(raw) => parse_or_default(key, &raw, default),
    }
}

fn parse_or_default<T>(key: &str, raw: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    raw.parse().unwrap_or_else(|e| {
        warn!("Invalid {key} value {raw:?}: {e}, using default: {default}");
        default
    })
}
