use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackendType {
    Csv,
    Sqlite,
}

/// Process configuration, loaded from the environment (and `.env`)
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub feed_url: String,
    pub activity: u32,
    pub currency: u32,
    pub output_dir: PathBuf,
    pub db_path: PathBuf,
    pub ping_interval: Duration,
    pub ping_timeout: Duration,
    pub reconnect_initial_secs: u64,
    pub reconnect_max_secs: u64,
    pub reconnect_max_retries: u32,
    pub channel_buffer: usize,
    pub rust_log: String,
}

#[derive(Debug)]
pub enum ConfigError {
    MissingVariable(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingVariable(var) => write!(f, "Missing environment variable: {}", var),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

fn var_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl RuntimeConfig {
    /// Environment variables:
    /// - `FEED_URL` (required, ws:// or wss://)
    /// - `FEED_ACTIVITY` (default: 30), `FEED_CURRENCY` (default: 87)
    /// - `OUTPUT_DIR` (default: data)
    /// - `CRASHFLOW_DB_PATH` (default: data/crashflow.db)
    /// - `PING_INTERVAL_SECS` (default: 10), `PING_TIMEOUT_SECS` (default: 5)
    /// - `RECONNECT_INITIAL_SECS` (default: 5), `RECONNECT_MAX_SECS` (default: 60)
    /// - `RECONNECT_MAX_RETRIES` (default: 10)
    /// - `CHANNEL_BUFFER` (default: 1000)
    /// - `RUST_LOG` (default: info)
    pub fn from_env() -> Result<Self, ConfigError> {
        let feed_url = env::var("FEED_URL")
            .map_err(|_| ConfigError::MissingVariable("FEED_URL".to_string()))?;

        if !feed_url.starts_with("ws://") && !feed_url.starts_with("wss://") {
            return Err(ConfigError::InvalidValue(
                "FEED_URL must start with ws:// or wss://".to_string(),
            ));
        }

        let ping_interval = Duration::from_secs(var_or("PING_INTERVAL_SECS", 10));
        let ping_timeout = Duration::from_secs(var_or("PING_TIMEOUT_SECS", 5));
        if ping_interval.is_zero() || ping_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "PING_INTERVAL_SECS and PING_TIMEOUT_SECS must be positive".to_string(),
            ));
        }

        let channel_buffer = var_or("CHANNEL_BUFFER", 1000usize);
        if channel_buffer == 0 {
            return Err(ConfigError::InvalidValue(
                "CHANNEL_BUFFER must be positive".to_string(),
            ));
        }

        Ok(Self {
            feed_url,
            activity: var_or("FEED_ACTIVITY", 30),
            currency: var_or("FEED_CURRENCY", 87),
            output_dir: env::var("OUTPUT_DIR")
                .unwrap_or_else(|_| "data".to_string())
                .into(),
            db_path: env::var("CRASHFLOW_DB_PATH")
                .unwrap_or_else(|_| "data/crashflow.db".to_string())
                .into(),
            ping_interval,
            ping_timeout,
            reconnect_initial_secs: var_or("RECONNECT_INITIAL_SECS", 5),
            reconnect_max_secs: var_or("RECONNECT_MAX_SECS", 60),
            reconnect_max_retries: var_or("RECONNECT_MAX_RETRIES", 10),
            channel_buffer,
            rust_log: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }

    pub fn parse_backend_from_args() -> BackendType {
        let args: Vec<String> = env::args().collect();
        Self::parse_backend(&args)
    }

    fn parse_backend(args: &[String]) -> BackendType {
        if let Some(idx) = args.iter().position(|x| x == "--backend") {
            match args.get(idx + 1).map(|s| s.as_str()) {
                Some("sqlite") => return BackendType::Sqlite,
                Some("csv") => return BackendType::Csv,
                Some(other) => log::warn!("Unknown backend '{}', using csv", other),
                None => {}
            }
        }

        BackendType::Csv // Default to CSV
    }
}
