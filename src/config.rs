//! Server configuration.
//!
//! Configuration is read once at startup from an optional YAML file and then
//! overridden by environment variables. It is immutable afterwards.
//!
//! ```yaml
//! server:
//!   listen_addr: "0.0.0.0:8080"
//!   doc_root: "/srv/www"
//!   workers: 8
//!   queue_capacity: 10000
//!   timeslot_ms: 5000
//! log:
//!   level: debug
//!   non_blocking: true
//! ```

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Number of alarm intervals a connection may stay idle before eviction.
pub const IDLE_TIMESLOTS: u32 = 3;

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub log: LogConfig,
}

/// Listener, document root, and capacity settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind, as `host:port`
    pub listen_addr: String,
    /// Directory request targets are appended to
    pub doc_root: PathBuf,
    /// Number of worker threads running request processing
    pub workers: usize,
    /// Maximum number of connections waiting for a worker
    pub queue_capacity: usize,
    /// Maximum number of live connections
    pub max_connections: usize,
    /// Interval between idle sweeps, in milliseconds
    pub timeslot_ms: u64,
    /// Maximum number of readiness events drained per wait
    pub max_events: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    /// Buffer log lines and write them from a background thread
    pub non_blocking: bool,
    pub ansi: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            doc_root: PathBuf::from("./www"),
            workers: 8,
            queue_capacity: 10_000,
            max_connections: 10_000,
            timeslot_ms: 5_000,
            max_events: 10_000,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            non_blocking: false,
            ansi: true,
        }
    }
}

impl Config {
    /// Loads configuration from `path` (if any) and the environment.
    ///
    /// Recognized environment variables: `LISTEN`, `DOC_ROOT`, `WORKERS`,
    /// `QUEUE_CAPACITY`, `MAX_CONNECTIONS`, `TIMESLOT_MS`, `LOG_LEVEL`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut cfg = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_yaml_str(&text)?
            }
            None => Self::default(),
        };

        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parses a YAML document. Missing fields take their defaults.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(addr) = std::env::var("LISTEN") {
            self.server.listen_addr = addr;
        }
        if let Ok(root) = std::env::var("DOC_ROOT") {
            self.server.doc_root = PathBuf::from(root);
        }
        if let Some(n) = env_number("WORKERS")? {
            self.server.workers = n as usize;
        }
        if let Some(n) = env_number("QUEUE_CAPACITY")? {
            self.server.queue_capacity = n as usize;
        }
        if let Some(n) = env_number("MAX_CONNECTIONS")? {
            self.server.max_connections = n as usize;
        }
        if let Some(n) = env_number("TIMESLOT_MS")? {
            self.server.timeslot_ms = n;
        }
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.log.level = level;
        }
        Ok(())
    }

    /// Rejects settings the server cannot start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let server = &self.server;

        if server.listen_addr.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "listen_addr {:?} is not a socket address",
                server.listen_addr
            )));
        }
        if server.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if server.queue_capacity == 0 {
            return Err(ConfigError::Invalid("queue_capacity must be at least 1".into()));
        }
        if server.max_connections == 0 {
            return Err(ConfigError::Invalid("max_connections must be at least 1".into()));
        }
        if server.timeslot_ms == 0 {
            return Err(ConfigError::Invalid("timeslot_ms must be at least 1".into()));
        }
        if server.max_events == 0 {
            return Err(ConfigError::Invalid("max_events must be at least 1".into()));
        }
        Ok(())
    }
}

impl ServerConfig {
    pub fn timeslot(&self) -> Duration {
        Duration::from_millis(self.timeslot_ms)
    }

    /// How long a connection may stay idle before the sweep evicts it.
    pub fn idle_timeout(&self) -> Duration {
        self.timeslot() * IDLE_TIMESLOTS
    }
}

fn env_number(key: &str) -> Result<Option<u64>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(format!("{key}={value:?} is not a number"))),
        Err(_) => Ok(None),
    }
}
