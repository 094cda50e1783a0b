//! Configuration system for Rondo.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $RONDO_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/rondo/config.toml
//!   3. ~/.config/rondo/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RondoConfig {
    pub broker: BrokerConfig,
    pub worker: WorkerConfig,
    pub client: ClientConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Listen address for clients and workers.
    pub host: String,
    pub port: u16,
    /// Status API port on 127.0.0.1. 0 = disabled.
    pub api_port: u16,
    /// How long the dispatcher waits on an empty queue before looping.
    pub poll_interval_ms: u64,
    /// Pause after finding no registered workers.
    pub empty_pool_backoff_ms: u64,
    /// Failed sends before a task is abandoned. 0 = retry forever.
    pub max_dispatch_attempts: u32,
    /// Deadline for the first frame on a new connection.
    pub handshake_timeout_secs: u64,
    /// Drop pending responses older than this. 0 = never.
    pub pending_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub broker_addr: String,
    /// Concurrent tasks per worker. 0 = available parallelism.
    pub pool_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub broker_addr: String,
    /// How long to wait for a result.
    pub timeout_secs: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9000,
            api_port: 9001,
            poll_interval_ms: 1000,
            empty_pool_backoff_ms: 500,
            max_dispatch_attempts: 8,
            handshake_timeout_secs: 10,
            pending_ttl_secs: 0,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            broker_addr: "127.0.0.1:9000".to_string(),
            pool_size: 4,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            broker_addr: "127.0.0.1:9000".to_string(),
            timeout_secs: 30,
        }
    }
}

// ── Derived values ────────────────────────────────────────────────────────────

impl BrokerConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn empty_pool_backoff(&self) -> Duration {
        Duration::from_millis(self.empty_pool_backoff_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn pending_ttl(&self) -> Option<Duration> {
        (self.pending_ttl_secs > 0).then(|| Duration::from_secs(self.pending_ttl_secs))
    }
}

impl WorkerConfig {
    /// Pool size with 0 resolved to the machine's parallelism.
    pub fn effective_pool_size(&self) -> usize {
        if self.pool_size == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.pool_size as usize
        }
    }
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
        .join("rondo")
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl RondoConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_file(&Self::file_path())?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse a config file, or return defaults if it does not exist.
    pub fn load_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(RondoConfig::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("RONDO_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&RondoConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply RONDO_* overrides. `lookup` is `std::env::var` outside tests.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        fn parsed<T: std::str::FromStr>(v: Option<String>) -> Option<T> {
            v.and_then(|s| s.trim().parse().ok())
        }

        if let Some(v) = lookup("RONDO_BROKER__HOST") {
            self.broker.host = v;
        }
        if let Some(p) = parsed(lookup("RONDO_BROKER__PORT")) {
            self.broker.port = p;
        }
        if let Some(p) = parsed(lookup("RONDO_BROKER__API_PORT")) {
            self.broker.api_port = p;
        }
        if let Some(n) = parsed(lookup("RONDO_BROKER__MAX_DISPATCH_ATTEMPTS")) {
            self.broker.max_dispatch_attempts = n;
        }
        if let Some(n) = parsed(lookup("RONDO_BROKER__PENDING_TTL_SECS")) {
            self.broker.pending_ttl_secs = n;
        }
        if let Some(v) = lookup("RONDO_WORKER__BROKER_ADDR") {
            self.worker.broker_addr = v;
        }
        if let Some(n) = parsed(lookup("RONDO_WORKER__POOL_SIZE")) {
            self.worker.pool_size = n;
        }
        if let Some(v) = lookup("RONDO_CLIENT__BROKER_ADDR") {
            self.client.broker_addr = v;
        }
        if let Some(n) = parsed(lookup("RONDO_CLIENT__TIMEOUT_SECS")) {
            self.client.timeout_secs = n;
        }
    }
}
