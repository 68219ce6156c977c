//! Configuration handling for the SQL gateway.
//!
//! This module provides configuration management via CLI arguments and environment variables.

use crate::models::DEFAULT_ROW_LIMIT;
use clap::Parser;
use std::time::Duration;

// Pool configuration defaults
pub const DEFAULT_MAX_PER_KEY: usize = 5;
pub const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_REAP_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Settings for the SQLite connection pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum live handles per (location, mode) key
    pub max_per_key: usize,
    pub acquire_timeout: Duration,
    /// Re-check interval while waiting for a handle
    pub poll_interval: Duration,
    /// Handles idle longer than this are closed by the reaper
    pub idle_timeout: Duration,
    pub reap_interval: Duration,
    /// SQLite busy-wait threshold applied to every handle
    pub busy_timeout: Duration,
    pub foreign_keys: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_per_key: DEFAULT_MAX_PER_KEY,
            acquire_timeout: Duration::from_millis(DEFAULT_ACQUIRE_TIMEOUT_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            reap_interval: Duration::from_secs(DEFAULT_REAP_INTERVAL_SECS),
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
            foreign_keys: true,
        }
    }
}

impl PoolConfig {
    /// Set the per-key capacity.
    pub fn with_max_per_key(mut self, max_per_key: usize) -> Self {
        self.max_per_key = max_per_key;
        self
    }

    /// Set the acquire timeout.
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Set the idle timeout.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the reaper period.
    pub fn with_reap_interval(mut self, interval: Duration) -> Self {
        self.reap_interval = interval;
        self
    }

    /// Validate pool settings and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_per_key == 0 {
            return Err("pool max_per_key must be greater than 0".to_string());
        }
        if self.poll_interval.is_zero() {
            return Err("pool poll interval must be greater than 0".to_string());
        }
        if self.reap_interval.is_zero() {
            return Err("pool reap interval must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Configuration for the SQL gateway.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "sql-gateway",
    about = "SQL query gateway for SQLite, PostgreSQL and MySQL, served as MCP tools",
    version,
    author
)]
pub struct Config {
    /// Default connection target for calls that do not pass database_url.
    /// Accepts sqlite:<path>, :memory:, <file>.db, postgres://... or mysql://...
    #[arg(short = 'd', long, value_name = "URL", env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Row bound applied to select-like statements when the caller passes none (0 = unbounded)
    #[arg(long, default_value_t = DEFAULT_ROW_LIMIT, env = "SQL_GATEWAY_DEFAULT_LIMIT")]
    pub default_limit: u32,

    /// Maximum pooled SQLite connections per database file and mode
    #[arg(long, default_value_t = DEFAULT_MAX_PER_KEY, env = "SQL_GATEWAY_POOL_MAX_PER_KEY")]
    pub pool_max_per_key: usize,

    /// Milliseconds to wait for a pooled connection before failing
    #[arg(
        long,
        default_value_t = DEFAULT_ACQUIRE_TIMEOUT_MS,
        env = "SQL_GATEWAY_POOL_ACQUIRE_TIMEOUT_MS"
    )]
    pub pool_acquire_timeout_ms: u64,

    /// Seconds an idle pooled connection is kept before being closed
    #[arg(
        long,
        default_value_t = DEFAULT_IDLE_TIMEOUT_SECS,
        env = "SQL_GATEWAY_POOL_IDLE_TIMEOUT_SECS"
    )]
    pub pool_idle_timeout_secs: u64,

    /// Seconds between idle-connection sweeps
    #[arg(
        long,
        default_value_t = DEFAULT_REAP_INTERVAL_SECS,
        env = "SQL_GATEWAY_POOL_REAP_INTERVAL_SECS"
    )]
    pub pool_reap_interval_secs: u64,

    /// SQLite busy timeout in milliseconds
    #[arg(long, default_value_t = DEFAULT_BUSY_TIMEOUT_MS, env = "SQL_GATEWAY_BUSY_TIMEOUT_MS")]
    pub busy_timeout_ms: u64,

    /// Disable SQLite foreign key enforcement
    #[arg(long, env = "SQL_GATEWAY_NO_FOREIGN_KEYS")]
    pub no_foreign_keys: bool,

    /// Additionally parse read-only statements and reject anything that is not a query
    #[arg(long, env = "SQL_GATEWAY_STRICT_SQL")]
    pub strict_sql: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "SQL_GATEWAY_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "SQL_GATEWAY_JSON_LOGS")]
    pub json_logs: bool,
}

impl Config {
    /// Create a default configuration (useful for testing).
    pub fn default_config() -> Self {
        Self {
            database_url: None,
            default_limit: DEFAULT_ROW_LIMIT,
            pool_max_per_key: DEFAULT_MAX_PER_KEY,
            pool_acquire_timeout_ms: DEFAULT_ACQUIRE_TIMEOUT_MS,
            pool_idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            pool_reap_interval_secs: DEFAULT_REAP_INTERVAL_SECS,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            no_foreign_keys: false,
            strict_sql: false,
            log_level: "info".to_string(),
            json_logs: false,
        }
    }

    /// Build and validate the pool settings.
    pub fn pool_config(&self) -> Result<PoolConfig, String> {
        let pool = PoolConfig {
            max_per_key: self.pool_max_per_key,
            acquire_timeout: Duration::from_millis(self.pool_acquire_timeout_ms),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            idle_timeout: Duration::from_secs(self.pool_idle_timeout_secs),
            reap_interval: Duration::from_secs(self.pool_reap_interval_secs),
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
            foreign_keys: !self.no_foreign_keys,
        };
        pool.validate()?;
        Ok(pool)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}
