use crate::session::PoolConfig;
use crate::{Result, SqlPoolError};
use clap::Parser;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "sqlpool")]
#[command(about = "sqlpool - run statements through a pooled, transaction-aware SQLite session", long_about = None)]
pub struct Config {
    // Basic configuration
    #[arg(short, long, default_value = "sqlite.db", env = "SQLPOOL_DATABASE")]
    pub database: String,

    #[arg(long, default_value = "info", env = "SQLPOOL_LOG_LEVEL")]
    pub log_level: String,

    // Pool configuration
    #[arg(long, default_value = "10", env = "SQLPOOL_POOL_SIZE", help = "Maximum number of open sessions")]
    pub pool_size: usize,

    #[arg(long, default_value = "0", env = "SQLPOOL_MIN_IDLE", help = "Sessions opened at startup")]
    pub min_idle: usize,

    #[arg(long, default_value = "30000", env = "SQLPOOL_ACQUIRE_TIMEOUT_MS", help = "How long to wait for a free session; 0 fails immediately when the pool is exhausted")]
    pub acquire_timeout_ms: u64,

    #[arg(long, default_value = "600", env = "SQLPOOL_IDLE_TIMEOUT_SECS", help = "Evict sessions idle longer than this; 0 disables eviction")]
    pub idle_timeout_secs: u64,

    // SQLite settings
    #[arg(long, default_value = "5000", env = "SQLPOOL_BUSY_TIMEOUT_MS", help = "SQLite busy timeout in milliseconds")]
    pub busy_timeout_ms: u64,

    #[arg(long, default_value = "WAL", env = "SQLPOOL_JOURNAL_MODE", help = "SQLite journal mode (WAL, DELETE, TRUNCATE, etc.)")]
    pub journal_mode: String,

    // Statements
    #[arg(short = 'e', long = "execute", help = "Statement to run; repeat to run several on the same session")]
    pub execute: Vec<String>,

    #[arg(short, long = "param", help = "Positional parameter bound to every statement (integer, YYYY-MM-DD date, null or text)")]
    pub params: Vec<String>,

    #[arg(short, long, help = "Wrap the statements in one transaction, rolling back on the first failure")]
    pub transaction: bool,
}

impl Config {
    /// Get a configuration instance with all values resolved from CLI args and environment variables
    pub fn load() -> Self {
        Config::parse()
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Validated pool settings
    pub fn pool_config(&self) -> Result<PoolConfig> {
        let config = PoolConfig {
            max_size: self.pool_size,
            min_idle: self.min_idle,
            acquire_timeout: self.acquire_timeout(),
            idle_timeout: self.idle_timeout(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.is_empty() {
            return Err(SqlPoolError::Config("database path must not be empty".to_string()));
        }
        self.pool_config().map(|_| ())
    }
}
