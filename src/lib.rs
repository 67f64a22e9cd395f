pub mod config;
pub mod driver;
pub mod query;
pub mod session;
pub mod types;

use std::time::Duration;
use thiserror::Error;

pub use driver::{Connector, Driver, DriverError, RawResult};
pub use query::{QueryRequest, QueryResult, Row};
pub use session::{Pool, PoolConfig, PoolStats, PooledSession, Session, SessionId, TransactionState};
pub use types::Value;

#[derive(Error, Debug)]
pub enum SqlPoolError {
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Invalid transaction state: {0}")]
    State(String),

    #[error("Timed out after {0:?} waiting for a pooled session")]
    PoolTimeout(Duration),

    #[error("Pool exhausted: all {max_size} sessions are checked out")]
    PoolExhausted { max_size: usize },

    #[error("Pool is closed")]
    PoolClosed,

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, SqlPoolError>;

impl SqlPoolError {
    /// Whether a caller may reasonably retry the operation later
    pub fn is_retryable(&self) -> bool {
        matches!(self, SqlPoolError::PoolTimeout(_) | SqlPoolError::PoolExhausted { .. })
    }
}
