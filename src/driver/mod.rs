//! The lower-level driver capability the pool is built on.
//!
//! A [`Connector`] opens physical connections; each one is a [`Driver`] that
//! can execute statements and drive a transaction. SQL text and parameters are
//! handed through unchanged.

pub mod sqlite;

use crate::types::Value;
use async_trait::async_trait;
use thiserror::Error;

pub use sqlite::{SqliteConnector, SqliteDriver};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DriverError {
    /// The statement or transaction command was rejected; the connection is still usable.
    #[error("statement failed: {0}")]
    Statement(String),

    /// The physical connection is gone or unusable.
    #[error("connection failed: {0}")]
    Connection(String),
}

impl DriverError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, DriverError::Connection(_))
    }
}

/// Unnormalized response to a single statement
#[derive(Debug, Clone, PartialEq)]
pub enum RawResult {
    /// Row-returning statement. Every row holds one value per column, in column order.
    Rows {
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
    },
    /// Data-modifying statement
    Count(u64),
}

#[async_trait]
pub trait Driver: Send + 'static {
    async fn execute_statement(&mut self, sql: &str, params: &[Value]) -> Result<RawResult, DriverError>;

    async fn begin_transaction(&mut self) -> Result<(), DriverError>;

    async fn commit(&mut self) -> Result<(), DriverError>;

    async fn rollback(&mut self) -> Result<(), DriverError>;

    async fn close(&mut self) -> Result<(), DriverError>;

    /// Whether the connection has a transaction open, however it was started
    fn in_transaction(&self) -> bool;
}

/// Opens new physical connections on behalf of the pool
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Driver: Driver;

    async fn connect(&self) -> Result<Self::Driver, DriverError>;
}
