// Module for session management
pub mod connection;
pub mod pool;
pub mod state;

pub use connection::Session;
pub use pool::{Pool, PoolConfig, PoolStats, PooledSession};
pub use state::{SessionId, TransactionState};
