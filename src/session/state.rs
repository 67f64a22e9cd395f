use std::fmt;
use uuid::Uuid;

/// Transaction state of a single session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionState {
    #[default]
    Idle,
    InTransaction,
    /// A statement failed inside the open transaction; only rollback is accepted
    Failed,
}

impl TransactionState {
    /// Check if the session is currently in a transaction
    pub fn in_transaction(&self) -> bool {
        matches!(self, TransactionState::InTransaction | TransactionState::Failed)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionState::Idle => "idle",
            TransactionState::InTransaction => "in transaction",
            TransactionState::Failed => "in failed transaction",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub(crate) fn new() -> Self {
        SessionId(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
