use crate::driver::Driver;
use crate::query::{normalize, QueryRequest, QueryResult};
use crate::session::state::{SessionId, TransactionState};
use crate::types::Value;
use crate::{Result, SqlPoolError};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// One physical driver connection with explicit transaction state
pub struct Session<D: Driver> {
    id: SessionId,
    driver: Option<D>,
    state: TransactionState,
    last_used: Instant,
    broken: bool,
}

impl<D: Driver> Session<D> {
    pub fn new(driver: D) -> Self {
        Session {
            id: SessionId::new(),
            driver: Some(driver),
            state: TransactionState::Idle,
            last_used: Instant::now(),
            broken: false,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Set when the driver reported a failure the session cannot recover from
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    pub fn is_closed(&self) -> bool {
        self.driver.is_none()
    }

    pub fn idle_for(&self) -> Duration {
        self.last_used.elapsed()
    }

    pub(crate) fn touch(&mut self) {
        self.last_used = Instant::now();
    }

    fn usable_driver(&mut self) -> Result<&mut D> {
        if self.broken {
            return Err(SqlPoolError::State(format!("session {} is broken", self.id)));
        }
        self.driver
            .as_mut()
            .ok_or_else(|| SqlPoolError::State(format!("session {} is closed", self.id)))
    }

    fn note_driver_failure(&mut self, fatal: bool) {
        if fatal {
            self.broken = true;
        }
    }

    /// Execute one statement and normalize its result.
    ///
    /// A failure inside an open transaction leaves the session `Failed`; the
    /// caller decides whether to roll back. The same holds when the returned
    /// future is dropped before completion.
    pub async fn query(&mut self, sql: &str, params: Vec<Value>) -> Result<QueryResult> {
        let request = QueryRequest::new(sql, params)?;

        if self.state == TransactionState::Failed {
            return Err(SqlPoolError::State(
                "current transaction is aborted, roll back before issuing more statements".to_string(),
            ));
        }
        self.usable_driver()?;

        let in_transaction = self.state == TransactionState::InTransaction;
        if in_transaction {
            // Restored once the statement succeeds
            self.state = TransactionState::Failed;
        }

        debug!("Session {} executing: {}", self.id, request.sql().chars().take(100).collect::<String>());
        let driver = self.usable_driver()?;
        let outcome = driver
            .execute_statement(request.sql(), request.params())
            .await
            .and_then(|raw| normalize(raw, request.into_params()));
        self.touch();

        match outcome {
            Ok(result) => {
                if in_transaction {
                    self.state = TransactionState::InTransaction;
                }
                self.sync_with_driver();
                Ok(result)
            }
            Err(e) => {
                self.note_driver_failure(e.is_fatal());
                Err(e.into())
            }
        }
    }

    pub async fn begin_transaction(&mut self) -> Result<()> {
        if self.state != TransactionState::Idle {
            return Err(SqlPoolError::State(format!("cannot begin: session is {}", self.state)));
        }

        let driver = self.usable_driver()?;
        let outcome = driver.begin_transaction().await;
        self.touch();

        match outcome {
            Ok(()) => {
                self.state = TransactionState::InTransaction;
                debug!("Session {} began transaction", self.id);
                Ok(())
            }
            Err(e) => {
                self.note_driver_failure(e.is_fatal());
                Err(e.into())
            }
        }
    }

    pub async fn commit(&mut self) -> Result<()> {
        if self.state != TransactionState::InTransaction {
            return Err(SqlPoolError::State(format!("cannot commit: session is {}", self.state)));
        }

        self.usable_driver()?;
        // Failed until the driver confirms
        self.state = TransactionState::Failed;
        let driver = self.usable_driver()?;
        let outcome = driver.commit().await;
        self.touch();

        match outcome {
            Ok(()) => {
                self.state = TransactionState::Idle;
                debug!("Session {} committed", self.id);
                Ok(())
            }
            Err(e) => {
                warn!("Session {} commit failed: {}", self.id, e);
                self.note_driver_failure(e.is_fatal());
                Err(e.into())
            }
        }
    }

    /// Roll back an open or failed transaction. A driver failure here makes
    /// the session unusable.
    pub async fn rollback(&mut self) -> Result<()> {
        if !self.state.in_transaction() {
            return Err(SqlPoolError::State(format!("cannot roll back: session is {}", self.state)));
        }

        let driver = self.usable_driver()?;
        let outcome = driver.rollback().await;
        self.touch();

        match outcome {
            Ok(()) => {
                self.state = TransactionState::Idle;
                debug!("Session {} rolled back", self.id);
                Ok(())
            }
            Err(e) => {
                warn!("Session {} rollback failed, marking broken: {}", self.id, e);
                self.broken = true;
                Err(e.into())
            }
        }
    }

    /// Follow a transaction opened or ended by a raw `BEGIN`, `COMMIT` or
    /// `ROLLBACK` statement
    pub(crate) fn sync_with_driver(&mut self) {
        let Some(driver) = self.driver.as_ref() else {
            return;
        };
        let open = driver.in_transaction();
        match self.state {
            TransactionState::Idle if open => {
                debug!("Session {} has a transaction opened outside begin_transaction", self.id);
                self.state = TransactionState::InTransaction;
            }
            TransactionState::InTransaction if !open => {
                debug!("Session {} transaction ended outside commit/rollback", self.id);
                self.state = TransactionState::Idle;
            }
            _ => {}
        }
    }

    /// Release the driver handle. Calling it again is a no-op.
    pub async fn close(&mut self) {
        if let Some(mut driver) = self.driver.take() {
            if let Err(e) = driver.close().await {
                warn!("Session {} close failed: {}", self.id, e);
            }
            debug!("Session {} closed", self.id);
        }
    }
}
