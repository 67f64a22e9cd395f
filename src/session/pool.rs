use crate::driver::{Connector, Driver};
use crate::session::connection::Session;
use crate::session::state::SessionId;
use crate::{Result, SqlPoolError};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::time::Instant;
use tracing::{debug, info, warn};

const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    /// Upper bound on open sessions
    pub max_size: usize,
    /// Sessions opened up front by `Pool::connect`
    pub min_idle: usize,
    /// Default wait used by `Pool::get`. Zero means fail immediately when exhausted.
    pub acquire_timeout: Duration,
    /// Idle sessions older than this are evicted instead of reused
    pub idle_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 10,
            min_idle: 0,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(SqlPoolError::Config("max_size must be at least 1".to_string()));
        }
        if self.min_idle > self.max_size {
            return Err(SqlPoolError::Config(format!(
                "min_idle ({}) exceeds max_size ({})",
                self.min_idle, self.max_size
            )));
        }
        Ok(())
    }
}

/// Pool statistics for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub max_size: usize,
    /// Idle plus checked out
    pub open: usize,
    pub idle: usize,
    pub in_use: usize,
    /// Sessions opened over the pool's lifetime
    pub created: u64,
    /// Sessions closed because they went stale or broke
    pub evicted: u64,
}

struct PoolState<D: Driver> {
    idle: VecDeque<Session<D>>,
    checked_out: HashSet<SessionId>,
    created: u64,
    evicted: u64,
}

struct PoolInner<C: Connector> {
    connector: C,
    config: PoolConfig,
    semaphore: Arc<Semaphore>,
    state: Mutex<PoolState<C::Driver>>,
}

/// Bounded pool of sessions.
///
/// Checkouts are limited by a fair semaphore with `max_size` permits, so
/// waiters are served in arrival order and each returned session wakes one
/// waiter. Sessions are opened lazily and reused oldest-first.
pub struct Pool<C: Connector> {
    inner: Arc<PoolInner<C>>,
}

impl<C: Connector> Clone for Pool<C> {
    fn clone(&self) -> Self {
        Pool {
            inner: self.inner.clone(),
        }
    }
}

impl<C: Connector> Pool<C> {
    /// Create a pool without opening any session
    pub fn new(connector: C, config: PoolConfig) -> Result<Self> {
        config.validate()?;
        Ok(Pool {
            inner: Arc::new(PoolInner {
                connector,
                semaphore: Arc::new(Semaphore::new(config.max_size)),
                config,
                state: Mutex::new(PoolState {
                    idle: VecDeque::new(),
                    checked_out: HashSet::new(),
                    created: 0,
                    evicted: 0,
                }),
            }),
        })
    }

    /// Create a pool and open `min_idle` sessions up front
    pub async fn connect(connector: C, config: PoolConfig) -> Result<Self> {
        let pool = Self::new(connector, config)?;
        for _ in 0..pool.inner.config.min_idle {
            let session = pool.open_session().await?;
            pool.inner.state.lock().idle.push_back(session);
        }
        info!(
            "Pool ready (max_size={}, min_idle={})",
            pool.inner.config.max_size, pool.inner.config.min_idle
        );
        Ok(pool)
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub fn connector(&self) -> &C {
        &self.inner.connector
    }

    /// Acquire with the configured default timeout
    pub async fn get(&self) -> Result<PooledSession<C>> {
        self.acquire(self.inner.config.acquire_timeout).await
    }

    /// Wait up to `timeout` for a session, including the time spent opening a
    /// new one. A zero timeout never waits for a slot and fails with
    /// `PoolExhausted` when every session is checked out.
    pub async fn acquire(&self, timeout: Duration) -> Result<PooledSession<C>> {
        let semaphore = self.inner.semaphore.clone();
        // Very large timeouts behave as waiting forever
        let deadline = Instant::now()
            .checked_add(timeout)
            .unwrap_or_else(|| Instant::now() + FAR_FUTURE);
        let permit = if timeout.is_zero() {
            match semaphore.try_acquire_owned() {
                Ok(permit) => permit,
                Err(TryAcquireError::NoPermits) => {
                    return Err(SqlPoolError::PoolExhausted {
                        max_size: self.inner.config.max_size,
                    });
                }
                Err(TryAcquireError::Closed) => return Err(SqlPoolError::PoolClosed),
            }
        } else {
            match tokio::time::timeout_at(deadline, semaphore.acquire_owned()).await {
                Ok(Ok(permit)) => permit,
                Ok(Err(_)) => return Err(SqlPoolError::PoolClosed),
                Err(_) => {
                    debug!("Acquire timed out after {:?}", timeout);
                    return Err(SqlPoolError::PoolTimeout(timeout));
                }
            }
        };

        let (reused, mut stale) = self.take_idle();
        let session = match reused {
            Some(session) => session,
            None => {
                close_sessions(std::mem::take(&mut stale)).await;
                // Dropping the permit on failure hands the slot to the next waiter
                if timeout.is_zero() {
                    self.open_session().await?
                } else {
                    match tokio::time::timeout_at(deadline, self.open_session()).await {
                        Ok(session) => session?,
                        Err(_) => {
                            debug!("Opening a session did not finish within {:?}", timeout);
                            return Err(SqlPoolError::PoolTimeout(timeout));
                        }
                    }
                }
            }
        };

        let pooled = self.check_out(session, permit);
        close_sessions(stale).await;
        Ok(pooled)
    }

    /// Return a session to the pool. Equivalent to `PooledSession::release`.
    pub async fn release(&self, session: PooledSession<C>) {
        session.release().await;
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        PoolStats {
            max_size: self.inner.config.max_size,
            open: state.idle.len() + state.checked_out.len(),
            idle: state.idle.len(),
            in_use: state.checked_out.len(),
            created: state.created,
            evicted: state.evicted,
        }
    }

    /// Evict idle sessions past the idle timeout. Returns how many were closed.
    pub async fn reap_idle(&self) -> usize {
        let stale: Vec<Session<C::Driver>> = {
            let mut state = self.inner.state.lock();
            let (stale, fresh): (Vec<_>, Vec<_>) = state.idle.drain(..).partition(|s| self.is_stale(s));
            state.idle.extend(fresh);
            state.evicted += stale.len() as u64;
            stale
        };

        let count = stale.len();
        if count > 0 {
            info!("Evicting {} idle sessions", count);
        }
        close_sessions(stale).await;
        count
    }

    /// Stop handing out sessions and close the idle ones. Checked-out sessions
    /// are closed when they come back.
    pub async fn close(&self) {
        self.inner.semaphore.close();
        let idle: Vec<Session<C::Driver>> = {
            let mut state = self.inner.state.lock();
            let idle: Vec<_> = state.idle.drain(..).collect();
            state.evicted += idle.len() as u64;
            idle
        };
        info!("Closing pool ({} idle sessions)", idle.len());
        close_sessions(idle).await;
    }

    pub fn is_closed(&self) -> bool {
        self.inner.semaphore.is_closed()
    }

    fn is_stale(&self, session: &Session<C::Driver>) -> bool {
        self.inner
            .config
            .idle_timeout
            .is_some_and(|limit| session.idle_for() > limit)
    }

    async fn open_session(&self) -> Result<Session<C::Driver>> {
        let driver = self.inner.connector.connect().await?;
        let session = Session::new(driver);
        let mut state = self.inner.state.lock();
        state.created += 1;
        info!(
            "Opened session {} (open sessions: {})",
            session.id(),
            state.idle.len() + state.checked_out.len() + 1
        );
        Ok(session)
    }

    /// Pop the oldest usable idle session, collecting stale ones on the way
    fn take_idle(&self) -> (Option<Session<C::Driver>>, Vec<Session<C::Driver>>) {
        let mut state = self.inner.state.lock();
        let mut stale = Vec::new();
        while let Some(session) = state.idle.pop_front() {
            if self.is_stale(&session) {
                debug!("Session {} idle for {:?}, evicting", session.id(), session.idle_for());
                state.evicted += 1;
                stale.push(session);
                continue;
            }
            return (Some(session), stale);
        }
        (None, stale)
    }

    fn check_out(&self, mut session: Session<C::Driver>, permit: OwnedSemaphorePermit) -> PooledSession<C> {
        session.touch();
        self.inner.state.lock().checked_out.insert(session.id());
        debug!("Checked out session {}", session.id());
        PooledSession {
            session: Some(session),
            pool: self.clone(),
            permit: Some(permit),
        }
    }

    /// Roll back anything the caller left open
    async fn reset(&self, session: &mut Session<C::Driver>) {
        session.sync_with_driver();
        if !session.state().in_transaction() || session.is_broken() || session.is_closed() {
            return;
        }

        warn!("Session {} released while {}, rolling back", session.id(), session.state());
        if let Err(e) = session.rollback().await {
            warn!("Rollback on release failed for session {}: {}", session.id(), e);
        }
    }

    async fn return_session(&self, mut session: Session<C::Driver>) {
        let reusable = !session.is_broken()
            && !session.is_closed()
            && !session.state().in_transaction()
            && !self.is_closed();

        {
            let mut state = self.inner.state.lock();
            state.checked_out.remove(&session.id());
            if reusable {
                session.touch();
                debug!("Session {} returned to pool", session.id());
                state.idle.push_back(session);
                return;
            }
            state.evicted += 1;
        }

        debug!("Discarding session {}", session.id());
        session.close().await;
    }

    fn forget(&self, id: SessionId) {
        let mut state = self.inner.state.lock();
        state.checked_out.remove(&id);
        state.evicted += 1;
    }
}

async fn close_sessions<D: Driver>(sessions: Vec<Session<D>>) {
    for mut session in sessions {
        session.close().await;
    }
}

/// A checked-out session. Return it with `release`; dropping it instead
/// hands it back on a background task.
pub struct PooledSession<C: Connector> {
    session: Option<Session<C::Driver>>,
    pool: Pool<C>,
    permit: Option<OwnedSemaphorePermit>,
}

impl<C: Connector> PooledSession<C> {
    /// Give the session back, rolling back an open transaction first. A
    /// session whose rollback fails is closed and later replaced.
    pub async fn release(mut self) {
        if let Some(session) = self.session.as_mut() {
            self.pool.reset(session).await;
        }
        if let Some(session) = self.session.take() {
            self.pool.return_session(session).await;
        }
        // The permit drops with `self`, after the session is back in the queue
    }
}

impl<C: Connector> std::ops::Deref for PooledSession<C> {
    type Target = Session<C::Driver>;

    fn deref(&self) -> &Self::Target {
        self.session.as_ref().expect("pooled session used after release")
    }
}

impl<C: Connector> std::ops::DerefMut for PooledSession<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session.as_mut().expect("pooled session used after release")
    }
}

impl<C: Connector> Drop for PooledSession<C> {
    fn drop(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        let pool = self.pool.clone();
        let permit = self.permit.take();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    pool.reset(&mut session).await;
                    pool.return_session(session).await;
                    drop(permit);
                });
            }
            Err(_) => {
                warn!("Session {} dropped outside a runtime, discarding", session.id());
                pool.forget(session.id());
            }
        }
    }
}
