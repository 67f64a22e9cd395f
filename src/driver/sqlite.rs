use crate::driver::{Connector, Driver, DriverError, RawResult};
use crate::types::{Value, DATE_FORMAT};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, ErrorCode, OpenFlags};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Opens SQLite connections for the pool
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    path: String,
    busy_timeout: Duration,
    journal_mode: String,
}

impl SqliteConnector {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            busy_timeout: Duration::from_secs(5),
            journal_mode: "WAL".to_string(),
        }
    }

    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    pub fn with_journal_mode(mut self, journal_mode: impl Into<String>) -> Self {
        self.journal_mode = journal_mode.into();
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn open(&self) -> rusqlite::Result<Connection> {
        let conn = if self.path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX
                | OpenFlags::SQLITE_OPEN_URI;
            Connection::open_with_flags(&self.path, flags)?
        };

        conn.busy_timeout(self.busy_timeout)?;
        let mode: String = conn.pragma_update_and_check(None, "journal_mode", &self.journal_mode, |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        debug!("Opened SQLite connection to {} (journal_mode={})", self.path, mode);

        Ok(conn)
    }
}

#[async_trait]
impl Connector for SqliteConnector {
    type Driver = SqliteDriver;

    async fn connect(&self) -> Result<SqliteDriver, DriverError> {
        let connector = self.clone();
        let conn = tokio::task::spawn_blocking(move || connector.open())
            .await
            .map_err(|e| DriverError::Connection(format!("connect task failed: {e}")))?
            .map_err(|e| DriverError::Connection(e.to_string()))?;

        Ok(SqliteDriver {
            conn: Some(Arc::new(Mutex::new(conn))),
        })
    }
}

/// One SQLite connection. Blocking calls run on the blocking thread pool.
pub struct SqliteDriver {
    conn: Option<Arc<Mutex<Connection>>>,
}

impl SqliteDriver {
    async fn run<F, R>(&self, f: F) -> Result<R, DriverError>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = self
            .conn
            .clone()
            .ok_or_else(|| DriverError::Connection("connection is closed".to_string()))?;

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            f(&conn)
        })
        .await
        .map_err(|e| DriverError::Connection(format!("driver task failed: {e}")))?
        .map_err(DriverError::from)
    }

    async fn batch(&self, sql: &'static str) -> Result<(), DriverError> {
        self.run(move |conn| conn.execute_batch(sql)).await
    }
}

#[async_trait]
impl Driver for SqliteDriver {
    async fn execute_statement(&mut self, sql: &str, params: &[Value]) -> Result<RawResult, DriverError> {
        let sql = sql.to_string();
        let bound: Vec<SqlValue> = params.iter().map(to_sql_value).collect();

        self.run(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let column_count = stmt.column_count();

            if column_count == 0 {
                // sqlite3_changes keeps the last DML count across DDL
                let before = conn.total_changes();
                let affected = stmt.execute(rusqlite::params_from_iter(bound))?;
                let affected = if conn.total_changes() == before { 0 } else { affected };
                return Ok(RawResult::Count(affected as u64));
            }

            let columns: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
            let mut rows = Vec::new();
            let mut result_rows = stmt.query(rusqlite::params_from_iter(bound))?;
            while let Some(row) = result_rows.next()? {
                let mut values = Vec::with_capacity(column_count);
                for i in 0..column_count {
                    values.push(from_value_ref(row.get_ref(i)?));
                }
                rows.push(values);
            }

            Ok(RawResult::Rows { columns, rows })
        })
        .await
    }

    async fn begin_transaction(&mut self) -> Result<(), DriverError> {
        self.batch("BEGIN IMMEDIATE").await
    }

    async fn commit(&mut self) -> Result<(), DriverError> {
        self.batch("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<(), DriverError> {
        // SQLite rolls back on its own after some errors; nothing left to undo then
        self.run(|conn| {
            if conn.is_autocommit() {
                return Ok(());
            }
            conn.execute_batch("ROLLBACK")
        })
        .await
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };

        match Arc::try_unwrap(conn) {
            Ok(conn) => conn
                .into_inner()
                .close()
                .map_err(|(_, e)| DriverError::Connection(e.to_string())),
            Err(_) => {
                // A blocking task still holds the connection; it closes when that task drops it
                warn!("SQLite connection still in use at close");
                Ok(())
            }
        }
    }

    fn in_transaction(&self) -> bool {
        match &self.conn {
            // A statement still running on the blocking pool counts as open
            Some(conn) => conn.try_lock().is_none_or(|conn| !conn.is_autocommit()),
            None => false,
        }
    }
}

impl From<rusqlite::Error> for DriverError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _) => match e.code {
                ErrorCode::CannotOpen
                | ErrorCode::NotADatabase
                | ErrorCode::DatabaseCorrupt
                | ErrorCode::SystemIoFailure
                | ErrorCode::PermissionDenied => DriverError::Connection(err.to_string()),
                _ => DriverError::Statement(err.to_string()),
            },
            _ => DriverError::Statement(err.to_string()),
        }
    }
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(i) => SqlValue::Integer(*i),
        Value::Real(r) => SqlValue::Real(*r),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Date(d) => SqlValue::Text(d.format(DATE_FORMAT).to_string()),
        Value::Blob(b) => SqlValue::Blob(b.clone()),
    }
}

fn from_value_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Real(f),
        ValueRef::Text(s) => Value::Text(String::from_utf8_lossy(s).into_owned()),
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    }
}
