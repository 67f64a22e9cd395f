// Not every test binary uses every helper
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Local;
use rand::Rng;
use sqlpool::driver::{Connector, Driver, DriverError, RawResult, SqliteConnector};
use sqlpool::{Pool, PoolConfig, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const INSERT_GAME: &str = "INSERT INTO game VALUES (?, ?, ?, ?, ?, ?, ?)";

/// A pool over a temporary SQLite database holding a seeded `game` table.
/// Keep the `TempDir` alive for as long as the pool is used.
pub async fn game_pool(max_size: usize) -> (Pool<SqliteConnector>, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("game.db");
    let connector = SqliteConnector::new(path.to_string_lossy().to_string());
    let config = PoolConfig {
        max_size,
        acquire_timeout: Duration::from_secs(5),
        ..PoolConfig::default()
    };
    let pool = Pool::new(connector, config).unwrap();

    let mut session = pool.get().await.unwrap();
    session
        .query(
            "CREATE TABLE game (
                host_year INTEGER NOT NULL,
                event_code INTEGER NOT NULL,
                athlete_code INTEGER NOT NULL,
                stadium_code INTEGER NOT NULL,
                nation_code TEXT,
                medal TEXT,
                game_date TEXT
            ) STRICT",
            vec![],
        )
        .await
        .unwrap();

    session.begin_transaction().await.unwrap();
    for i in 0..20 {
        let mut values = random_game_row(1000..=1999);
        values[0] = Value::Integer(1000 + i);
        session.query(INSERT_GAME, values).await.unwrap();
    }
    session.commit().await.unwrap();
    session.release().await;

    (pool, dir)
}

/// Row values shaped like the game table: a random host year from `years`,
/// fixed codes, and today's date
pub fn random_game_row(years: std::ops::RangeInclusive<i64>) -> Vec<Value> {
    let host_year = rand::rng().random_range(years);
    vec![
        Value::Integer(host_year),
        Value::Integer(20022),
        Value::Integer(14346),
        Value::Integer(30136),
        Value::from("NGR"),
        Value::from("A"),
        Value::Date(Local::now().date_naive()),
    ]
}

/// Number of rows in `game` whose host year falls within `years`
pub async fn count_games(pool: &Pool<SqliteConnector>, years: std::ops::RangeInclusive<i64>) -> i64 {
    let mut session = pool.get().await.unwrap();
    let result = session
        .query(
            "SELECT COUNT(*) AS total FROM game WHERE host_year BETWEEN ? AND ?",
            vec![Value::Integer(*years.start()), Value::Integer(*years.end())],
        )
        .await
        .unwrap();
    session.release().await;
    result.rows().unwrap()[0].get("total").and_then(Value::as_i64).unwrap()
}

/// Switches that make the scripted driver fail on demand
#[derive(Default)]
pub struct Faults {
    pub fail_connect: AtomicBool,
    pub fail_execute: AtomicBool,
    pub fail_commit: AtomicBool,
    pub fail_rollback: AtomicBool,
    pub connects: AtomicUsize,
    pub rollbacks: AtomicUsize,
    pub closes: AtomicUsize,
}

/// Connector whose drivers answer from a script instead of a database
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    pub faults: Arc<Faults>,
    /// Delay applied to every statement
    pub latency: Duration,
    /// Delay applied to every connect
    pub connect_latency: Duration,
}

pub struct ScriptedDriver {
    faults: Arc<Faults>,
    latency: Duration,
    open_transaction: bool,
}

#[async_trait]
impl Connector for ScriptedConnector {
    type Driver = ScriptedDriver;

    async fn connect(&self) -> Result<ScriptedDriver, DriverError> {
        if !self.connect_latency.is_zero() {
            tokio::time::sleep(self.connect_latency).await;
        }
        if self.faults.fail_connect.load(Ordering::SeqCst) {
            return Err(DriverError::Connection("connection refused".to_string()));
        }
        self.faults.connects.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedDriver {
            faults: self.faults.clone(),
            latency: self.latency,
            open_transaction: false,
        })
    }
}

#[async_trait]
impl Driver for ScriptedDriver {
    async fn execute_statement(&mut self, sql: &str, params: &[Value]) -> Result<RawResult, DriverError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.faults.fail_execute.load(Ordering::SeqCst) {
            return Err(DriverError::Statement("scripted execute failure".to_string()));
        }
        let statement = sql.trim_start().to_ascii_uppercase();
        if statement.starts_with("BEGIN") {
            self.open_transaction = true;
        } else if statement.starts_with("COMMIT") || statement.starts_with("ROLLBACK") {
            self.open_transaction = false;
        }
        if statement.starts_with("SELECT") {
            Ok(RawResult::Rows {
                columns: vec!["n".to_string()],
                rows: vec![vec![Value::Integer(params.len() as i64)]],
            })
        } else {
            Ok(RawResult::Count(1))
        }
    }

    async fn begin_transaction(&mut self) -> Result<(), DriverError> {
        self.open_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), DriverError> {
        if self.faults.fail_commit.load(Ordering::SeqCst) {
            return Err(DriverError::Statement("scripted commit failure".to_string()));
        }
        self.open_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DriverError> {
        self.faults.rollbacks.fetch_add(1, Ordering::SeqCst);
        if self.faults.fail_rollback.load(Ordering::SeqCst) {
            return Err(DriverError::Connection("scripted rollback failure".to_string()));
        }
        self.open_transaction = false;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        self.faults.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.open_transaction
    }
}

pub fn scripted_pool(max_size: usize) -> (Pool<ScriptedConnector>, Arc<Faults>) {
    let connector = ScriptedConnector::default();
    let faults = connector.faults.clone();
    let config = PoolConfig {
        max_size,
        ..PoolConfig::default()
    };
    (Pool::new(connector, config).unwrap(), faults)
}
