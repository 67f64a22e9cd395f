use anyhow::{Context, Result};
use tracing::{error, info, warn};

use sqlpool::config::Config;
use sqlpool::driver::SqliteConnector;
use sqlpool::{Pool, PooledSession, Value};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(config.log_level.clone())
        .with_writer(std::io::stderr)
        .init();

    info!("sqlpool v{}", env!("CARGO_PKG_VERSION"));
    config.validate()?;

    let connector = SqliteConnector::new(config.database.clone())
        .with_busy_timeout(config.busy_timeout())
        .with_journal_mode(config.journal_mode.clone());
    let pool = Pool::connect(connector, config.pool_config()?)
        .await
        .context("failed to open session pool")?;
    info!("Using database: {}", pool.connector().path());

    if config.execute.is_empty() {
        warn!("No statements given, nothing to do (use --execute)");
        pool.close().await;
        return Ok(());
    }

    let params: Vec<Value> = config
        .params
        .iter()
        .map(|p| p.parse::<Value>())
        .collect::<std::result::Result<_, _>>()?;

    let outcome = run_statements(&pool, &config, &params).await;
    pool.close().await;
    outcome
}

async fn run_statements(pool: &Pool<SqliteConnector>, config: &Config, params: &[Value]) -> Result<()> {
    let mut session = pool.get().await.context("failed to acquire a session")?;
    let outcome = execute_all(&mut session, config, params).await;
    // Rolls back whatever a failed run left open
    session.release().await;
    outcome
}

async fn execute_all(
    session: &mut PooledSession<SqliteConnector>,
    config: &Config,
    params: &[Value],
) -> Result<()> {
    if config.transaction {
        session
            .begin_transaction()
            .await
            .context("failed to begin transaction")?;
    }

    for sql in &config.execute {
        let result = match session.query(sql, params.to_vec()).await {
            Ok(result) => result,
            Err(e) => {
                error!("Statement failed: {}", e);
                if config.transaction {
                    if let Err(rollback_err) = session.rollback().await {
                        error!("Rollback failed: {}", rollback_err);
                    } else {
                        info!("Transaction rolled back");
                    }
                }
                return Err(e).with_context(|| format!("failed to execute: {sql}"));
            }
        };
        println!("{}", serde_json::to_string(&result)?);
    }

    if config.transaction {
        session.commit().await.context("failed to commit transaction")?;
        info!("Transaction committed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn memory_pool() -> Pool<SqliteConnector> {
        let config = sqlpool::PoolConfig {
            max_size: 1,
            ..sqlpool::PoolConfig::default()
        };
        Pool::new(SqliteConnector::new(":memory:"), config).unwrap()
    }

    async fn table_count(pool: &Pool<SqliteConnector>) -> i64 {
        let mut session = pool.get().await.unwrap();
        let result = session
            .query("SELECT COUNT(*) AS n FROM sqlite_master WHERE type = 'table'", vec![])
            .await
            .unwrap();
        session.release().await;
        result.rows().unwrap()[0].get("n").and_then(Value::as_i64).unwrap()
    }

    #[tokio::test]
    async fn test_failed_commit_still_releases_session() {
        let pool = memory_pool();
        let config = Config::parse_from([
            "sqlpool",
            "--transaction",
            "-e",
            "CREATE TABLE t (a INTEGER)",
            "-e",
            "COMMIT",
        ]);

        let err = run_statements(&pool, &config, &[]).await.unwrap_err();
        assert!(err.to_string().contains("commit"));

        let stats = pool.stats();
        assert_eq!((stats.open, stats.in_use), (1, 0));
        assert!(pool.acquire(std::time::Duration::ZERO).await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_statement_rolls_back_and_releases() {
        let pool = memory_pool();
        let config = Config::parse_from([
            "sqlpool",
            "--transaction",
            "-e",
            "CREATE TABLE t (a INTEGER)",
            "-e",
            "SELECT * FROM missing",
        ]);

        assert!(run_statements(&pool, &config, &[]).await.is_err());
        assert_eq!(pool.stats().in_use, 0);
        assert_eq!(table_count(&pool).await, 0);
    }
}
