//! Persistence Layer
//!
//! SQLite-backed storage for the trade ledger, the SL/TP amendment audit
//! log and the write-once balance baseline. These are the only durable
//! artifacts the engine requires.
//!
//! # Schema
//!
//! ## trades
//! One row per round trip, keyed by the venue order id. Exit fields are
//! NULL while the position is open and are filled exactly once, by either
//! the management cycle's explicit close or by reconciliation.
//!
//! ## sl_tp_updates
//! Append-only audit trail of accepted stop amendments.
//!
//! ## balance_baseline
//! Single row holding the initial account balance, captured on first run
//! and never overwritten; origin of the equity curve.

pub mod ledger;
pub mod models;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::ConnectOptions;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

pub use ledger::TradeLedger;

/// Database connection pool
pub type DbPool = SqlitePool;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("database connection error: {0}")]
    Connection(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(String),

    #[error("query error: {0}")]
    Query(String),

    /// The one-open-record-per-symbol invariant would be violated.
    #[error("open trade already recorded for {0}")]
    OpenTradeExists(String),
}

/// Initialize the connection pool and run migrations.
///
/// `database_url` is e.g. "sqlite://data/ratel.db" or "sqlite::memory:"
/// for tests.
pub async fn init_database(database_url: &str) -> Result<DbPool, LedgerError> {
    info!("Initializing ledger database: {}", database_url);

    if let Some(db_path) = database_url.strip_prefix("sqlite://") {
        if let Some(parent) = Path::new(db_path).parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| LedgerError::Migration(format!("cannot create data dir: {e}")))?;
        }
    }

    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .log_statements(tracing::log::LevelFilter::Debug);

    // One connection: SQLite takes a single writer, and an in-memory
    // database must not fan out across pooled connections.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    info!("Ledger database ready");
    Ok(pool)
}

async fn run_migrations(pool: &DbPool) -> Result<(), LedgerError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS trades (
            order_id TEXT PRIMARY KEY,
            entry_time DATETIME NOT NULL,
            exit_time DATETIME,
            symbol TEXT NOT NULL,
            side TEXT NOT NULL CHECK(side IN ('buy', 'sell')),
            size REAL NOT NULL,
            entry_price REAL NOT NULL,
            exit_price REAL,
            pnl REAL,
            duration_hours REAL,
            atr REAL NOT NULL,
            rr_ratio REAL,
            confidence REAL NOT NULL,
            close_type TEXT
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| LedgerError::Migration(format!("failed to create trades table: {e}")))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sl_tp_updates (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            order_id TEXT NOT NULL,
            timestamp DATETIME NOT NULL,
            old_sl REAL,
            new_sl REAL NOT NULL,
            old_tp REAL,
            new_tp REAL NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| LedgerError::Migration(format!("failed to create sl_tp_updates table: {e}")))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS balance_baseline (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            initial_balance REAL NOT NULL,
            recorded_at DATETIME NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| LedgerError::Migration(format!("failed to create balance_baseline table: {e}")))?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_trades_symbol ON trades(symbol)")
        .execute(pool)
        .await
        .map_err(|e| LedgerError::Migration(format!("failed to create index: {e}")))?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_trades_exit_time ON trades(exit_time)")
        .execute(pool)
        .await
        .map_err(|e| LedgerError::Migration(format!("failed to create index: {e}")))?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_trades_entry_time ON trades(entry_time)")
        .execute(pool)
        .await
        .map_err(|e| LedgerError::Migration(format!("failed to create index: {e}")))?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sl_tp_updates_order ON sl_tp_updates(order_id)")
        .execute(pool)
        .await
        .map_err(|e| LedgerError::Migration(format!("failed to create index: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_database_init() {
        let pool = init_database("sqlite::memory:").await;
        assert!(pool.is_ok());
    }

    #[tokio::test]
    async fn test_migrations_create_tables() {
        let pool = init_database("sqlite::memory:").await.unwrap();

        let result: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' \
             AND name IN ('trades', 'sl_tp_updates', 'balance_baseline')",
        )
        .fetch_one(&pool)
        .await
        .unwrap();

        assert_eq!(result.0, 3);
    }
}
