//! curvebuy-db: SQLite persistence
//!
//! The buffer registry (`buffer_addresses`), the exchange order ledger
//! (`orders`) and the event feed position (`sync_state`). Everything else
//! the bot knows is rebuilt from the ledger at startup.

pub mod buffers;
pub mod cursor;
pub mod orders;

use std::path::Path;
use std::str::FromStr;

use curvebuy_core::StorageError;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

pub use buffers::BufferRow;
pub use orders::{NewOrder, OrderRow, OrderUpdate, UnpaidCompensation};

/// Result type for database operations
pub type Result<T> = std::result::Result<T, StorageError>;

const MIGRATION_V1: &str = r#"
CREATE TABLE IF NOT EXISTS buffer_addresses (
    buffer_address TEXT PRIMARY KEY,
    address TEXT NOT NULL,
    curve_aa TEXT NOT NULL,
    definition TEXT NOT NULL,
    in_work INTEGER NOT NULL DEFAULT 1,
    creation_date INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    last_update_date INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    UNIQUE (address, curve_aa)
);

CREATE INDEX IF NOT EXISTS idx_buffers_in_work ON buffer_addresses(in_work);
CREATE INDEX IF NOT EXISTS idx_buffers_curve ON buffer_addresses(curve_aa);

CREATE TABLE IF NOT EXISTS orders (
    order_id INTEGER PRIMARY KEY AUTOINCREMENT,
    provider TEXT NOT NULL,
    provider_id TEXT NOT NULL,
    buffer_address TEXT NOT NULL,
    amount_in REAL NOT NULL,
    currency_in TEXT NOT NULL,
    expected_amount_out REAL NOT NULL,
    expected_compensation REAL NULL,
    expected_fee REAL NULL,
    is_eligible INTEGER NOT NULL,
    amount_out REAL NULL,
    fee REAL NULL,
    compensation REAL NULL,
    is_done INTEGER NOT NULL DEFAULT 0,
    is_compensated INTEGER NOT NULL DEFAULT 0,
    compensation_unit TEXT NULL,
    compensation_date INTEGER NULL,
    creation_date INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    UNIQUE (provider, provider_id)
);

CREATE INDEX IF NOT EXISTS idx_orders_buffer ON orders(buffer_address);
CREATE INDEX IF NOT EXISTS idx_orders_done ON orders(is_done, is_compensated);
CREATE INDEX IF NOT EXISTS idx_orders_creation ON orders(creation_date);

CREATE TABLE IF NOT EXISTS sync_state (
    key TEXT PRIMARY KEY,
    value INTEGER NOT NULL
);
"#;

/// Handle to the bot's database
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open or create the database at `path` and apply migrations
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening database at {}", path.display());

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(|e| StorageError::Open(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Open(e.to_string()))?;

        Self::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Open a private in-memory database (for testing)
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StorageError::Open(e.to_string()))?;

        // a single connection that never expires, or the data would vanish
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Open(e.to_string()))?;

        Self::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<()> {
        debug!("Running migrations");
        sqlx::raw_sql(MIGRATION_V1)
            .execute(pool)
            .await
            .map_err(|e| StorageError::Migration(e.to_string()))?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

pub(crate) fn query_err(e: sqlx::Error) -> StorageError {
    StorageError::Query(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let db = Database::open_in_memory().await.unwrap();
        Database::run_migrations(db.pool()).await.unwrap();
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('buffer_addresses', 'orders', 'sync_state')",
        )
        .fetch_one(db.pool())
        .await
        .unwrap();
        assert_eq!(count, 3);
    }
}
