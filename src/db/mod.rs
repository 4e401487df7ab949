//! SQLite store for historical daily bars.
//!
//! One `bars` table keyed by `(symbol, ts)`, where `ts` is the bar's unix
//! timestamp in seconds. Writes are upserts, so re-ingesting a range is
//! harmless. Rows older than the retention window are pruned after every
//! write.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tracing::{debug, info};

use crate::models::Bar;
use crate::provider::BarProvider;

/// Days of history kept in the store
pub const RETENTION_DAYS: i64 = 180;

/// Database connection pool for the bar store.
pub struct Database {
    pool: SqlitePool,
}

/// Stored bar record.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredBar {
    pub symbol: String,
    pub ts: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl TryFrom<StoredBar> for Bar {
    type Error = anyhow::Error;

    fn try_from(row: StoredBar) -> Result<Self> {
        let timestamp = DateTime::from_timestamp(row.ts, 0)
            .ok_or_else(|| {
                anyhow!("Stored bar for {} has invalid timestamp {}", row.symbol, row.ts)
            })?;
        Ok(Bar {
            timestamp,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        })
    }
}

impl Database {
    /// Create a new database connection.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .with_context(|| format!("Failed to connect to database {database_url}"))?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Private in-memory database. A single pinned connection keeps it alive.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory database")?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run all database migrations.
    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bars (
                symbol TEXT NOT NULL,
                ts INTEGER NOT NULL,
                open REAL NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL,
                volume REAL NOT NULL,
                PRIMARY KEY (symbol, ts)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create bars table")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_bars_ts ON bars(ts)")
            .execute(&self.pool)
            .await
            .context("Failed to create bars index")?;

        Ok(())
    }

    // ==================== Bars ====================

    /// Upsert bars for `symbol`, then prune rows outside the retention window.
    ///
    /// Returns the number of bars written.
    pub async fn write_bars(&self, symbol: &str, bars: &[Bar]) -> Result<u64> {
        let symbol = symbol.to_uppercase();
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        for bar in bars {
            sqlx::query(
                r#"
                INSERT INTO bars (symbol, ts, open, high, low, close, volume)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(symbol, ts) DO UPDATE SET
                    open = excluded.open,
                    high = excluded.high,
                    low = excluded.low,
                    close = excluded.close,
                    volume = excluded.volume
                "#,
            )
            .bind(&symbol)
            .bind(bar.timestamp.timestamp())
            .bind(bar.open)
            .bind(bar.high)
            .bind(bar.low)
            .bind(bar.close)
            .bind(bar.volume)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to write bar for {symbol}"))?;
        }

        tx.commit().await.context("Failed to commit bars")?;
        info!(symbol = %symbol, count = bars.len(), "Stored bars");

        self.apply_retention(RETENTION_DAYS).await?;
        Ok(bars.len() as u64)
    }

    /// Bars for `symbol` with `start <= ts <= end`, oldest first.
    pub async fn read_bars(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>> {
        let rows: Vec<StoredBar> = sqlx::query_as(
            r#"
            SELECT symbol, ts, open, high, low, close, volume
            FROM bars
            WHERE symbol = ? AND ts >= ? AND ts <= ?
            ORDER BY ts ASC
            "#,
        )
        .bind(symbol.to_uppercase())
        .bind(start.timestamp())
        .bind(end.timestamp())
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to read bars for {symbol}"))?;

        rows.into_iter().map(Bar::try_from).collect()
    }

    /// Delete bars older than `days` before now. Returns rows removed.
    pub async fn apply_retention(&self, days: i64) -> Result<u64> {
        let cutoff = Utc::now() - Duration::days(days);
        let result = sqlx::query("DELETE FROM bars WHERE ts < ?")
            .bind(cutoff.timestamp())
            .execute(&self.pool)
            .await
            .context("Failed to apply retention")?;

        let removed = result.rows_affected();
        if removed > 0 {
            debug!(removed = removed, days = days, "Pruned old bars");
        }
        Ok(removed)
    }

    /// Distinct symbols with stored bars.
    pub async fn symbols(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT DISTINCT symbol FROM bars ORDER BY symbol")
                .fetch_all(&self.pool)
                .await
                .context("Failed to list symbols")?;

        Ok(rows.into_iter().map(|(s,)| s).collect())
    }

    /// Number of stored bars for `symbol`.
    pub async fn bar_count(&self, symbol: &str) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM bars WHERE symbol = ?")
            .bind(symbol.to_uppercase())
            .fetch_one(&self.pool)
            .await
            .context("Failed to count bars")?;

        Ok(row.0)
    }
}

impl BarProvider for Database {
    async fn fetch_bars(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>> {
        self.read_bars(symbol, start, end).await
    }
}
