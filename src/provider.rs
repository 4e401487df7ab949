//! Historical bar sources.
//!
//! Anything that can hand back an ordered OHLCV series for a symbol and date
//! range implements `BarProvider`: the Alpaca client, the SQLite store, and
//! plain CSV files on disk.

use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::models::Bar;

/// Source of historical bars.
pub trait BarProvider {
    /// Fetch bars for `symbol` with `start <= timestamp <= end`, oldest first.
    ///
    /// A symbol with no data yields an empty vector, not an error.
    fn fetch_bars(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<Bar>>> + Send;
}

/// Reads `<dir>/<SYMBOL>.csv` files with a
/// `timestamp,open,high,low,close,volume` header.
#[derive(Debug, Clone)]
pub struct CsvBarProvider {
    dir: PathBuf,
}

#[derive(Debug, Deserialize)]
struct CsvBar {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

impl CsvBarProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the file holding `symbol`'s bars.
    pub fn path_for(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", symbol.to_uppercase()))
    }

    fn read_file(path: &Path, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Bar>> {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;

        let mut bars = Vec::new();
        for (line, record) in reader.deserialize::<CsvBar>().enumerate() {
            let row = record.with_context(|| {
                format!("Bad CSV row {} in {}", line + 2, path.display())
            })?;
            let timestamp = parse_timestamp(&row.timestamp).with_context(|| {
                format!("Bad timestamp on row {} in {}", line + 2, path.display())
            })?;

            if timestamp < start || timestamp > end {
                continue;
            }

            bars.push(Bar {
                timestamp,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume,
            });
        }

        bars.sort_by_key(|b| b.timestamp);
        Ok(bars)
    }
}

impl BarProvider for CsvBarProvider {
    async fn fetch_bars(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>> {
        let path = self.path_for(symbol);
        if !path.exists() {
            debug!(symbol = %symbol, path = %path.display(), "No CSV file for symbol");
            return Ok(Vec::new());
        }

        let bars = tokio::task::spawn_blocking(move || Self::read_file(&path, start, end))
            .await
            .context("CSV reader task failed")??;

        debug!(symbol = %symbol, count = bars.len(), "Loaded bars from CSV");
        Ok(bars)
    }
}

/// Parse an RFC 3339 timestamp or a bare `YYYY-MM-DD` date (midnight UTC).
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("Invalid date or timestamp: {s:?}"))?;
    Ok(date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc())
}
