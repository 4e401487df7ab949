//! Backtesting engine for validating the signal rules against historical bars.
//!
//! Features:
//! - Replay prepared feature rows bar by bar through the rule engine
//! - Compound equity using the Kelly-sized fraction of each realized move
//! - Evaluate many symbols concurrently from any `BarProvider`
//! - Aggregate performance statistics per symbol

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::features::prepare_features;
use crate::metrics::{PerformanceCalculator, SimulationTally};
use crate::models::{BacktestMetrics, LabeledFeatureRow, TradeAction};
use crate::provider::{parse_timestamp, BarProvider};
use crate::trading::{generate_signal, SignalConfig};

/// Backtesting configuration.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BacktestConfig {
    /// Signal rule configuration applied to every bar
    pub signal_config: SignalConfig,
}

/// Replay labeled rows through the rule engine and aggregate the results.
///
/// HOLD bars contribute a zero return. Every other action is treated as
/// taking `size_fraction` of the realized move, whatever its direction.
pub fn backtest(rows: &[LabeledFeatureRow], config: &SignalConfig) -> BacktestMetrics {
    let mut tally = SimulationTally {
        returns: Vec::with_capacity(rows.len()),
        equity: 1.0,
        peak: 1.0,
        ..Default::default()
    };

    for row in rows {
        let signal = generate_signal(&row.features, config);
        if signal.action == TradeAction::Hold {
            tally.returns.push(0.0);
            continue;
        }

        let realized = row.actual_move_pct / 100.0;
        tally.trades += 1;
        if realized > 0.0 {
            tally.wins += 1;
        }

        let r = realized * signal.size_fraction;
        tally.returns.push(r);
        tally.equity *= 1.0 + r;
        tally.peak = tally.peak.max(tally.equity);

        if tally.peak > 0.0 {
            let dd = (tally.peak - tally.equity) / tally.peak;
            tally.path_max_drawdown = tally.path_max_drawdown.max(dd);
        }
    }

    PerformanceCalculator::calculate(&tally)
}

/// Backtesting engine.
pub struct Backtester {
    config: BacktestConfig,
}

impl Backtester {
    /// Create a new backtester.
    pub fn new(config: BacktestConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Backtest every symbol independently over `[start, end]`.
    ///
    /// Bars for all symbols are fetched concurrently. Symbols with no usable
    /// rows, or whose fetch fails, are left out of the result.
    pub async fn run<P: BarProvider + Sync>(
        &self,
        provider: &P,
        symbols: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<BTreeMap<String, BacktestMetrics>> {
        if start > end {
            bail!("Backtest start {} is after end {}", start, end);
        }

        info!(
            count = symbols.len(),
            start = %start.format("%Y-%m-%d"),
            end = %end.format("%Y-%m-%d"),
            "Starting backtest"
        );

        let fetches = symbols.iter().map(|symbol| async move {
            (symbol, provider.fetch_bars(symbol, start, end).await)
        });

        let mut results = BTreeMap::new();
        for (symbol, fetched) in join_all(fetches).await {
            let bars = match fetched {
                Ok(bars) => bars,
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "Failed to fetch bars, skipping symbol");
                    continue;
                }
            };

            let rows = prepare_features(&bars);
            if rows.is_empty() {
                debug!(symbol = %symbol, bars = bars.len(), "Not enough data, skipping symbol");
                continue;
            }

            let metrics = backtest(&rows, &self.config.signal_config);
            info!(
                symbol = %symbol,
                bars = metrics.bars,
                trades = metrics.trades,
                equity = metrics.equity,
                "Backtest complete"
            );
            results.insert(symbol.clone(), metrics);
        }

        Ok(results)
    }
}

/// Resolve a CLI date range.
///
/// Both ends accept `YYYY-MM-DD` or RFC 3339. A bare end date covers the
/// whole day. `today` (any case) means the current instant.
pub fn parse_date_range(from: &str, to: &str) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let start = parse_bound(from, false)?;
    let end = parse_bound(to, true)?;

    if start > end {
        bail!("Start date {from:?} is after end date {to:?}");
    }
    Ok((start, end))
}

fn parse_bound(s: &str, is_end: bool) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("today") {
        return Ok(Utc::now());
    }

    let ts = parse_timestamp(s)?;
    // A bare date parses to midnight; stretch the end to the last instant of that day
    if is_end && NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok() {
        return Ok(ts + Duration::days(1) - Duration::nanoseconds(1));
    }
    Ok(ts)
}
