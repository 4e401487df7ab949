//! Backtest performance metrics: CAGR, drawdown, Sharpe/Sortino, win rate, profit factor.

use serde::{Deserialize, Serialize};

/// Aggregate performance of one symbol's backtest.
///
/// Derived entirely from the ordered per-bar return series; never mutated
/// after computation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BacktestMetrics {
    /// Annualized growth, assuming 252 bars per year
    #[serde(rename = "CAGR")]
    pub cagr: f64,

    /// Drawdown of the final equity from its running peak (0.0 to 1.0)
    pub max_drawdown: f64,

    /// Annualized Sharpe ratio (sample std dev)
    #[serde(rename = "Sharpe")]
    pub sharpe: f64,

    /// Annualized Sortino ratio. NaN when fewer than two losing bars exist.
    #[serde(rename = "Sortino")]
    pub sortino: f64,

    /// Winning trades / trades
    pub win_rate: f64,

    /// Gross positive return / gross negative return
    pub profit_factor: f64,

    /// Number of non-HOLD decisions
    pub trades: u32,

    /// Final compounded equity multiplier, starting at 1.0
    pub equity: f64,

    /// Largest peak-to-trough drawdown over the whole equity path
    pub path_max_drawdown: f64,

    /// Length of the return series (HOLD bars included)
    pub bars: usize,
}

impl BacktestMetrics {
    /// Total return as a fraction.
    pub fn total_return(&self) -> f64 {
        self.equity - 1.0
    }

    /// True when at least one trade was taken and equity grew.
    pub fn is_profitable(&self) -> bool {
        self.trades > 0 && self.equity > 1.0
    }
}

impl std::fmt::Display for BacktestMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "--- Returns ---")?;
        writeln!(f, "Equity:        {:.6}", self.equity)?;
        writeln!(f, "Return:        {:.2}%", self.total_return() * 100.0)?;
        writeln!(f, "CAGR:          {:.2}%", self.cagr * 100.0)?;
        writeln!(f)?;
        writeln!(f, "--- Trades ---")?;
        writeln!(f, "Bars:          {}", self.bars)?;
        writeln!(f, "Trades:        {}", self.trades)?;
        writeln!(f, "Win Rate:      {:.1}%", self.win_rate * 100.0)?;
        writeln!(f, "Profit Factor: {:.2}", self.profit_factor)?;
        writeln!(f)?;
        writeln!(f, "--- Risk Metrics ---")?;
        writeln!(f, "Drawdown:      {:.2}%", self.max_drawdown * 100.0)?;
        writeln!(f, "Path Max DD:   {:.2}%", self.path_max_drawdown * 100.0)?;
        writeln!(f, "Sharpe Ratio:  {:.2}", self.sharpe)?;
        write!(f, "Sortino Ratio: {:.2}", self.sortino)
    }
}
