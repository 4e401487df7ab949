//! Calculator for backtest performance metrics: CAGR, drawdown, Sharpe, Sortino, etc.

use statrs::statistics::Statistics;

use crate::models::BacktestMetrics;

/// Bars per year used for annualization.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Guard added to risk denominators.
const EPS: f64 = 1e-9;

/// Raw outcome of one simulation pass, before aggregation.
#[derive(Debug, Clone, Default)]
pub struct SimulationTally {
    /// Per-bar realized returns (0.0 for HOLD bars)
    pub returns: Vec<f64>,

    /// Final compounded equity
    pub equity: f64,

    /// Highest equity seen
    pub peak: f64,

    /// Largest peak-to-trough drawdown seen along the path
    pub path_max_drawdown: f64,

    pub trades: u32,
    pub wins: u32,
}

/// Calculator for aggregate backtest statistics.
pub struct PerformanceCalculator;

impl PerformanceCalculator {
    /// Aggregate a simulation tally into final metrics.
    pub fn calculate(tally: &SimulationTally) -> BacktestMetrics {
        let returns = &tally.returns;
        let n = returns.len();

        let cagr = tally
            .equity
            .powf(TRADING_DAYS_PER_YEAR / n.max(1) as f64)
            - 1.0;

        // Final equity against its peak, not the worst point on the path
        let max_drawdown = if tally.peak > 0.0 {
            (tally.peak - tally.equity) / tally.peak
        } else {
            0.0
        };

        let (sharpe, sortino) = Self::risk_ratios(returns);

        let win_rate = tally.wins as f64 / tally.trades.max(1) as f64;

        BacktestMetrics {
            cagr,
            max_drawdown,
            sharpe,
            sortino,
            win_rate,
            profit_factor: Self::profit_factor(returns),
            trades: tally.trades,
            equity: tally.equity,
            path_max_drawdown: tally.path_max_drawdown,
            bars: n,
        }
    }

    /// Annualized Sharpe and Sortino ratios.
    ///
    /// Both use the sample standard deviation. With fewer than two losing
    /// bars the downside deviation is undefined and Sortino is NaN.
    fn risk_ratios(returns: &[f64]) -> (f64, f64) {
        let mean = returns.iter().mean();
        let std_dev = returns.iter().std_dev();
        let annualizer = TRADING_DAYS_PER_YEAR.sqrt();

        let sharpe = mean / (std_dev + EPS) * annualizer;

        let downside_dev = returns.iter().copied().filter(|&r| r < 0.0).std_dev();
        let sortino = mean / (downside_dev + EPS) * annualizer;

        (sharpe, sortino)
    }

    /// Gross positive return over gross negative return.
    fn profit_factor(returns: &[f64]) -> f64 {
        let gross_profit: f64 = returns.iter().filter(|&&r| r > 0.0).sum();
        let gross_loss: f64 = returns.iter().filter(|&&r| r < 0.0).sum();
        gross_profit / (gross_loss.abs() + EPS)
    }
}
