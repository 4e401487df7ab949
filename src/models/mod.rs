//! Data models for bars, feature rows, signals, and backtest metrics.

mod bar;
mod features;
mod metrics;
mod signal;

pub use bar::{closes, Bar};
pub use features::{FeatureRow, LabeledFeatureRow};
pub use metrics::BacktestMetrics;
pub use signal::{Signal, TradeAction};
