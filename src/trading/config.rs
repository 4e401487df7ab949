//! Signal and risk configuration.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Configuration for signal generation and position sizing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalConfig {
    /// Hard ceiling on any position size (0.0 to 1.0), whatever the Kelly edge
    pub kelly_fraction_cap: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            kelly_fraction_cap: 0.5, // Half of capital at most
        }
    }
}

/// Configuration for the daily-loss circuit breaker and entry limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Daily P&L (percent, <= 0) at or below which new entries are disabled
    pub max_daily_loss_pct: f64,

    /// Maximum exposure to a single symbol (percent of equity)
    pub per_symbol_cap_pct: f64,

    /// Minimum account equity in USD required to open positions (PDT rule)
    pub min_account_equity: Decimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_daily_loss_pct: -2.0,            // Halt after -2% day
            per_symbol_cap_pct: 5.0,             // Max 5% per symbol
            min_account_equity: dec!(25000),     // Pattern day trader floor
        }
    }
}
