//! Decision inputs consumed by the signal rule engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The seven inputs of one trading decision.
///
/// Up and down probabilities come from independent estimators and are not
/// required to sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    /// Probability the next move is up (0.0 to 1.0)
    pub ensemble_up_prob: f64,

    /// Probability the next move is down (0.0 to 1.0)
    pub ensemble_down_prob: f64,

    /// Forecast move in percent (signed)
    pub predicted_move_pct: f64,

    /// RSI(14), 0 to 100
    pub rsi: f64,

    /// Signed fractional distance of close from its 21-period EMA
    pub price_vs_ema21: f64,

    /// Implied-volatility rank (0.0 to 1.0)
    pub ivr: f64,

    /// Probability of a large move (0.0 to 1.0)
    pub prob_big_move: f64,
}

impl Default for FeatureRow {
    /// Neutral inputs: no directional edge, no volatility edge.
    fn default() -> Self {
        Self {
            ensemble_up_prob: 0.5,
            ensemble_down_prob: 0.5,
            predicted_move_pct: 0.0,
            rsi: 50.0,
            price_vs_ema21: 0.0,
            ivr: 0.5,
            prob_big_move: 0.5,
        }
    }
}

/// A feature row paired with the move that actually happened on that bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabeledFeatureRow {
    pub timestamp: DateTime<Utc>,
    pub features: FeatureRow,

    /// Realized close-to-close move in percent
    pub actual_move_pct: f64,
}
