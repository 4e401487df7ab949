//! Turns raw bars into labeled feature rows for the backtester.
//!
//! The forecast inputs produced here are placeholders, not a model:
//! - `predicted_move_pct` is yesterday's realized move (one-bar-lagged naive forecast)
//! - up/down probabilities are 0.7/0.3 depending only on that forecast's sign
//! - IV rank and big-move probability are constants
//!
//! With these constants the options overlay can never fire (IVR 0.5 is not
//! "low" and big-move 0.7 is not "low"), so prepared rows only ever yield
//! BUY, SHORT or HOLD. Swap in real estimators to exercise the overlay.

use crate::models::{closes, Bar, FeatureRow, LabeledFeatureRow};

use super::indicators::{ema, pct_change, rsi};

pub const RSI_PERIOD: usize = 14;
pub const EMA_SPAN: usize = 21;

/// RSI used while the indicator is still warming up
const NEUTRAL_RSI: f64 = 50.0;

/// Naive ensemble probabilities keyed on the forecast's sign
const NAIVE_FAVORED_PROB: f64 = 0.7;
const NAIVE_UNFAVORED_PROB: f64 = 0.3;

/// Placeholder implied-volatility rank
pub const PLACEHOLDER_IVR: f64 = 0.5;

/// Placeholder probability of a large move
pub const PLACEHOLDER_PROB_BIG_MOVE: f64 = 0.7;

/// Build one labeled feature row per bar, dropping the first bar (no prior close).
pub fn prepare_features(bars: &[Bar]) -> Vec<LabeledFeatureRow> {
    let close = closes(bars);
    let rsi = rsi(&close, RSI_PERIOD);
    let ema21 = ema(&close, EMA_SPAN);
    let moves: Vec<f64> = pct_change(&close).iter().map(|m| m * 100.0).collect();

    bars.iter()
        .enumerate()
        .filter(|&(i, _)| !moves[i].is_nan())
        .map(|(i, bar)| {
            let predicted_move_pct = i
                .checked_sub(1)
                .map(|p| moves[p])
                .filter(|m| !m.is_nan())
                .unwrap_or(0.0);

            let ensemble_up_prob = if predicted_move_pct >= 0.0 {
                NAIVE_FAVORED_PROB
            } else {
                NAIVE_UNFAVORED_PROB
            };

            let price_vs_ema21 = fill_nan((close[i] - ema21[i]) / ema21[i], 0.0);

            LabeledFeatureRow {
                timestamp: bar.timestamp,
                features: FeatureRow {
                    ensemble_up_prob,
                    ensemble_down_prob: 1.0 - ensemble_up_prob,
                    predicted_move_pct,
                    rsi: fill_nan(rsi[i], NEUTRAL_RSI),
                    price_vs_ema21,
                    ivr: PLACEHOLDER_IVR,
                    prob_big_move: PLACEHOLDER_PROB_BIG_MOVE,
                },
                actual_move_pct: moves[i],
            }
        })
        .collect()
}

fn fill_nan(value: f64, fill: f64) -> f64 {
    if value.is_nan() {
        fill
    } else {
        value
    }
}
