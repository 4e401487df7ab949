//! Signal rule engine.
//!
//! A fixed decision table:
//! - Directional gate: BUY / SHORT / HOLD from forecast, RSI and EMA21 position
//! - Volatility overlay: may swap the action for an options play
//! - Sizing, stops and targets derived from the forecast move

use tracing::debug;

use crate::models::{FeatureRow, Signal, TradeAction};

use super::position_sizer::conviction_size;
use super::SignalConfig;

// === Directional gate ===
/// Minimum forecast move (percent) for a directional trade
const MIN_DIRECTIONAL_MOVE_PCT: f64 = 0.25;

/// Minimum ensemble probability for a directional trade
const MIN_DIRECTIONAL_PROB: f64 = 0.70;

/// BUY requires RSI strictly below this
const BUY_RSI_CEILING: f64 = 65.0;

/// SHORT requires RSI strictly above this
const SHORT_RSI_FLOOR: f64 = 35.0;

// === Volatility overlay ===
/// IV rank below which premium is considered cheap
const LOW_IVR: f64 = 0.3;

/// Big-move probability at which a straddle is preferred
const BIG_MOVE_PROB: f64 = 0.6;

// === Stops / targets ===
const STOP_LOSS_MULT: f64 = 0.8;
const TARGET_MULT: f64 = 1.5;

const BUY_RATIONALE: &str = "Up prob >=0.70, RSI<65, above EMA21";
const SHORT_RATIONALE: &str = "Down prob >=0.70, RSI>35, below EMA21";
const STRADDLE_RATIONALE: &str = "IVR<0.3 and P(|move|>1%)>=0.6 -> 1SD straddle";
const ATM_RATIONALE: &str = "Directional + buy 7DTE ATM option";
const NO_EDGE: &str = "No edge";

/// Produce a trade signal for one set of features.
///
/// Pure: identical inputs always give identical output. Inputs are taken
/// as-is; NaN or out-of-range values are not rejected here.
pub fn generate_signal(features: &FeatureRow, config: &SignalConfig) -> Signal {
    let mut rationale: Vec<&'static str> = Vec::new();

    let mut action = directional_action(features);
    match action {
        TradeAction::Buy => rationale.push(BUY_RATIONALE),
        TradeAction::Short => rationale.push(SHORT_RATIONALE),
        _ => {}
    }

    // Options overlay, may override the directional call
    if features.ivr < LOW_IVR && features.prob_big_move >= BIG_MOVE_PROB {
        action = TradeAction::OptionSellStraddle;
        rationale.push(STRADDLE_RATIONALE);
    } else if action.is_directional() && features.prob_big_move < BIG_MOVE_PROB {
        action = TradeAction::OptionBuyAtm;
        rationale.push(ATM_RATIONALE);
    }

    let win_prob = features.ensemble_up_prob.max(features.ensemble_down_prob);
    let size_fraction = conviction_size(
        win_prob,
        features.predicted_move_pct,
        config.kelly_fraction_cap,
    );

    let move_abs = features.predicted_move_pct.abs();
    let stop_loss_pct = -move_abs * STOP_LOSS_MULT;
    let target_pct = move_abs * TARGET_MULT;

    let confidence = (win_prob * 100.0).round_ties_even() as u8;

    let rationale = if rationale.is_empty() {
        NO_EDGE.to_string()
    } else {
        rationale.join("; ")
    };

    debug!(
        action = %action,
        win_prob = win_prob,
        size = size_fraction,
        "Signal generated"
    );

    Signal {
        action,
        probability: win_prob,
        predicted_move_pct: features.predicted_move_pct,
        confidence,
        size_fraction,
        stop_loss_pct,
        target_pct,
        rationale,
    }
}

/// Directional gate. At most one branch fires.
///
/// The RSI bounds are asymmetric on purpose: BUY needs RSI < 65, SHORT
/// needs RSI > 35.
fn directional_action(f: &FeatureRow) -> TradeAction {
    if f.predicted_move_pct >= MIN_DIRECTIONAL_MOVE_PCT
        && f.ensemble_up_prob >= MIN_DIRECTIONAL_PROB
        && f.rsi < BUY_RSI_CEILING
        && f.price_vs_ema21 >= 0.0
    {
        TradeAction::Buy
    } else if f.predicted_move_pct <= -MIN_DIRECTIONAL_MOVE_PCT
        && f.ensemble_down_prob >= MIN_DIRECTIONAL_PROB
        && f.rsi > SHORT_RSI_FLOOR
        && f.price_vs_ema21 <= 0.0
    {
        TradeAction::Short
    } else {
        TradeAction::Hold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> SignalConfig {
        SignalConfig {
            kelly_fraction_cap: 0.5,
        }
    }

    fn bullish() -> FeatureRow {
        FeatureRow {
            ensemble_up_prob: 0.8,
            ensemble_down_prob: 0.2,
            predicted_move_pct: 0.5,
            rsi: 50.0,
            price_vs_ema21: 0.1,
            ivr: 0.5,
            prob_big_move: 0.7,
        }
    }

    fn bearish() -> FeatureRow {
        FeatureRow {
            ensemble_up_prob: 0.2,
            ensemble_down_prob: 0.8,
            predicted_move_pct: -0.5,
            rsi: 50.0,
            price_vs_ema21: -0.1,
            ivr: 0.5,
            prob_big_move: 0.7,
        }
    }

    #[test]
    fn test_buy_signal() {
        let signal = generate_signal(&bullish(), &cfg());
        assert_eq!(signal.action, TradeAction::Buy);
        assert_eq!(signal.rationale, BUY_RATIONALE);
        assert_eq!(signal.confidence, 80);
        assert!((signal.size_fraction - 0.48).abs() < 1e-12);
        assert!((signal.stop_loss_pct + 0.4).abs() < 1e-12);
        assert!((signal.target_pct - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_short_signal() {
        let signal = generate_signal(&bearish(), &cfg());
        assert_eq!(signal.action, TradeAction::Short);
        assert_eq!(signal.rationale, SHORT_RATIONALE);
        assert_eq!(signal.probability, 0.8);
        assert_eq!(signal.predicted_move_pct, -0.5);
    }

    #[test]
    fn test_no_edge_hold() {
        let signal = generate_signal(&FeatureRow::default(), &cfg());
        assert_eq!(signal.action, TradeAction::Hold);
        assert_eq!(signal.rationale, "No edge");
        assert_eq!(signal.size_fraction, 0.0);
        assert_eq!(signal.confidence, 50);
    }

    #[test]
    fn test_rsi_boundaries_are_exclusive() {
        let at_ceiling = FeatureRow {
            rsi: 65.0,
            ..bullish()
        };
        assert_eq!(generate_signal(&at_ceiling, &cfg()).action, TradeAction::Hold);

        let at_floor = FeatureRow {
            rsi: 35.0,
            ..bearish()
        };
        assert_eq!(generate_signal(&at_floor, &cfg()).action, TradeAction::Hold);

        // The asymmetric side of each band still trades
        let low_rsi_buy = FeatureRow {
            rsi: 20.0,
            ..bullish()
        };
        assert_eq!(generate_signal(&low_rsi_buy, &cfg()).action, TradeAction::Buy);
        let high_rsi_short = FeatureRow {
            rsi: 80.0,
            ..bearish()
        };
        assert_eq!(generate_signal(&high_rsi_short, &cfg()).action, TradeAction::Short);
    }

    #[test]
    fn test_directional_inclusive_thresholds() {
        let edge = FeatureRow {
            predicted_move_pct: 0.25,
            ensemble_up_prob: 0.70,
            price_vs_ema21: 0.0,
            ..bullish()
        };
        assert_eq!(generate_signal(&edge, &cfg()).action, TradeAction::Buy);

        let below_ema = FeatureRow {
            price_vs_ema21: -0.001,
            ..edge
        };
        assert_eq!(generate_signal(&below_ema, &cfg()).action, TradeAction::Hold);
    }

    #[test]
    fn test_straddle_overrides_buy() {
        let features = FeatureRow {
            ivr: 0.2,
            prob_big_move: 0.7,
            ..bullish()
        };
        let signal = generate_signal(&features, &cfg());
        assert_eq!(signal.action, TradeAction::OptionSellStraddle);
        // Rationale is append-only: the directional reason survives
        assert_eq!(
            signal.rationale,
            format!("{BUY_RATIONALE}; {STRADDLE_RATIONALE}")
        );
    }

    #[test]
    fn test_straddle_without_direction() {
        let features = FeatureRow {
            ivr: 0.1,
            prob_big_move: 0.6,
            ..FeatureRow::default()
        };
        let signal = generate_signal(&features, &cfg());
        assert_eq!(signal.action, TradeAction::OptionSellStraddle);
        assert_eq!(signal.rationale, STRADDLE_RATIONALE);
    }

    #[test]
    fn test_directional_becomes_atm_option() {
        let features = FeatureRow {
            prob_big_move: 0.5,
            ..bearish()
        };
        let signal = generate_signal(&features, &cfg());
        assert_eq!(signal.action, TradeAction::OptionBuyAtm);
        assert_eq!(
            signal.rationale,
            format!("{SHORT_RATIONALE}; {ATM_RATIONALE}")
        );

        // HOLD never turns into an ATM option
        let hold = FeatureRow {
            prob_big_move: 0.1,
            ..FeatureRow::default()
        };
        assert_eq!(generate_signal(&hold, &cfg()).action, TradeAction::Hold);
    }

    #[test]
    fn test_stops_apply_to_hold() {
        let features = FeatureRow {
            predicted_move_pct: -0.2,
            ..FeatureRow::default()
        };
        let signal = generate_signal(&features, &cfg());
        assert_eq!(signal.action, TradeAction::Hold);
        assert!((signal.stop_loss_pct + 0.16).abs() < 1e-12);
        assert!((signal.target_pct - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_size_and_confidence_bounds() {
        let caps = [0.0, 0.1, 0.25, 0.5, 1.0];
        let probs = [0.0, 0.3, 0.5, 0.7, 0.9, 1.0];
        let moves = [-3.0, -0.5, 0.0, 0.25, 1.0, 5.0];

        for &cap in &caps {
            let config = SignalConfig {
                kelly_fraction_cap: cap,
            };
            for &up in &probs {
                for &down in &probs {
                    for &mv in &moves {
                        let features = FeatureRow {
                            ensemble_up_prob: up,
                            ensemble_down_prob: down,
                            predicted_move_pct: mv,
                            ..bullish()
                        };
                        let s = generate_signal(&features, &config);
                        assert!(s.size_fraction >= 0.0 && s.size_fraction <= cap);
                        assert!(s.confidence <= 100);
                        assert!(s.stop_loss_pct <= 0.0);
                        assert!(s.target_pct >= 0.0);
                    }
                }
            }
        }
    }

    #[test]
    fn test_nan_probabilities_do_not_size_at_cap() {
        let features = FeatureRow {
            ensemble_up_prob: f64::NAN,
            ensemble_down_prob: f64::NAN,
            ..FeatureRow::default()
        };
        let signal = generate_signal(&features, &cfg());
        assert_eq!(signal.action, TradeAction::Hold);
        assert!(signal.size_fraction.is_nan());
        assert_ne!(signal.size_fraction, cfg().kelly_fraction_cap);
    }

    #[test]
    fn test_probabilities_need_not_sum_to_one() {
        let features = FeatureRow {
            ensemble_up_prob: 0.9,
            ensemble_down_prob: 0.9,
            ..bullish()
        };
        let signal = generate_signal(&features, &cfg());
        assert_eq!(signal.action, TradeAction::Buy);
        assert_eq!(signal.confidence, 90);
    }

    #[test]
    fn test_confidence_rounds_half_to_even() {
        let features = FeatureRow {
            ensemble_up_prob: 0.125,
            ensemble_down_prob: 0.125,
            ..FeatureRow::default()
        };
        // 12.5 -> 12
        assert_eq!(generate_signal(&features, &cfg()).confidence, 12);
    }

    #[test]
    fn test_idempotent() {
        let features = FeatureRow {
            ivr: 0.25,
            prob_big_move: 0.55,
            ..bullish()
        };
        let a = generate_signal(&features, &cfg());
        let b = generate_signal(&features, &cfg());
        assert_eq!(a, b);
        assert_eq!(a.size_fraction.to_bits(), b.size_fraction.to_bits());
    }
}
