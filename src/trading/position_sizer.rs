//! Position sizing via a de-rated Kelly criterion.

/// Smallest payoff ratio accepted, keeps the Kelly division finite.
const MIN_WIN_LOSS_RATIO: f64 = 1e-9;

/// Predicted move (percent) that corresponds to a 1:1 payoff.
const UNIT_PAYOFF_MOVE_PCT: f64 = 0.5;

/// Kelly criterion bet fraction.
///
/// f* = (p * (b + 1) - 1) / b
/// where:
///   p = probability of winning, clamped to [0, 1]
///   b = ratio of average win to average loss, floored at a tiny epsilon
///
/// A negative edge means "do not trade", so the result is floored at 0.
pub fn kelly_fraction(win_prob: f64, win_loss_ratio: f64) -> f64 {
    let p = win_prob.clamp(0.0, 1.0);
    let b = win_loss_ratio.max(MIN_WIN_LOSS_RATIO);
    let f = (p * (b + 1.0) - 1.0) / b;
    f.max(0.0)
}

/// Payoff ratio implied by a forecast move: scales with conviction, floored at 1:1.
pub fn win_loss_ratio(predicted_move_pct: f64) -> f64 {
    (predicted_move_pct.abs() / UNIT_PAYOFF_MOVE_PCT).max(1.0)
}

/// Fraction of capital to commit for a decision.
///
/// The raw Kelly fraction is multiplied once more by the win probability
/// before the cap is applied. A NaN probability yields a NaN size, never
/// the cap.
pub fn conviction_size(win_prob: f64, predicted_move_pct: f64, cap: f64) -> f64 {
    let kelly = kelly_fraction(win_prob, win_loss_ratio(predicted_move_pct));
    let size = kelly * win_prob;
    if size.is_nan() {
        return size;
    }
    size.min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_kelly_no_edge() {
        assert_eq!(kelly_fraction(0.5, 1.0), 0.0);
    }

    #[test]
    fn test_kelly_known_value() {
        // (0.8 * 3 - 1) / 2 = 0.7
        assert_close(kelly_fraction(0.8, 2.0), 0.7);
    }

    #[test]
    fn test_kelly_negative_edge_floors_at_zero() {
        assert_eq!(kelly_fraction(0.2, 1.0), 0.0);
        assert_eq!(kelly_fraction(0.0, 5.0), 0.0);
    }

    #[test]
    fn test_kelly_clamps_inputs() {
        // p > 1 behaves like p = 1
        assert_close(kelly_fraction(1.7, 2.0), kelly_fraction(1.0, 2.0));
        assert_close(kelly_fraction(1.0, 2.0), 1.0);

        // Zero or negative ratio must not divide by zero
        let f = kelly_fraction(0.9, 0.0);
        assert!(f.is_finite());
        assert!(f >= 0.0);
        assert!(kelly_fraction(0.9, -3.0).is_finite());
    }

    #[test]
    fn test_kelly_non_negative_over_grid() {
        for pi in 0..=20 {
            let p = pi as f64 / 20.0;
            for b in [0.1, 0.5, 1.0, 1.5, 2.0, 4.0, 10.0] {
                assert!(kelly_fraction(p, b) >= 0.0, "p={p} b={b}");
            }
        }
    }

    #[test]
    fn test_win_loss_ratio_floor() {
        assert_close(win_loss_ratio(0.0), 1.0);
        assert_close(win_loss_ratio(0.3), 1.0);
        assert_close(win_loss_ratio(-1.0), 2.0);
        assert_close(win_loss_ratio(1.5), 3.0);
    }

    #[test]
    fn test_conviction_size_derates_and_caps() {
        // kelly(0.8, 1) = 0.6, de-rated by 0.8 -> 0.48
        assert_close(conviction_size(0.8, 0.5, 0.5), 0.48);
        assert_close(conviction_size(0.8, 0.5, 0.25), 0.25);
        assert_eq!(conviction_size(0.5, 0.0, 0.5), 0.0);
    }

    #[test]
    fn test_conviction_size_nan_probability_stays_nan() {
        assert!(conviction_size(f64::NAN, 1.0, 0.5).is_nan());
        assert!(conviction_size(f64::NAN, 1.0, 0.0).is_nan());
    }
}
