//! Technical indicators over plain `f64` series.
//!
//! Every function returns a vector aligned with its input. Values that cannot
//! be computed yet (warm-up) are `NaN`; rolling windows need a full window of
//! non-NaN inputs.

use crate::models::Bar;

/// Guard added to denominators that may be zero.
const EPS: f64 = 1e-9;

/// Exponential moving average with `alpha = 2 / (span + 1)`.
///
/// Non-adjusted recursion: EMA[0] = x[0], EMA[t] = alpha * x[t] + (1 - alpha) * EMA[t-1].
/// NaN inputs carry the previous value forward.
pub fn ema(values: &[f64], span: usize) -> Vec<f64> {
    let alpha = 2.0 / (span.max(1) as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut prev = f64::NAN;

    for &x in values {
        if x.is_nan() {
            out.push(prev);
            continue;
        }
        prev = if prev.is_nan() {
            x
        } else {
            alpha * x + (1.0 - alpha) * prev
        };
        out.push(prev);
    }

    out
}

/// Simple rolling mean. NaN until `window` non-NaN values fill the window.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    rolling(values, window, |w| w.iter().sum::<f64>() / w.len() as f64)
}

/// Relative Strength Index from simple rolling means of gains and losses.
///
/// rs = avg_gain / (avg_loss + eps), RSI = 100 - 100 / (1 + rs).
/// The first `period` values are NaN.
pub fn rsi(values: &[f64], period: usize) -> Vec<f64> {
    let delta = diff(values);
    let gains: Vec<f64> = delta
        .iter()
        .map(|&d| if d.is_nan() { f64::NAN } else { d.max(0.0) })
        .collect();
    let losses: Vec<f64> = delta
        .iter()
        .map(|&d| if d.is_nan() { f64::NAN } else { (-d).max(0.0) })
        .collect();

    let avg_gain = rolling_mean(&gains, period);
    let avg_loss = rolling_mean(&losses, period);

    avg_gain
        .iter()
        .zip(&avg_loss)
        .map(|(&g, &l)| {
            let rs = g / (l + EPS);
            100.0 - 100.0 / (1.0 + rs)
        })
        .collect()
}

/// Fractional change from the previous value. First element is NaN.
pub fn pct_change(values: &[f64]) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    for i in 1..values.len() {
        out[i] = values[i] / values[i - 1] - 1.0;
    }
    out
}

/// MACD line and histogram (line minus its signal EMA).
pub fn macd(values: &[f64], fast: usize, slow: usize, signal: usize) -> (Vec<f64>, Vec<f64>) {
    let fast_ema = ema(values, fast);
    let slow_ema = ema(values, slow);
    let line: Vec<f64> = fast_ema.iter().zip(&slow_ema).map(|(f, s)| f - s).collect();
    let signal_line = ema(&line, signal);
    let histogram = line.iter().zip(&signal_line).map(|(m, s)| m - s).collect();
    (line, histogram)
}

/// Average true range: rolling mean of the true range.
///
/// The first bar has no previous close, so its true range is high - low.
pub fn atr(bars: &[Bar], period: usize) -> Vec<f64> {
    let true_range: Vec<f64> = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            let high_low = bar.range().abs();
            match i.checked_sub(1).map(|p| bars[p].close) {
                Some(prev_close) => high_low
                    .max((bar.high - prev_close).abs())
                    .max((bar.low - prev_close).abs()),
                None => high_low,
            }
        })
        .collect();

    rolling_mean(&true_range, period)
}

/// Cumulative volume-weighted average price.
pub fn vwap(bars: &[Bar]) -> Vec<f64> {
    let mut pv = 0.0;
    let mut v = 0.0;
    bars.iter()
        .map(|bar| {
            pv += bar.close * bar.volume;
            v += bar.volume;
            pv / (v + EPS)
        })
        .collect()
}

/// Rolling z-score using the population standard deviation.
pub fn rolling_zscore(values: &[f64], window: usize) -> Vec<f64> {
    let means = rolling_mean(values, window);
    let stds = rolling(values, window, |w| {
        let mean = w.iter().sum::<f64>() / w.len() as f64;
        let var = w.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / w.len() as f64;
        var.sqrt()
    });

    values
        .iter()
        .zip(means.iter().zip(&stds))
        .map(|(&x, (&m, &s))| (x - m) / (s + EPS))
        .collect()
}

/// Position of implied volatility inside its trailing min/max range (0 to 1).
pub fn implied_vol_rank(iv: &[f64], lookback: usize) -> Vec<f64> {
    let lows = rolling(iv, lookback, |w| w.iter().copied().fold(f64::INFINITY, f64::min));
    let highs = rolling(iv, lookback, |w| {
        w.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    });

    iv.iter()
        .zip(lows.iter().zip(&highs))
        .map(|(&x, (&lo, &hi))| (x - lo) / (hi - lo + EPS))
        .collect()
}

/// First difference. First element is NaN.
fn diff(values: &[f64]) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    for i in 1..values.len() {
        out[i] = values[i] - values[i - 1];
    }
    out
}

/// Apply `f` to every full window that contains no NaN.
fn rolling(values: &[f64], window: usize, f: impl Fn(&[f64]) -> f64) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if window == 0 || values.len() < window {
        return out;
    }

    for end in (window - 1)..values.len() {
        let w = &values[end + 1 - window..=end];
        if w.iter().any(|x| x.is_nan()) {
            continue;
        }
        out[end] = f(w);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn assert_approx(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() < tol,
            "expected {expected}, got {actual}"
        );
    }

    fn make_bars(ohlc: &[(f64, f64, f64, f64)]) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        ohlc.iter()
            .enumerate()
            .map(|(i, &(open, high, low, close))| Bar {
                timestamp: start + Duration::days(i as i64),
                open,
                high,
                low,
                close,
                volume: 1000.0,
            })
            .collect()
    }

    #[test]
    fn test_ema_seed_and_recursion() {
        let out = ema(&[10.0, 12.0, 14.0], 3);
        // alpha = 0.5
        assert_approx(out[0], 10.0, 1e-12);
        assert_approx(out[1], 11.0, 1e-12);
        assert_approx(out[2], 12.5, 1e-12);
    }

    #[test]
    fn test_ema_constant_series() {
        let out = ema(&[7.0; 30], 21);
        assert!(out.iter().all(|&v| (v - 7.0).abs() < 1e-12));
    }

    #[test]
    fn test_rolling_mean_warmup() {
        let out = rolling_mean(&[1.0, 2.0, 3.0, 4.0], 3);
        assert!(out[0].is_nan());
        assert!(out[1].is_nan());
        assert_approx(out[2], 2.0, 1e-12);
        assert_approx(out[3], 3.0, 1e-12);
    }

    #[test]
    fn test_rsi_warmup_is_period() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + (i % 3) as f64).collect();
        let out = rsi(&closes, 14);
        assert!(out[..14].iter().all(|v| v.is_nan()));
        assert!(out[14..].iter().all(|v| !v.is_nan()));
    }

    #[test]
    fn test_rsi_extremes() {
        let rising: Vec<f64> = (0..16).map(|i| 100.0 + i as f64).collect();
        let out = rsi(&rising, 14);
        assert_approx(out[15], 100.0, 1e-6);

        let falling: Vec<f64> = (0..16).map(|i| 100.0 - i as f64).collect();
        let out = rsi(&falling, 14);
        assert_approx(out[15], 0.0, 1e-6);
    }

    #[test]
    fn test_rsi_mixed_in_bounds() {
        let closes = [
            44.0, 44.34, 44.09, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08, 45.89, 46.03,
            45.61, 46.28, 46.28, 46.00,
        ];
        let out = rsi(&closes, 14);
        for v in out.iter().filter(|v| !v.is_nan()) {
            assert!((0.0..=100.0).contains(v), "RSI out of bounds: {v}");
        }
        assert!(out[14] > 50.0);
    }

    #[test]
    fn test_pct_change() {
        let out = pct_change(&[100.0, 101.0, 99.99]);
        assert!(out[0].is_nan());
        assert_approx(out[1], 0.01, 1e-12);
        assert_approx(out[2], -0.01, 1e-12);
    }

    #[test]
    fn test_macd_flat_series_is_zero() {
        let (line, hist) = macd(&[50.0; 40], 12, 26, 9);
        assert!(line.iter().all(|v| v.abs() < 1e-12));
        assert!(hist.iter().all(|v| v.abs() < 1e-12));
    }

    #[test]
    fn test_macd_uptrend_positive() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let (line, _) = macd(&closes, 12, 26, 9);
        assert!(line[59] > 0.0);
    }

    #[test]
    fn test_atr_uses_gaps() {
        let bars = make_bars(&[
            (10.0, 11.0, 9.0, 10.0),  // TR = 2 (high - low)
            (13.0, 14.0, 12.5, 13.5), // TR = max(1.5, 4, 2.5) = 4
            (13.0, 13.5, 12.0, 12.5), // TR = max(1.5, 0, 1.5) = 1.5
        ]);
        let out = atr(&bars, 3);
        assert!(out[0].is_nan());
        assert!(out[1].is_nan());
        assert_approx(out[2], 7.5 / 3.0, 1e-12);
    }

    #[test]
    fn test_vwap_cumulative() {
        let mut bars = make_bars(&[(10.0, 10.0, 10.0, 10.0), (20.0, 20.0, 20.0, 20.0)]);
        bars[0].volume = 1.0;
        bars[1].volume = 3.0;
        let out = vwap(&bars);
        assert_approx(out[0], 10.0, 1e-6);
        assert_approx(out[1], 17.5, 1e-6);
    }

    #[test]
    fn test_rolling_zscore() {
        let out = rolling_zscore(&[1.0, 2.0, 3.0], 3);
        assert!(out[1].is_nan());
        // mean 2, population sd sqrt(2/3)
        assert_approx(out[2], 1.0 / (2.0f64 / 3.0).sqrt(), 1e-6);
    }

    #[test]
    fn test_implied_vol_rank() {
        let out = implied_vol_rank(&[0.2, 0.4, 0.3, 0.4], 3);
        assert!(out[1].is_nan());
        assert_approx(out[2], 0.5, 1e-6);
        assert_approx(out[3], 1.0, 1e-6);
    }
}
