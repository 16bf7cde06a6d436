// =============================================================================
// MACD (12, 26, 9) — Moving Average Convergence Divergence
// =============================================================================
//
// MACD line = EMA(12) - EMA(26); signal line = EMA(9) of the MACD line;
// histogram = MACD - signal. Composed entirely from `super::ema::calculate_ema`
// — MACD is nothing but two compositions of the same building block the
// EMA-stack signal already uses.

use super::ema::calculate_ema;

#[derive(Debug, Clone, Copy)]
pub struct MacdResult {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// Compute the most recent MACD(12, 26, 9) reading from a close series.
///
/// Returns `None` when there are too few closes to seed both the slow EMA and
/// the 9-period signal EMA of the MACD line, or when any intermediate value
/// is non-finite.
pub fn calculate_macd(closes: &[f64]) -> Option<MacdResult> {
    calculate_macd_with_periods(closes, 12, 26, 9)
}

/// Parameterised form, primarily for testing against known period choices.
pub fn calculate_macd_with_periods(
    closes: &[f64],
    fast: usize,
    slow: usize,
    signal_period: usize,
) -> Option<MacdResult> {
    if fast == 0 || slow == 0 || signal_period == 0 || fast >= slow {
        return None;
    }

    let ema_fast = calculate_ema(closes, fast);
    let ema_slow = calculate_ema(closes, slow);
    if ema_fast.is_empty() || ema_slow.is_empty() {
        return None;
    }

    // Align the two series: ema_fast has `closes.len() - fast + 1` points,
    // ema_slow has `closes.len() - slow + 1`; the slow series is shorter and
    // always the more recent-aligned tail of the fast one.
    let offset = ema_fast.len().checked_sub(ema_slow.len())?;
    let macd_line: Vec<f64> = ema_slow
        .iter()
        .enumerate()
        .map(|(i, &slow_v)| ema_fast[i + offset] - slow_v)
        .collect();

    if macd_line.len() < signal_period {
        return None;
    }

    let signal_series = calculate_ema(&macd_line, signal_period);
    let signal = *signal_series.last()?;
    let macd = *macd_line.last()?;
    let histogram = macd - signal;

    if !macd.is_finite() || !signal.is_finite() || !histogram.is_finite() {
        return None;
    }

    Some(MacdResult {
        macd,
        signal,
        histogram,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ascending(n: usize) -> Vec<f64> {
        (1..=n).map(|i| i as f64).collect()
    }

    #[test]
    fn insufficient_data_returns_none() {
        assert!(calculate_macd(&ascending(20)).is_none());
    }

    #[test]
    fn ascending_series_has_positive_macd() {
        // A steadily rising series: fast EMA leads slow EMA upward, so MACD
        // should end up positive.
        let closes = ascending(100);
        let result = calculate_macd(&closes).unwrap();
        assert!(result.macd > 0.0);
        assert!(result.macd.is_finite());
        assert!(result.signal.is_finite());
        assert!((result.histogram - (result.macd - result.signal)).abs() < 1e-9);
    }

    #[test]
    fn descending_series_has_negative_macd() {
        let closes: Vec<f64> = (1..=100).rev().map(|x| x as f64).collect();
        let result = calculate_macd(&closes).unwrap();
        assert!(result.macd < 0.0);
    }

    #[test]
    fn flat_series_has_zero_macd() {
        let closes = vec![100.0; 80];
        let result = calculate_macd(&closes).unwrap();
        assert!(result.macd.abs() < 1e-9);
        assert!(result.histogram.abs() < 1e-9);
    }

    #[test]
    fn fast_must_be_less_than_slow() {
        assert!(calculate_macd_with_periods(&ascending(100), 26, 12, 9).is_none());
    }
}
