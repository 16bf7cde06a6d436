// =============================================================================
// Candle series data-quality assessment
// =============================================================================
//
// Before handing a fetched series to the scorer, the
// scheduler worker checks for timestamp gaps and a stale tail so a silently
// truncated or frozen feed does not masquerade as a healthy one.

use crate::market_data::Candle;

#[derive(Debug, Clone, PartialEq)]
pub struct QualityVerdict {
    pub usable: bool,
    pub gap_count: usize,
    pub stale: bool,
    pub reason: Option<String>,
}

/// Assess `candles` (closed, oldest-first) against the nominal timeframe
/// duration `tf_ms`. A series is unusable if it has fewer than 2 candles, or
/// if more than `max_gap_fraction` of the consecutive intervals deviate from
/// `tf_ms` by more than 50%. `now_ms` drives staleness: the most recent
/// candle's `close_time` may not lag more than `3 * tf_ms` behind it.
pub fn assess(candles: &[Candle], tf_ms: i64, now_ms: i64) -> QualityVerdict {
    if candles.len() < 2 {
        return QualityVerdict {
            usable: candles.len() == 1,
            gap_count: 0,
            stale: false,
            reason: if candles.is_empty() {
                Some("empty series".to_string())
            } else {
                None
            },
        };
    }

    let mut gap_count = 0usize;
    for pair in candles.windows(2) {
        let delta = pair[1].open_time - pair[0].open_time;
        if (delta - tf_ms).abs() as f64 > tf_ms as f64 * 0.5 {
            gap_count += 1;
        }
    }

    let max_gap_fraction = 0.1;
    let gap_ratio = gap_count as f64 / (candles.len() - 1) as f64;

    let last_close_time = candles.last().map(|c| c.close_time).unwrap_or(0);
    let stale = now_ms.saturating_sub(last_close_time) > tf_ms.saturating_mul(3);

    let usable = gap_ratio <= max_gap_fraction && !stale;
    let reason = if !usable {
        Some(if stale {
            "stale tail".to_string()
        } else {
            format!("{gap_count} timestamp gaps across {} candles", candles.len())
        })
    } else {
        None
    };

    QualityVerdict {
        usable,
        gap_count,
        stale,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(open_time: i64) -> Candle {
        Candle {
            open_time,
            close_time: open_time + 60_000,
            open: 100.0,
            high: 101.0,
            low: 99.0,
            close: 100.0,
            volume: 10.0,
            quote_volume: 1000.0,
            trades_count: 5,
            taker_buy_volume: 5.0,
            taker_buy_quote_volume: 500.0,
            is_closed: true,
        }
    }

    #[test]
    fn empty_series_is_unusable() {
        let verdict = assess(&[], 60_000, 0);
        assert!(!verdict.usable);
    }

    #[test]
    fn contiguous_series_is_usable() {
        let candles: Vec<Candle> = (0..10).map(|i| candle(i * 60_000)).collect();
        let now = 10 * 60_000;
        let verdict = assess(&candles, 60_000, now);
        assert!(verdict.usable);
        assert_eq!(verdict.gap_count, 0);
    }

    #[test]
    fn gapped_series_flagged() {
        let mut candles: Vec<Candle> = (0..5).map(|i| candle(i * 60_000)).collect();
        // Introduce a large gap.
        candles.push(candle(20 * 60_000));
        let now = 20 * 60_000;
        let verdict = assess(&candles, 60_000, now);
        assert!(verdict.gap_count >= 1);
    }

    #[test]
    fn stale_tail_is_flagged() {
        let candles: Vec<Candle> = (0..10).map(|i| candle(i * 60_000)).collect();
        let now = 10_000 * 60_000; // far in the future
        let verdict = assess(&candles, 60_000, now);
        assert!(verdict.stale);
        assert!(!verdict.usable);
    }
}
