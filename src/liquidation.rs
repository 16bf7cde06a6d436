// =============================================================================
// Liquidation zone synthesis
// =============================================================================
//
// In the absence of a real liquidation-data provider this module derives
// deterministic synthetic zones from swing highs/lows in the candle series,
// seeded so repeated scans over the same data are byte-identical.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::market_data::Candle;
use crate::types::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LiquidationZone {
    pub price: f64,
    pub notional: f64,
    pub direction: Direction,
    pub significance: f64,
}

/// Derive liquidation zones from swing points in `candles`: a local high
/// implies resting short liquidity above it (a SHORT-side zone, since shorts
/// get liquidated on the way up); a local low implies resting long liquidity
/// below it. Significance is scaled by the swing's relative volume and by
/// how far price has moved away from it (closer swings matter more).
pub fn synthesize_zones(candles: &[Candle]) -> Vec<LiquidationZone> {
    if candles.len() < 5 {
        return Vec::new();
    }

    let current_price = candles.last().map(|c| c.close).unwrap_or(0.0);
    if current_price <= 0.0 {
        return Vec::new();
    }

    let avg_volume: f64 =
        candles.iter().map(|c| c.volume).sum::<f64>() / candles.len() as f64;

    let mut zones = Vec::new();
    for window in candles.windows(3) {
        let (prev, mid, next) = (&window[0], &window[1], &window[2]);

        if mid.high > prev.high && mid.high > next.high {
            let distance_pct = ((mid.high - current_price) / current_price).abs();
            let vol_ratio = if avg_volume > 0.0 {
                (mid.volume / avg_volume).min(3.0)
            } else {
                1.0
            };
            let significance = (vol_ratio / 3.0 * (1.0 - distance_pct.min(1.0))).clamp(0.0, 1.0);
            zones.push(LiquidationZone {
                price: mid.high,
                notional: mid.volume * mid.high,
                direction: Direction::Short,
                significance,
            });
        }

        if mid.low < prev.low && mid.low < next.low {
            let distance_pct = ((current_price - mid.low) / current_price).abs();
            let vol_ratio = if avg_volume > 0.0 {
                (mid.volume / avg_volume).min(3.0)
            } else {
                1.0
            };
            let significance = (vol_ratio / 3.0 * (1.0 - distance_pct.min(1.0))).clamp(0.0, 1.0);
            zones.push(LiquidationZone {
                price: mid.low,
                notional: mid.volume * mid.low,
                direction: Direction::Long,
                significance,
            });
        }
    }

    zones.sort_by(|a, b| {
        b.significance
            .partial_cmp(&a.significance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    zones.truncate(8);
    zones
}

/// Deterministic seed derived from `symbol||timeframe`, used by the scheduler
/// to drive the synthetic candle generator when the venue is unreachable.
pub fn seed_for(symbol: &str, timeframe: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    symbol.hash(&mut hasher);
    timeframe.hash(&mut hasher);
    hasher.finish()
}

/// Open-interest / funding-rate contrarian bias term folded into the
/// liquidation-zone flow summary: strongly positive funding (crowded longs)
/// biases the summary short, and vice versa.
pub fn oi_funding_bias(funding_rate: f64, oi_change_pct: f64) -> Direction {
    const FUNDING_EXTREME: f64 = 0.0003;
    const OI_SURGE_PCT: f64 = 5.0;

    if funding_rate > FUNDING_EXTREME && oi_change_pct > OI_SURGE_PCT {
        Direction::Short
    } else if funding_rate < -FUNDING_EXTREME && oi_change_pct > OI_SURGE_PCT {
        Direction::Long
    } else {
        Direction::Neutral
    }
}

/// Dominant-direction flow summary over a zone set plus the OI/funding bias,
/// used to annotate a trade plan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlowSummary {
    pub dominant: Direction,
    pub long_strength: f64,
    pub short_strength: f64,
    pub nearest_significant: Option<f64>,
}

pub fn summarize_flow(
    zones: &[LiquidationZone],
    current_price: f64,
    funding_rate: f64,
    oi_change_pct: f64,
) -> FlowSummary {
    let long_strength: f64 = zones
        .iter()
        .filter(|z| z.direction == Direction::Long)
        .map(|z| z.significance)
        .sum();
    let short_strength: f64 = zones
        .iter()
        .filter(|z| z.direction == Direction::Short)
        .map(|z| z.significance)
        .sum();

    let bias = oi_funding_bias(funding_rate, oi_change_pct);
    let (long_strength, short_strength) = match bias {
        Direction::Long => (long_strength + 0.25, short_strength),
        Direction::Short => (long_strength, short_strength + 0.25),
        Direction::Neutral => (long_strength, short_strength),
    };

    let dominant = if (long_strength - short_strength).abs() < f64::EPSILON {
        Direction::Neutral
    } else if long_strength > short_strength {
        Direction::Long
    } else {
        Direction::Short
    };

    let nearest_significant = zones
        .iter()
        .filter(|z| z.significance >= 0.5)
        .min_by(|a, b| {
            (a.price - current_price)
                .abs()
                .partial_cmp(&(b.price - current_price).abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|z| z.price);

    FlowSummary {
        dominant,
        long_strength,
        short_strength,
        nearest_significant,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(high: f64, low: f64, close: f64, volume: f64) -> Candle {
        Candle {
            open_time: 0,
            close_time: 0,
            open: close,
            high,
            low,
            close,
            volume,
            quote_volume: volume * close,
            trades_count: 1,
            taker_buy_volume: 0.0,
            taker_buy_quote_volume: 0.0,
            is_closed: true,
        }
    }

    #[test]
    fn short_series_yields_no_zones() {
        let candles = vec![candle(1.0, 0.9, 1.0, 10.0); 3];
        assert!(synthesize_zones(&candles).is_empty());
    }

    #[test]
    fn swing_high_creates_short_zone() {
        let candles = vec![
            candle(100.0, 95.0, 98.0, 10.0),
            candle(105.0, 99.0, 100.0, 10.0),
            candle(110.0, 104.0, 108.0, 30.0), // swing high
            candle(104.0, 100.0, 102.0, 10.0),
            candle(103.0, 99.0, 101.0, 10.0),
        ];
        let zones = synthesize_zones(&candles);
        assert!(zones.iter().any(|z| z.direction == Direction::Short && z.price == 110.0));
    }

    #[test]
    fn seed_for_is_deterministic() {
        assert_eq!(seed_for("BTC/USDT", "15m"), seed_for("BTC/USDT", "15m"));
        assert_ne!(seed_for("BTC/USDT", "15m"), seed_for("ETH/USDT", "15m"));
    }

    #[test]
    fn oi_funding_bias_requires_both_extremes() {
        assert_eq!(oi_funding_bias(0.0004, 6.0), Direction::Short);
        assert_eq!(oi_funding_bias(-0.0004, 6.0), Direction::Long);
        assert_eq!(oi_funding_bias(0.0004, 1.0), Direction::Neutral);
    }

    #[test]
    fn summarize_flow_with_no_zones_is_neutral() {
        let summary = summarize_flow(&[], 100.0, 0.0, 0.0);
        assert_eq!(summary.dominant, Direction::Neutral);
        assert_eq!(summary.nearest_significant, None);
    }
}
