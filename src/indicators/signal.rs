// =============================================================================
// IndicatorSignal — uniform wrapper over the indicator engine
// =============================================================================
//
// Each raw indicator (`rsi`, `macd`, `ema`, `bollinger`) is pure and returns
// its own native shape; this module adapts each of those into the single
// `IndicatorSignal{name, direction, strength, value, timeframe, extras}` the
// confluence scorer consumes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::Direction;

use super::bollinger::calculate_bollinger;
use super::ema::calculate_ema;
use super::macd::calculate_macd;
use super::rsi::calculate_rsi;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorSignal {
    pub name: String,
    pub direction: Direction,
    pub strength: f64,
    pub value: f64,
    pub timeframe: String,
    pub extras: HashMap<String, f64>,
}

fn clip01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

/// RSI(14): LONG if rsi<30, SHORT if rsi>70, else NEUTRAL. Strength is the
/// linearly scaled distance from the 30/70 threshold, clipped to [0,1].
pub fn rsi_signal(closes: &[f64], timeframe: &str) -> Option<IndicatorSignal> {
    if closes.len() < 50 {
        return None;
    }
    let series = calculate_rsi(closes, 14);
    let rsi = *series.last()?;

    let (direction, strength) = if rsi < 30.0 {
        (Direction::Long, clip01((30.0 - rsi) / 30.0))
    } else if rsi > 70.0 {
        (Direction::Short, clip01((rsi - 70.0) / 30.0))
    } else {
        (Direction::Neutral, 0.0)
    };

    let mut extras = HashMap::new();
    extras.insert("rsi".to_string(), rsi);

    Some(IndicatorSignal {
        name: "RSI".to_string(),
        direction,
        strength,
        value: rsi,
        timeframe: timeframe.to_string(),
        extras,
    })
}

/// MACD(12,26,9): direction is the sign of the MACD-signal histogram;
/// strength is `|hist|/|macd|` clipped to [0,1] (0.5 when macd == 0).
pub fn macd_signal(closes: &[f64], timeframe: &str) -> Option<IndicatorSignal> {
    if closes.len() < 50 {
        return None;
    }
    let result = calculate_macd(closes)?;

    let direction = if result.histogram > 0.0 {
        Direction::Long
    } else if result.histogram < 0.0 {
        Direction::Short
    } else {
        Direction::Neutral
    };

    let strength = if result.macd == 0.0 {
        0.5
    } else {
        clip01((result.histogram / result.macd).abs())
    };

    let mut extras = HashMap::new();
    extras.insert("macd".to_string(), result.macd);
    extras.insert("signal".to_string(), result.signal);
    extras.insert("histogram".to_string(), result.histogram);

    Some(IndicatorSignal {
        name: "MACD".to_string(),
        direction,
        strength,
        value: result.histogram,
        timeframe: timeframe.to_string(),
        extras,
    })
}

/// EMA stack (20, 50, 200): LONG if price above all three, SHORT if below
/// all three, else NEUTRAL. Strength is the distance from the extremum EMA
/// (the one furthest from price), scaled x10 and clipped to [0,1].
pub fn ema_stack_signal(closes: &[f64], timeframe: &str) -> Option<IndicatorSignal> {
    if closes.len() < 200 {
        return None;
    }
    let price = *closes.last()?;
    let ema20 = *calculate_ema(closes, 20).last()?;
    let ema50 = *calculate_ema(closes, 50).last()?;
    let ema200 = *calculate_ema(closes, 200).last()?;

    let above_all = price > ema20 && price > ema50 && price > ema200;
    let below_all = price < ema20 && price < ema50 && price < ema200;

    let direction = if above_all {
        Direction::Long
    } else if below_all {
        Direction::Short
    } else {
        Direction::Neutral
    };

    let extremum = match direction {
        Direction::Long => ema20.max(ema50).max(ema200),
        Direction::Short => ema20.min(ema50).min(ema200),
        Direction::Neutral => price,
    };

    let strength = if direction == Direction::Neutral || extremum == 0.0 {
        0.0
    } else {
        clip01(((price - extremum) / extremum).abs() * 10.0)
    };

    let mut extras = HashMap::new();
    extras.insert("ema20".to_string(), ema20);
    extras.insert("ema50".to_string(), ema50);
    extras.insert("ema200".to_string(), ema200);

    Some(IndicatorSignal {
        name: "EMA_STACK".to_string(),
        direction,
        strength,
        value: price,
        timeframe: timeframe.to_string(),
        extras,
    })
}

/// Bollinger(20, 2σ): LONG if price < lower band, SHORT if price > upper
/// band, else NEUTRAL. Strength is the overshoot beyond the band divided by
/// bandwidth, scaled x2 and clipped to [0,1].
pub fn bollinger_signal(closes: &[f64], timeframe: &str) -> Option<IndicatorSignal> {
    if closes.len() < 50 {
        return None;
    }
    let bb = calculate_bollinger(closes, 20, 2.0)?;
    let price = *closes.last()?;
    let band_range = bb.upper - bb.lower;

    let (direction, overshoot) = if price < bb.lower {
        (Direction::Long, bb.lower - price)
    } else if price > bb.upper {
        (Direction::Short, price - bb.upper)
    } else {
        (Direction::Neutral, 0.0)
    };

    let strength = if direction == Direction::Neutral || band_range <= 0.0 {
        0.0
    } else {
        clip01((overshoot / band_range) * 2.0)
    };

    let mut extras = HashMap::new();
    extras.insert("upper".to_string(), bb.upper);
    extras.insert("middle".to_string(), bb.middle);
    extras.insert("lower".to_string(), bb.lower);
    extras.insert("width".to_string(), bb.width);

    Some(IndicatorSignal {
        name: "BOLLINGER".to_string(),
        direction,
        strength,
        value: price,
        timeframe: timeframe.to_string(),
        extras,
    })
}

/// Run all four indicators for one timeframe's close series, dropping any
/// that could not be computed. A series shorter than 50 candles yields no
/// signals at all.
pub fn all_signals(closes: &[f64], timeframe: &str) -> Vec<IndicatorSignal> {
    if closes.len() < 50 {
        return Vec::new();
    }
    [
        rsi_signal(closes, timeframe),
        macd_signal(closes, timeframe),
        ema_stack_signal(closes, timeframe),
        bollinger_signal(closes, timeframe),
    ]
    .into_iter()
    .flatten()
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ascending(n: usize) -> Vec<f64> {
        (1..=n).map(|i| 100.0 + i as f64 * 0.1).collect()
    }

    #[test]
    fn short_series_yields_no_signals() {
        assert!(all_signals(&ascending(10), "15m").is_empty());
    }

    #[test]
    fn rsi_signal_needs_50_candles() {
        assert!(rsi_signal(&ascending(40), "15m").is_none());
        assert!(rsi_signal(&ascending(60), "15m").is_some());
    }

    #[test]
    fn ema_stack_needs_200_candles() {
        assert!(ema_stack_signal(&ascending(150), "1h").is_none());
        let signal = ema_stack_signal(&ascending(250), "1h").unwrap();
        assert_eq!(signal.direction, Direction::Long);
        assert!(signal.strength >= 0.0 && signal.strength <= 1.0);
    }

    #[test]
    fn bollinger_flat_series_is_neutral() {
        let flat = vec![100.0; 60];
        let signal = bollinger_signal(&flat, "15m").unwrap();
        assert_eq!(signal.direction, Direction::Neutral);
        assert_eq!(signal.strength, 0.0);
    }

    #[test]
    fn macd_ascending_is_long() {
        let signal = macd_signal(&ascending(100), "1h").unwrap();
        assert_eq!(signal.direction, Direction::Long);
    }

    #[test]
    fn all_signals_returns_up_to_four() {
        let signals = all_signals(&ascending(250), "1h");
        assert!(signals.len() <= 4);
        assert!(!signals.is_empty());
    }
}
