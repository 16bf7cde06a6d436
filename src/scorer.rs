// =============================================================================
// Confluence scorer — candle series -> TradeSetup
// =============================================================================
//
// Pipeline: gather candles per timeframe -> compute indicators -> weighted
// ensemble -> gate -> build entries/targets. The weighted-sum arithmetic
// follows a `contribution = weight × confidence × direction` idiom,
// generalized from a single-timeframe ensemble into the four fixed
// per-timeframe component scores. `TradeSetup` is the richer plan-oriented
// variant (entry_plan[]/take_profits[]), not a flat single-entry-price form.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::indicators::signal::{all_signals, IndicatorSignal};
use crate::liquidation::LiquidationZone;
use crate::types::Direction;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeSetup {
    pub symbol: String,
    pub exchange: String,
    pub direction: Direction,
    pub score: f64,
    pub confidence: f64,
    pub entry_plan: Vec<f64>,
    pub stop_loss: f64,
    pub take_profits: Vec<f64>,
    pub rr: f64,
    pub reasons: Vec<String>,
    pub time_ms: i64,
    pub tf_confluence: HashMap<String, Direction>,
    pub indicator_summaries: Vec<IndicatorSignal>,
    pub liquidation_zones: Vec<LiquidationZone>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug)]
pub struct InvalidSetup(pub String);

impl std::fmt::Display for InvalidSetup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid trade setup: {}", self.0)
    }
}
impl std::error::Error for InvalidSetup {}

impl TradeSetup {
    /// Construct a `TradeSetup`, checking the LONG/SHORT geometry invariant
    /// at construction time rather than trusting callers.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: String,
        exchange: String,
        direction: Direction,
        score: f64,
        confidence: f64,
        entry_plan: Vec<f64>,
        stop_loss: f64,
        take_profits: Vec<f64>,
        reasons: Vec<String>,
        time_ms: i64,
        tf_confluence: HashMap<String, Direction>,
        indicator_summaries: Vec<IndicatorSignal>,
        liquidation_zones: Vec<LiquidationZone>,
    ) -> Result<Self, InvalidSetup> {
        if entry_plan.is_empty() {
            return Err(InvalidSetup("entry_plan must not be empty".into()));
        }
        if take_profits.is_empty() {
            return Err(InvalidSetup("take_profits must not be empty".into()));
        }
        if reasons.is_empty() {
            return Err(InvalidSetup("reasons must not be empty".into()));
        }

        let entry = entry_plan[0];
        match direction {
            Direction::Long => {
                let min_tp = take_profits.iter().cloned().fold(f64::INFINITY, f64::min);
                if !(stop_loss < entry && entry < min_tp) {
                    return Err(InvalidSetup(format!(
                        "LONG requires stop_loss < entry < min(take_profits), got {stop_loss} < {entry} < {min_tp}"
                    )));
                }
            }
            Direction::Short => {
                let max_tp = take_profits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                if !(stop_loss > entry && entry > max_tp) {
                    return Err(InvalidSetup(format!(
                        "SHORT requires stop_loss > entry > max(take_profits), got {stop_loss} > {entry} > {max_tp}"
                    )));
                }
            }
            Direction::Neutral => {
                return Err(InvalidSetup("direction must be LONG or SHORT".into()));
            }
        }

        let rr = reward_to_risk(entry, stop_loss, take_profits[0]);
        if rr <= 0.0 {
            return Err(InvalidSetup(format!("rr must be > 0, got {rr}")));
        }

        Ok(Self {
            symbol,
            exchange,
            direction,
            score,
            confidence,
            entry_plan,
            stop_loss,
            take_profits,
            rr,
            reasons,
            time_ms,
            tf_confluence,
            indicator_summaries,
            liquidation_zones,
            metadata: HashMap::new(),
        })
    }
}

/// Reward-to-risk at the first take-profit. Negative/zero risk or reward is
/// not a valid geometry and yields 0.
pub fn reward_to_risk(entry: f64, stop: f64, tp1: f64) -> f64 {
    let risk = (entry - stop).abs();
    let reward = (tp1 - entry).abs();
    if risk <= 0.0 {
        0.0
    } else {
        reward / risk
    }
}

fn dominant_direction(signals: &[&IndicatorSignal]) -> Direction {
    let mut long_strength = 0.0;
    let mut short_strength = 0.0;
    for s in signals {
        match s.direction {
            Direction::Long => long_strength += s.strength,
            Direction::Short => short_strength += s.strength,
            Direction::Neutral => {}
        }
    }
    if (long_strength - short_strength).abs() < f64::EPSILON {
        Direction::Neutral
    } else if long_strength > short_strength {
        Direction::Long
    } else {
        Direction::Short
    }
}

/// Score a symbol from its per-timeframe candle series (closes only, each
/// already trimmed and ordered oldest-first). Returns
/// `None` when no timeframe has enough data or the overall direction is
/// NEUTRAL.
pub fn score_symbol(
    symbol: &str,
    exchange: &str,
    series_by_tf: &HashMap<String, Vec<f64>>,
    current_price: f64,
    liquidation_zones: Vec<LiquidationZone>,
    time_ms: i64,
) -> Option<TradeSetup> {
    let mut all: Vec<IndicatorSignal> = Vec::new();
    let mut tf_confluence: HashMap<String, Direction> = HashMap::new();

    for (tf, closes) in series_by_tf {
        if closes.len() < 50 {
            continue;
        }
        let signals = all_signals(closes, tf);
        if signals.is_empty() {
            continue;
        }
        let refs: Vec<&IndicatorSignal> = signals.iter().collect();
        let dom = dominant_direction(&refs);
        if dom != Direction::Neutral {
            tf_confluence.insert(tf.clone(), dom);
        }
        all.extend(signals);
    }

    if all.is_empty() {
        return None;
    }

    let refs: Vec<&IndicatorSignal> = all.iter().collect();
    let overall = dominant_direction(&refs);
    if overall == Direction::Neutral {
        return None;
    }

    // --- Component scores ----------------------------------------------
    let aligned: Vec<&IndicatorSignal> = all.iter().filter(|s| s.direction == overall).collect();
    let total_strength: f64 = all.iter().map(|s| s.strength).sum();
    let aligned_strength: f64 = aligned.iter().map(|s| s.strength).sum();
    let aligned_strength_ratio = if total_strength > 0.0 {
        aligned_strength / total_strength
    } else {
        0.0
    };
    let aligned_count_ratio = aligned.len() as f64 / all.len() as f64;
    let indicator_score = (0.7 * aligned_strength_ratio + 0.3 * aligned_count_ratio) * 100.0;

    let aligned_tfs = tf_confluence.values().filter(|d| **d == overall).count();
    let confluence_score = if tf_confluence.is_empty() {
        0.0
    } else {
        (aligned_tfs as f64 / tf_confluence.len() as f64) * 100.0
    };

    let supporting: Vec<&LiquidationZone> = liquidation_zones
        .iter()
        .filter(|z| z.direction == overall)
        .collect();
    let liquidation_score = if liquidation_zones.is_empty() {
        50.0
    } else if supporting.is_empty() {
        30.0
    } else {
        let avg_sig: f64 =
            supporting.iter().map(|z| z.significance).sum::<f64>() / supporting.len() as f64;
        (0.7 * avg_sig + 0.3 * (supporting.len() as f64 / 3.0).min(1.0)) * 100.0
    };

    let trend_score = (total_strength / all.len() as f64) * 100.0;

    let score = 0.35 * indicator_score + 0.30 * confluence_score + 0.20 * liquidation_score
        + 0.15 * trend_score;

    let confidence = (score / 100.0
        + (all.len() as f64 / 20.0).min(0.2)
        + (aligned_tfs as f64 / 10.0).min(0.2))
    .clamp(0.0, 1.0);

    // --- Baseline geometry -----------------------------------------------
    let (entry_plan, stop_loss, take_profits) = match overall {
        Direction::Long => (
            vec![current_price],
            current_price * 0.98,
            vec![current_price * 1.02, current_price * 1.04],
        ),
        Direction::Short => (
            vec![current_price],
            current_price * 1.02,
            vec![current_price * 0.98, current_price * 0.96],
        ),
        Direction::Neutral => unreachable!("overall direction filtered above"),
    };

    let mut reasons = Vec::new();
    let mut strongest: Vec<&IndicatorSignal> = aligned.clone();
    strongest.sort_by(|a, b| b.strength.partial_cmp(&a.strength).unwrap_or(std::cmp::Ordering::Equal));
    for s in strongest.iter().take(2) {
        reasons.push(format!("{} aligned {} on {} (strength {:.2})", s.name, overall, s.timeframe, s.strength));
    }
    if aligned_tfs > 0 {
        reasons.push(format!("{aligned_tfs}/{} timeframes confluent {overall}", tf_confluence.len()));
    }
    if let Some(best) = supporting.iter().max_by(|a, b| {
        a.significance.partial_cmp(&b.significance).unwrap_or(std::cmp::Ordering::Equal)
    }) {
        reasons.push(format!("liquidation support at {:.4} (significance {:.2})", best.price, best.significance));
    }
    let band = if score >= 80.0 {
        "excellent"
    } else if score >= 60.0 {
        "good"
    } else if score >= 40.0 {
        "fair"
    } else {
        "weak"
    };
    reasons.push(format!("composite score {score:.1} ({band})"));

    TradeSetup::new(
        symbol.to_string(),
        exchange.to_string(),
        overall,
        score,
        confidence,
        entry_plan,
        stop_loss,
        take_profits,
        reasons,
        time_ms,
        tf_confluence,
        all,
        liquidation_zones,
    )
    .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trending_closes(n: usize, up: bool) -> Vec<f64> {
        (1..=n)
            .map(|i| {
                let step = i as f64 * 0.05;
                if up { 100.0 + step } else { 200.0 - step }
            })
            .collect()
    }

    #[test]
    fn long_setup_has_valid_geometry() {
        let mut series = HashMap::new();
        series.insert("15m".to_string(), trending_closes(250, true));
        let price = *series["15m"].last().unwrap();
        let setup = score_symbol("BTC/USDT", "binance", &series, price, vec![], 0).unwrap();
        assert_eq!(setup.direction, Direction::Long);
        assert!(setup.stop_loss < setup.entry_plan[0]);
        assert!(setup.entry_plan[0] < setup.take_profits.iter().cloned().fold(f64::INFINITY, f64::min));
        assert!(setup.rr > 0.0);
        assert!(!setup.reasons.is_empty());
    }

    #[test]
    fn short_series_yields_no_setup() {
        let mut series = HashMap::new();
        series.insert("15m".to_string(), vec![100.0; 10]);
        assert!(score_symbol("BTC/USDT", "binance", &series, 100.0, vec![], 0).is_none());
    }

    #[test]
    fn flat_series_is_neutral_and_rejected() {
        let mut series = HashMap::new();
        series.insert("15m".to_string(), vec![100.0; 250]);
        assert!(score_symbol("BTC/USDT", "binance", &series, 100.0, vec![], 0).is_none());
    }

    #[test]
    fn reward_to_risk_zero_on_zero_risk() {
        assert_eq!(reward_to_risk(100.0, 100.0, 105.0), 0.0);
    }

    #[test]
    fn invalid_setup_rejected_at_construction() {
        let err = TradeSetup::new(
            "BTC/USDT".into(),
            "binance".into(),
            Direction::Long,
            70.0,
            0.5,
            vec![100.0],
            101.0, // stop above entry -- invalid for LONG
            vec![105.0],
            vec!["test".into()],
            0,
            HashMap::new(),
            vec![],
            vec![],
        );
        assert!(err.is_err());
    }
}
