// =============================================================================
// Quality gates — hard AND-chain + soft weighted score
// =============================================================================
//
// Ordered checks, first-failure-wins, each returning an `Option<String>`
// reason. The regime-aware ATR sweet-spot table keys off a regime-tuple
// table collapsed to three bands (TRENDING/RANGING/VOLATILE).

use serde::{Deserialize, Serialize};

use crate::market_data::Candle;
use crate::regime::detector::{classify_candles, MarketRegime};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfluenceWeights {
    pub tf_align: f64,
    pub ob_quality: f64,
    pub fvg_presence: f64,
    pub bos_choch: f64,
    pub freshness: f64,
    pub rr_strength: f64,
    pub atr_sweetspot: f64,
    pub regime_bias: f64,
}

impl Default for ConfluenceWeights {
    fn default() -> Self {
        Self {
            tf_align: 25.0,
            ob_quality: 15.0,
            fvg_presence: 10.0,
            bos_choch: 15.0,
            freshness: 10.0,
            rr_strength: 10.0,
            atr_sweetspot: 10.0,
            regime_bias: 5.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityGateConfig {
    pub min_rr: f64,
    pub entry_distance_pct_lo: f64,
    pub entry_distance_pct_hi: f64,
    pub freshness_half_life_min: f64,
    pub max_age_min: f64,
    pub min_volume_usd: f64,
    pub max_spread_bps: f64,
    pub min_confluence_flags: u32,
    pub min_score: f64,
    pub max_setups: usize,
    pub confluence_weights: ConfluenceWeights,
}

impl Default for QualityGateConfig {
    fn default() -> Self {
        Self {
            min_rr: 2.0,
            entry_distance_pct_lo: 0.5,
            entry_distance_pct_hi: 5.0,
            freshness_half_life_min: 30.0,
            max_age_min: 90.0,
            min_volume_usd: 100_000.0,
            max_spread_bps: 20.0,
            min_confluence_flags: 3,
            min_score: 60.0,
            max_setups: 5,
            confluence_weights: ConfluenceWeights::default(),
        }
    }
}

/// A scan candidate with the structural context the gates need, before
/// scoring is applied.
#[derive(Debug, Clone)]
pub struct GateCandidate {
    pub symbol: String,
    pub direction_is_long: bool,
    pub price: f64,
    pub entry_near: f64,
    pub entry_stop: f64,
    pub entry_tp1: f64,
    pub age_min: f64,
    pub volume_usd_24h: f64,
    pub spread_bps: f64,
    pub has_ob: bool,
    pub has_fvg: bool,
    pub bos_in_favor: bool,
    pub htf_trend_agrees: bool,
    pub ob_quality: f64,
    pub atr_pct: f64,
    pub venue: String,
    pub listed_on_venue: bool,
    pub candles: Vec<Candle>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateDecision {
    pub symbol: String,
    pub rr: f64,
    pub entry_distance_pct: f64,
    pub spread_bps: f64,
    pub confluence_flags: u32,
    pub score: f64,
    pub reasons: Vec<String>,
}

fn rr_for(direction_is_long: bool, entry: f64, stop: f64, tp1: f64) -> f64 {
    let risk = if direction_is_long { entry - stop } else { stop - entry };
    let reward = if direction_is_long { tp1 - entry } else { entry - tp1 };
    if risk <= 0.0 || reward <= 0.0 {
        0.0
    } else {
        reward / risk
    }
}

fn entry_distance_pct(price: f64, entry_near: f64) -> f64 {
    if price <= 0.0 {
        f64::INFINITY
    } else {
        ((entry_near - price).abs() / price) * 100.0
    }
}

/// Hard AND-chain. Returns `Some(reason)` on the first failing gate, `None`
/// if the candidate clears every hard check.
fn check_hard_gates(c: &GateCandidate, cfg: &QualityGateConfig, rr: f64) -> Option<String> {
    if rr < cfg.min_rr {
        return Some(format!("rr {rr:.2} below min_rr {:.2}", cfg.min_rr));
    }

    let dist = entry_distance_pct(c.price, c.entry_near);
    if !(cfg.entry_distance_pct_lo..=cfg.entry_distance_pct_hi).contains(&dist) {
        return Some(format!(
            "entry_distance_pct {dist:.2} outside [{:.2},{:.2}]",
            cfg.entry_distance_pct_lo, cfg.entry_distance_pct_hi
        ));
    }

    if c.age_min > cfg.max_age_min {
        return Some(format!("age {:.1}m exceeds max_age_min {:.1}m", c.age_min, cfg.max_age_min));
    }

    if c.volume_usd_24h < cfg.min_volume_usd {
        return Some(format!(
            "volume_usd_24h {:.0} below min_volume_usd {:.0}",
            c.volume_usd_24h, cfg.min_volume_usd
        ));
    }

    if c.spread_bps > cfg.max_spread_bps {
        return Some(format!(
            "spread_bps {:.1} exceeds max_spread_bps {:.1}",
            c.spread_bps, cfg.max_spread_bps
        ));
    }

    let flags = [c.has_ob, c.has_fvg, c.bos_in_favor, c.htf_trend_agrees]
        .iter()
        .filter(|f| **f)
        .count() as u32;
    if flags < cfg.min_confluence_flags {
        return Some(format!(
            "confluence flags {flags} below min_confluence_flags {}",
            cfg.min_confluence_flags
        ));
    }

    if c.venue == "phemex" && !c.listed_on_venue {
        return Some("not listed on phemex".to_string());
    }

    None
}

/// Triangular weight around a regime-specific ATR sweet-spot band. At the
/// band edges the weight is 0; it rises linearly to 1 at the band centre and
/// falls off linearly over one further band-width outside the band.
fn atr_sweetspot_weight(atr_pct: f64, regime: MarketRegime) -> f64 {
    let (lo, hi) = match regime {
        MarketRegime::Trending => (1.0, 3.0),
        MarketRegime::Ranging => (0.5, 1.5),
        MarketRegime::Volatile => (2.0, 5.0),
        MarketRegime::Squeeze | MarketRegime::Dead => (0.5, 1.5),
    };
    let width = hi - lo;
    if width <= 0.0 {
        return 0.0;
    }
    let mid = (lo + hi) / 2.0;
    if atr_pct >= lo && atr_pct <= hi {
        let half = width / 2.0;
        1.0 - (atr_pct - mid).abs() / half * 0.3
    } else {
        let dist = if atr_pct < lo { lo - atr_pct } else { atr_pct - hi };
        (1.0 - dist / width).max(0.0)
    }
}

fn regime_bias_weight(regime: MarketRegime) -> f64 {
    match regime {
        MarketRegime::Trending => 1.0,
        MarketRegime::Volatile => 0.8,
        MarketRegime::Ranging => 0.6,
        MarketRegime::Squeeze | MarketRegime::Dead => 0.6,
    }
}

fn soft_score(c: &GateCandidate, cfg: &QualityGateConfig, rr: f64) -> f64 {
    let w = &cfg.confluence_weights;
    let regime = classify_candles(&c.candles).map(|(r, _)| r).unwrap_or(MarketRegime::Ranging);

    let f_tf_align = if c.htf_trend_agrees { 1.0 } else { 0.0 };
    let f_ob_quality = c.ob_quality.clamp(0.0, 1.0);
    let f_fvg = if c.has_fvg { 1.0 } else { 0.0 };
    let f_bos = if c.bos_in_favor { 1.0 } else { 0.0 };
    let f_fresh = 0.5f64.powf(c.age_min / cfg.freshness_half_life_min);
    let f_rr = (rr / 3.0).min(1.0);
    let f_atr = atr_sweetspot_weight(c.atr_pct, regime);
    let f_regime = regime_bias_weight(regime);

    w.tf_align * f_tf_align
        + w.ob_quality * f_ob_quality
        + w.fvg_presence * f_fvg
        + w.bos_choch * f_bos
        + w.freshness * f_fresh
        + w.rr_strength * f_rr
        + w.atr_sweetspot * f_atr
        + w.regime_bias * f_regime
}

/// Evaluate a batch of candidates against the hard gates and soft score,
/// returning `(accepted, rejected)` where `accepted` is sorted by score
/// descending with a stable tie-break on input order, truncated to
/// `max_setups`. `rejected` pairs each dropped candidate's symbol with its
/// failing hard-gate reason (or "score below min_score").
pub fn evaluate(
    candidates: &[GateCandidate],
    cfg: &QualityGateConfig,
) -> (Vec<GateDecision>, Vec<(String, String)>) {
    let mut accepted = Vec::new();
    let mut rejected = Vec::new();

    for c in candidates {
        let rr = rr_for(c.direction_is_long, c.entry_near, c.entry_stop, c.entry_tp1);

        if let Some(reason) = check_hard_gates(c, cfg, rr) {
            rejected.push((c.symbol.clone(), reason));
            continue;
        }

        let score = soft_score(c, cfg, rr);
        if score < cfg.min_score {
            rejected.push((c.symbol.clone(), format!("score {score:.1} below min_score {:.1}", cfg.min_score)));
            continue;
        }

        let mut reasons = vec![
            format!("rr {:.2} >= min_rr {:.2}", rr, cfg.min_rr),
            format!("score {:.1}", score),
        ];
        if c.htf_trend_agrees {
            reasons.push("HTF trend agrees".to_string());
        }
        if c.bos_in_favor {
            reasons.push("BOS in favor".to_string());
        }
        reasons.truncate(5);

        accepted.push(GateDecision {
            symbol: c.symbol.clone(),
            rr,
            entry_distance_pct: entry_distance_pct(c.price, c.entry_near),
            spread_bps: c.spread_bps,
            confluence_flags: [c.has_ob, c.has_fvg, c.bos_in_favor, c.htf_trend_agrees]
                .iter()
                .filter(|f| **f)
                .count() as u32,
            score,
            reasons,
        });
    }

    accepted.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    accepted.truncate(cfg.max_setups);

    (accepted, rejected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_candidate(symbol: &str) -> GateCandidate {
        GateCandidate {
            symbol: symbol.to_string(),
            direction_is_long: true,
            price: 100.0,
            entry_near: 101.0,
            entry_stop: 95.0,
            entry_tp1: 107.0,
            age_min: 5.0,
            volume_usd_24h: 500_000.0,
            spread_bps: 5.0,
            has_ob: true,
            has_fvg: true,
            bos_in_favor: true,
            htf_trend_agrees: true,
            ob_quality: 0.8,
            atr_pct: 2.0,
            venue: "binance".to_string(),
            listed_on_venue: true,
            candles: vec![],
        }
    }

    #[test]
    fn rr_floor_rejects_below_threshold() {
        let mut c = base_candidate("BTC/USDT");
        c.entry_tp1 = 104.0; // rr = (104-101)/(101-95) = 0.5
        let (accepted, rejected) = evaluate(&[c], &QualityGateConfig::default());
        assert!(accepted.is_empty());
        assert_eq!(rejected.len(), 1);
        assert!(rejected[0].1.contains("rr"));
    }

    #[test]
    fn entry_distance_gate() {
        let mut c = base_candidate("BTC/USDT");
        c.entry_near = 100.2; // 0.2% -- below lo of 0.5%
        let (accepted, rejected) = evaluate(&[c], &QualityGateConfig::default());
        assert!(accepted.is_empty());
        assert!(rejected[0].1.contains("entry_distance_pct"));
    }

    #[test]
    fn accepted_candidates_sorted_by_score_desc() {
        let mut weak = base_candidate("ETH/USDT");
        weak.ob_quality = 0.1;
        weak.has_fvg = false;
        let strong = base_candidate("BTC/USDT");
        let (accepted, _) = evaluate(&[weak, strong], &QualityGateConfig::default());
        assert!(accepted.len() <= 2);
        for pair in accepted.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn max_setups_truncates() {
        let mut cfg = QualityGateConfig::default();
        cfg.max_setups = 1;
        let candidates = vec![base_candidate("A/USDT"), base_candidate("B/USDT")];
        let (accepted, _) = evaluate(&candidates, &cfg);
        assert_eq!(accepted.len(), 1);
    }

    #[test]
    fn evaluate_is_deterministic() {
        let candidates = vec![base_candidate("A/USDT"), base_candidate("B/USDT")];
        let cfg = QualityGateConfig::default();
        let (a1, _) = evaluate(&candidates, &cfg);
        let (a2, _) = evaluate(&candidates, &cfg);
        assert_eq!(a1.len(), a2.len());
        for (x, y) in a1.iter().zip(a2.iter()) {
            assert_eq!(x.symbol, y.symbol);
            assert_eq!(x.score, y.score);
        }
    }
}
