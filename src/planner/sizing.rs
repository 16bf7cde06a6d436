// =============================================================================
// Leverage-aware position sizing + liquidation safety
// =============================================================================
//
// Derives an isolated-margin liquidation price `liq = entry × (1 ∓ 1/L ± mmr)`
// from a long/short branch structure, then sizes quantity from a risk-in-quote
// budget under lot-size/min-notional/maintenance-margin constraints.

use serde::{Deserialize, Serialize};

use crate::types::Direction;

#[derive(Debug, Clone, Copy)]
pub struct SizingConfig {
    pub lot_size: f64,
    pub min_notional: f64,
    pub maintenance_margin_ratio: f64,
    /// Required liquidation buffer beyond the stop, as a percent of the stop
    /// price.
    pub liq_buffer_pct: f64,
    /// Required liquidation buffer beyond the stop, as a multiple of ATR.
    pub liq_buffer_atr_mult: f64,
    /// If the initial sizing is unsafe, solve for the largest leverage that
    /// clears the buffer and re-size at that leverage.
    pub reduce_on_unsafe: bool,
    /// If still unsafe after a reduce attempt, return qty = 0 with a reason
    /// instead of placing an unsafe position.
    pub skip_on_unsafe: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SizingResult {
    pub qty: f64,
    pub notional: f64,
    pub liq_price: f64,
    pub effective_leverage: f64,
}

fn round_down_to_lot(qty: f64, lot: f64) -> f64 {
    if lot <= 0.0 {
        qty.max(0.0)
    } else {
        (qty / lot).floor() * lot
    }
}

/// Isolated-margin liquidation price estimate.
pub fn liquidation_price(entry: f64, leverage: f64, mmr: f64, direction: Direction) -> f64 {
    if leverage <= 0.0 {
        return entry;
    }
    match direction {
        Direction::Long => entry * (1.0 - 1.0 / leverage + mmr),
        Direction::Short => entry * (1.0 + 1.0 / leverage - mmr),
        Direction::Neutral => entry,
    }
}

fn required_gap(stop: f64, atr: f64, cfg: &SizingConfig) -> f64 {
    (stop * cfg.liq_buffer_pct / 100.0).max(atr * cfg.liq_buffer_atr_mult)
}

/// Whether `liq` clears `stop` by at least the configured buffer, on the
/// correct side for `direction`.
pub fn liq_gap_ok(liq: f64, stop: f64, atr: f64, direction: Direction, cfg: &SizingConfig) -> bool {
    let gap = required_gap(stop, atr, cfg);
    match direction {
        Direction::Long => liq <= stop - gap,
        Direction::Short => liq >= stop + gap,
        Direction::Neutral => false,
    }
}

/// Solve for the largest leverage at which the liquidation buffer still
/// clears the stop, given the buffer does not itself depend on leverage.
fn solve_max_leverage(entry: f64, stop: f64, atr: f64, direction: Direction, cfg: &SizingConfig) -> Option<f64> {
    let gap = required_gap(stop, atr, cfg);
    let mmr = cfg.maintenance_margin_ratio;
    if entry <= 0.0 {
        return None;
    }
    let denom = match direction {
        Direction::Long => 1.0 + mmr - (stop - gap) / entry,
        Direction::Short => (stop + gap) / entry - 1.0 + mmr,
        Direction::Neutral => return None,
    };
    if denom <= 0.0 {
        None
    } else {
        Some(1.0 / denom)
    }
}

#[derive(Debug, Clone)]
pub struct SizingOutcome {
    pub sizing: SizingResult,
    pub safe: bool,
    pub reason: String,
}

/// Size a position from a risk-in-quote budget under lot-size/min-notional
/// constraints, then assess and (if configured) repair liquidation safety.
#[allow(clippy::too_many_arguments)]
pub fn size_position(
    direction: Direction,
    entry: f64,
    stop: f64,
    risk_usd: f64,
    leverage: f64,
    atr: f64,
    cfg: &SizingConfig,
) -> SizingOutcome {
    let risk_per_unit = (entry - stop).abs();
    if risk_per_unit <= 0.0 {
        return SizingOutcome {
            sizing: SizingResult { qty: 0.0, notional: 0.0, liq_price: entry, effective_leverage: leverage },
            safe: false,
            reason: "entry and stop coincide; zero risk distance".to_string(),
        };
    }

    let mut qty = round_down_to_lot(risk_usd / risk_per_unit, cfg.lot_size);

    if cfg.min_notional > 0.0 && qty * entry < cfg.min_notional {
        if cfg.lot_size > 0.0 {
            qty = (cfg.min_notional / entry / cfg.lot_size).ceil() * cfg.lot_size;
        } else {
            qty = cfg.min_notional / entry;
        }
    }

    if qty <= 0.0 {
        return SizingOutcome {
            sizing: SizingResult { qty: 0.0, notional: 0.0, liq_price: entry, effective_leverage: leverage },
            safe: false,
            reason: "sized quantity rounds to zero".to_string(),
        };
    }

    let mut lev = leverage;
    let mut liq = liquidation_price(entry, lev, cfg.maintenance_margin_ratio, direction);
    let mut safe = liq_gap_ok(liq, stop, atr, direction, cfg);

    if !safe && cfg.reduce_on_unsafe {
        if let Some(max_lev) = solve_max_leverage(entry, stop, atr, direction, cfg) {
            if max_lev > 0.0 && max_lev < lev {
                let scale = max_lev / lev;
                let reduced = round_down_to_lot(qty * scale, cfg.lot_size);
                if reduced > 0.0 {
                    qty = reduced;
                    lev = max_lev;
                    liq = liquidation_price(entry, lev, cfg.maintenance_margin_ratio, direction);
                    safe = liq_gap_ok(liq, stop, atr, direction, cfg);
                }
            }
        }
    }

    if !safe && cfg.skip_on_unsafe {
        return SizingOutcome {
            sizing: SizingResult { qty: 0.0, notional: 0.0, liq_price: liq, effective_leverage: lev },
            safe: false,
            reason: "liquidation buffer still violated after reduce; skipped".to_string(),
        };
    }

    SizingOutcome {
        sizing: SizingResult { qty, notional: qty * entry, liq_price: liq, effective_leverage: lev },
        safe,
        reason: if safe {
            "liquidation buffer clears the stop".to_string()
        } else {
            "liquidation buffer violated; reduce-on-unsafe disabled or insufficient".to_string()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> SizingConfig {
        SizingConfig {
            lot_size: 0.001,
            min_notional: 10.0,
            maintenance_margin_ratio: 0.005,
            liq_buffer_pct: 5.0,
            liq_buffer_atr_mult: 1.0,
            reduce_on_unsafe: true,
            skip_on_unsafe: true,
        }
    }

    #[test]
    fn qty_is_lot_multiple() {
        let out = size_position(Direction::Long, 100.0, 95.0, 1000.0, 3.0, 1.0, &cfg());
        let ratio = out.sizing.qty / cfg().lot_size;
        assert!((ratio - ratio.round()).abs() < 1e-6);
    }

    #[test]
    fn bumps_to_min_notional() {
        let tiny_risk = size_position(Direction::Long, 100.0, 99.9, 0.5, 3.0, 1.0, &cfg());
        assert!(tiny_risk.sizing.notional >= cfg().min_notional - 1e-9 || tiny_risk.sizing.qty == 0.0);
    }

    #[test]
    fn low_leverage_long_is_safe() {
        let out = size_position(Direction::Long, 100.0, 98.5, 1000.0, 2.0, 1.0, &cfg());
        assert!(out.safe);
    }

    #[test]
    fn high_leverage_reduces_when_unsafe() {
        let unsafe_cfg = cfg();
        let out = size_position(Direction::Long, 100.0, 98.5, 1000.0, 50.0, 1.0, &unsafe_cfg);
        // Either reduced to a safe leverage, or skipped with qty 0.
        assert!(out.safe || out.sizing.qty == 0.0);
    }

    #[test]
    fn liquidation_gap_exactly_at_buffer_is_safe() {
        let c = SizingConfig {
            lot_size: 0.0,
            min_notional: 0.0,
            maintenance_margin_ratio: 0.0,
            liq_buffer_pct: 5.0,
            liq_buffer_atr_mult: 0.0,
            reduce_on_unsafe: false,
            skip_on_unsafe: false,
        };
        let stop = 95.0;
        let gap = stop * 0.05;
        let liq = stop - gap;
        assert!(liq_gap_ok(liq, stop, 0.0, Direction::Long, &c));
    }
}
