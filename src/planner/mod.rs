// =============================================================================
// Trade-plan builder
// =============================================================================
//
// Assembles a `TradeSetup` (scorer.rs) plus structural anchors, sizing, and
// execution hints into a `TradePlan`. A pure builder with no I/O — the
// caller supplies market context, the executor does the I/O.

pub mod entries;
pub mod execution;
pub mod sizing;

use serde::{Deserialize, Serialize};

use crate::indicators::atr::calculate_atr;
use crate::liquidation::{self, FlowSummary, LiquidationZone};
use crate::market_data::Candle;
use crate::scorer::TradeSetup;
use crate::types::Direction;

use entries::{build_entries, Entries, InvalidEntry, OrderFlowContext, Session, StructureAnchors};
use execution::{decide_execution, ExecutionBundle};
use sizing::{size_position, SizingConfig, SizingOutcome};

#[derive(Debug, Clone, Copy)]
pub struct MarketContext {
    pub tick_size: f64,
    pub lot_size: f64,
    pub min_notional: f64,
    pub maintenance_margin_ratio: f64,
    pub spread_bps: f64,
    pub order_book_imbalance: f64,
    pub funding_rate: f64,
    pub oi_change_pct: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct RiskContext {
    pub risk_usd: f64,
    pub leverage: f64,
    pub liq_buffer_pct: f64,
    pub liq_buffer_atr_mult: f64,
    pub reduce_on_unsafe: bool,
    pub skip_on_unsafe: bool,
    pub maker_timeout_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradePlan {
    pub setup: TradeSetup,
    pub entries: Entries,
    pub sizing: sizing::SizingResult,
    pub execution: ExecutionBundle,
    pub leverage: f64,
    pub flow: FlowSummary,
    pub safe: bool,
    pub rejection_reason: Option<String>,
}

/// Volume-weighted average close over the trailing window, used as the
/// neutral reference point for entry-bias derivation.
fn vwap(candles: &[Candle]) -> f64 {
    let (num, den) = candles.iter().fold((0.0, 0.0), |(n, d), c| (n + c.close * c.volume, d + c.volume));
    if den > 0.0 {
        num / den
    } else {
        candles.last().map(|c| c.close).unwrap_or(0.0)
    }
}

fn stddev_closes(candles: &[Candle]) -> f64 {
    if candles.is_empty() {
        return 0.0;
    }
    let mean: f64 = candles.iter().map(|c| c.close).sum::<f64>() / candles.len() as f64;
    let var: f64 = candles.iter().map(|c| (c.close - mean).powi(2)).sum::<f64>() / candles.len() as f64;
    var.sqrt()
}

/// Order-block mid/edge derived from the most recent opposing-candle cluster
/// before the current leg; fair-value-gap midpoint from the nearest 3-candle
/// imbalance. A coarse but deterministic structural read, sufficient as an
/// anchor for entry staging.
fn structure_anchors(candles: &[Candle], direction: Direction) -> StructureAnchors {
    let n = candles.len();
    if n < 3 {
        let last = candles.last().map(|c| c.close).unwrap_or(0.0);
        return StructureAnchors { ob_mid: last, ob_edge: last, fvg: last };
    }

    let lookback = candles[n.saturating_sub(20)..n.saturating_sub(1)].to_vec();
    let ob_candle = match direction {
        Direction::Long => lookback.iter().rev().find(|c| c.close < c.open),
        Direction::Short => lookback.iter().rev().find(|c| c.close > c.open),
        Direction::Neutral => lookback.last(),
    };
    let (ob_mid, ob_edge) = match ob_candle {
        Some(c) => ((c.open + c.close) / 2.0, match direction {
            Direction::Long => c.low,
            Direction::Short => c.high,
            Direction::Neutral => c.close,
        }),
        None => {
            let last = candles[n - 1].close;
            (last, last)
        }
    };

    let mut fvg = ob_mid;
    for w in candles.windows(3) {
        let (a, _, c) = (&w[0], &w[1], &w[2]);
        match direction {
            Direction::Long if c.low > a.high => {
                fvg = (a.high + c.low) / 2.0;
            }
            Direction::Short if c.high < a.low => {
                fvg = (a.low + c.high) / 2.0;
            }
            _ => {}
        }
    }

    StructureAnchors { ob_mid, ob_edge, fvg }
}

fn session_for(time_ms: i64) -> Session {
    let hour = ((time_ms / 3_600_000).rem_euclid(24)) as u32;
    match hour {
        0..=6 => Session::Asia,
        7..=11 => Session::London,
        12..=20 => Session::NewYork,
        _ => Session::Other,
    }
}

#[derive(Debug)]
pub enum PlanError {
    Entry(InvalidEntry),
}

impl std::fmt::Display for PlanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanError::Entry(e) => write!(f, "{e}"),
        }
    }
}
impl std::error::Error for PlanError {}

/// Build a full `TradePlan` from a scored setup, its primary-timeframe
/// candle series (used for ATR/VWAP/structure), and the market/risk context
/// the scheduler gathered for this symbol.
pub fn build_plan(
    setup: TradeSetup,
    candles: &[Candle],
    zones: &[LiquidationZone],
    market: MarketContext,
    risk: RiskContext,
) -> Result<TradePlan, PlanError> {
    let direction = setup.direction;
    let current_price = candles.last().map(|c| c.close).unwrap_or(setup.entry_plan[0]);
    let atr = calculate_atr(candles, 14).unwrap_or_else(|| (setup.entry_plan[0] - setup.stop_loss).abs().max(1e-9));

    let anchors = structure_anchors(candles, direction);
    let vw = vwap(candles);
    let sigma = stddev_closes(candles);
    let session = session_for(setup.time_ms);

    let flow_ctx = OrderFlowContext {
        obi: market.order_book_imbalance,
        spread_bps: market.spread_bps,
        liq_in_zone: zones.iter().any(|z| {
            z.direction == direction && z.significance >= 0.5 && (z.price - current_price).abs() / current_price < 0.01
        }),
    };

    let entries = build_entries(
        direction,
        current_price,
        market.tick_size,
        atr,
        anchors,
        vw,
        sigma,
        1.0,
        flow_ctx,
        session,
        setup.stop_loss,
    )
    .map_err(PlanError::Entry)?;

    let sizing_cfg = SizingConfig {
        lot_size: market.lot_size,
        min_notional: market.min_notional,
        maintenance_margin_ratio: market.maintenance_margin_ratio,
        liq_buffer_pct: risk.liq_buffer_pct,
        liq_buffer_atr_mult: risk.liq_buffer_atr_mult,
        reduce_on_unsafe: risk.reduce_on_unsafe,
        skip_on_unsafe: risk.skip_on_unsafe,
    };
    let SizingOutcome { sizing, safe, reason } =
        size_position(direction, entries.near.price, setup.stop_loss, risk.risk_usd, risk.leverage, atr, &sizing_cfg);

    let execution = decide_execution(entries.near.clone(), entries.far.clone(), risk.maker_timeout_ms);

    let flow = liquidation::summarize_flow(zones, current_price, market.funding_rate, market.oi_change_pct);

    Ok(TradePlan {
        setup,
        entries,
        sizing,
        execution,
        leverage: risk.leverage,
        flow,
        safe,
        rejection_reason: if safe { None } else { Some(reason) },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::execution::DEFAULT_MAKER_TIMEOUT_MS;
    use std::collections::HashMap;

    fn candle(i: usize, base: f64) -> Candle {
        let close = base + (i as f64) * 0.1;
        Candle {
            open_time: i as i64 * 60_000,
            close_time: i as i64 * 60_000 + 59_999,
            open: close - 0.05,
            high: close + 0.2,
            low: close - 0.3,
            close,
            volume: 100.0,
            quote_volume: close * 100.0,
            trades_count: 10,
            taker_buy_volume: 50.0,
            taker_buy_quote_volume: 50.0 * close,
            is_closed: true,
        }
    }

    fn sample_candles() -> Vec<Candle> {
        (0..60).map(|i| candle(i, 100.0)).collect()
    }

    fn sample_setup(direction: Direction, price: f64) -> TradeSetup {
        let (entry_plan, stop_loss, take_profits) = match direction {
            Direction::Long => (vec![price], price * 0.97, vec![price * 1.03]),
            Direction::Short => (vec![price], price * 1.03, vec![price * 0.97]),
            Direction::Neutral => unreachable!(),
        };
        TradeSetup::new(
            "BTC/USDT".into(),
            "binance".into(),
            direction,
            75.0,
            0.6,
            entry_plan,
            stop_loss,
            take_profits,
            vec!["test".into()],
            0,
            HashMap::new(),
            vec![],
            vec![],
        )
        .unwrap()
    }

    fn market() -> MarketContext {
        MarketContext {
            tick_size: 0.01,
            lot_size: 0.001,
            min_notional: 10.0,
            maintenance_margin_ratio: 0.005,
            spread_bps: 2.0,
            order_book_imbalance: 0.3,
            funding_rate: 0.0,
            oi_change_pct: 0.0,
        }
    }

    fn risk() -> RiskContext {
        RiskContext {
            risk_usd: 50.0,
            leverage: 3.0,
            liq_buffer_pct: 5.0,
            liq_buffer_atr_mult: 1.0,
            reduce_on_unsafe: true,
            skip_on_unsafe: true,
            maker_timeout_ms: DEFAULT_MAKER_TIMEOUT_MS,
        }
    }

    #[test]
    fn builds_a_plan_for_a_long_setup() {
        let candles = sample_candles();
        let price = candles.last().unwrap().close;
        let setup = sample_setup(Direction::Long, price);
        let plan = build_plan(setup, &candles, &[], market(), risk()).unwrap();
        assert_eq!(plan.entries.near.kind, entries::EntryType::Limit);
        assert!(plan.leverage > 0.0);
    }

    #[test]
    fn builds_a_plan_for_a_short_setup() {
        let candles = sample_candles();
        let price = candles.last().unwrap().close;
        let setup = sample_setup(Direction::Short, price);
        let plan = build_plan(setup, &candles, &[], market(), risk()).unwrap();
        assert_eq!(plan.setup.direction, Direction::Short);
    }
}
