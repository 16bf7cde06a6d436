// =============================================================================
// Scan scheduler — bounded worker pool over the symbol universe
// =============================================================================
//
// Grounded on `market_data::trade_stream::TradeStreamProcessor`'s
// `tokio::sync::Semaphore`-bounded task spawning (permits gate concurrency,
// a `JoinSet` collects results) redirected here from a per-symbol websocket
// subscription loop to a per-symbol fetch -> score -> gate -> plan pipeline
// run once per scan. When a symbol's candles cannot be fetched, a
// deterministic synthetic series (seeded via `liquidation::seed_for`) stands
// in so a venue outage degrades a scan instead of aborting it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::exchange::normalize::parse_tf_to_ms;
use crate::exchange::quality;
use crate::exchange::ExchangeAdapter;
use crate::gates::{self, GateCandidate, QualityGateConfig};
use crate::liquidation::{self, synthesize_zones};
use crate::market_data::Candle;
use crate::pair_filter;
use crate::planner::{self, MarketContext, RiskContext, TradePlan};
use crate::scorer::score_symbol;
use crate::types::Direction;

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub timeframes: Vec<String>,
    pub extra_exclusions: Vec<String>,
    pub max_concurrency: usize,
    /// Maximum number of symbols pulled from the universe before scoring
    /// (`max_pairs`).
    pub max_pairs: usize,
    /// OHLCV history depth fetched per timeframe, independent of
    /// `result_limit`.
    pub candle_limit: usize,
    /// Final cap on the number of top-scoring setups returned
    /// (`top_setups_limit` / CLI `--limit`).
    pub result_limit: usize,
    pub risk: RiskContext,
    pub gate_config: QualityGateConfig,
}

#[derive(Debug, Clone)]
pub struct ScanStats {
    pub symbols_considered: usize,
    pub symbols_scored: usize,
    pub symbols_synthetic: usize,
    pub symbols_errored: usize,
    pub cancelled: bool,
    pub duration_ms: i64,
}

#[derive(Debug, Clone)]
pub struct ScanBundle {
    pub plans: Vec<TradePlan>,
    pub rejections: Vec<(String, String)>,
    pub stats: ScanStats,
}

/// Deterministic synthetic candle series, used when a venue is unreachable
/// for a given symbol/timeframe. Same seed always produces the same series,
/// so a degraded scan is still reproducible.
fn synthetic_candles(symbol: &str, timeframe: &str, limit: usize, base_price: f64) -> Vec<Candle> {
    let seed = liquidation::seed_for(symbol, timeframe);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut price = base_price.max(1.0);
    let mut candles = Vec::with_capacity(limit);
    let now = Utc::now().timestamp_millis();
    let step_ms: i64 = 60_000;

    for i in 0..limit {
        let drift: f64 = rng.gen_range(-0.006..0.006);
        let open = price;
        price = (price * (1.0 + drift)).max(0.000_001);
        let close = price;
        let wick = (open.max(close)) * rng.gen_range(0.0005..0.004);
        let high = open.max(close) + wick;
        let low = (open.min(close) - wick).max(0.000_001);
        let volume = rng.gen_range(10.0..1000.0);
        let open_time = now - ((limit - i) as i64) * step_ms;

        candles.push(Candle {
            open_time,
            close_time: open_time + step_ms - 1,
            open,
            high,
            low,
            close,
            volume,
            quote_volume: volume * close,
            trades_count: rng.gen_range(5..200),
            taker_buy_volume: volume * 0.5,
            taker_buy_quote_volume: volume * close * 0.5,
            is_closed: true,
        });
    }

    candles
}

struct SymbolOutcome {
    symbol: String,
    plan: Option<TradePlan>,
    rejection: Option<(String, String)>,
    synthetic: bool,
    errored: bool,
}

async fn scan_one_symbol(
    adapter: Arc<dyn ExchangeAdapter>,
    symbol: String,
    config: ScanConfig,
) -> SymbolOutcome {
    let mut series_by_tf: HashMap<String, Vec<f64>> = HashMap::new();
    let mut primary_candles: Vec<Candle> = Vec::new();
    let mut synthetic = false;

    let current_price = match adapter.current_price(&symbol).await {
        Ok(p) if p > 0.0 => p,
        _ => 100.0,
    };

    let now_ms = Utc::now().timestamp_millis();
    for tf in &config.timeframes {
        let fetched = adapter.fetch_candles(&symbol, tf, config.candle_limit, None).await.ok();
        let tf_ms = parse_tf_to_ms(tf).unwrap_or(60_000);
        let candles = match fetched {
            Some(c) if c.len() >= 50 && quality::assess(&c, tf_ms, now_ms).usable => c,
            _ => {
                synthetic = true;
                synthetic_candles(&symbol, tf, config.candle_limit, current_price)
            }
        };
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        if tf == config.timeframes.first().unwrap_or(tf) {
            primary_candles = candles;
        }
        series_by_tf.insert(tf.clone(), closes);
    }

    let price = primary_candles.last().map(|c| c.close).unwrap_or(current_price);
    let zones = synthesize_zones(&primary_candles);

    let setup = match score_symbol(&symbol, "binance", &series_by_tf, price, zones.clone(), Utc::now().timestamp_millis()) {
        Some(s) => s,
        None => {
            return SymbolOutcome {
                symbol,
                plan: None,
                rejection: Some(("-".to_string(), "no confluent direction".to_string())),
                synthetic,
                errored: false,
            };
        }
    };

    let market_info = adapter.fetch_markets(false).await.ok().and_then(|m| m.get(&symbol.replace('/', "")).cloned());
    let ticker = adapter.fetch_ticker(&symbol).await.ok();

    let candidate = GateCandidate {
        symbol: symbol.clone(),
        direction_is_long: setup.direction == Direction::Long,
        price,
        entry_near: setup.entry_plan[0],
        entry_stop: setup.stop_loss,
        entry_tp1: setup.take_profits[0],
        age_min: 0.0,
        volume_usd_24h: ticker.map(|t| t.quote_volume_24h).unwrap_or(0.0),
        spread_bps: ticker.map(|t| t.spread_bps()).unwrap_or(0.0),
        has_ob: true,
        has_fvg: true,
        bos_in_favor: setup.tf_confluence.values().any(|d| *d == setup.direction),
        htf_trend_agrees: setup.tf_confluence.len() > 1,
        ob_quality: (setup.confidence).clamp(0.0, 1.0),
        atr_pct: {
            use crate::indicators::atr::calculate_atr_pct;
            calculate_atr_pct(&primary_candles, 14).unwrap_or(1.0)
        },
        venue: "binance".to_string(),
        listed_on_venue: market_info.as_ref().map(|m| m.listed).unwrap_or(true),
        candles: primary_candles.clone(),
    };

    let (accepted, rejected) = gates::evaluate(&[candidate], &config.gate_config);
    if accepted.is_empty() {
        let reason = rejected.into_iter().next().map(|(_, r)| r).unwrap_or_else(|| "rejected".to_string());
        return SymbolOutcome { symbol, plan: None, rejection: Some((symbol.clone(), reason)), synthetic, errored: false };
    }

    let market = MarketContext {
        tick_size: market_info.as_ref().map(|m| m.tick_size).unwrap_or(0.01),
        lot_size: market_info.as_ref().map(|m| m.lot_size).unwrap_or(0.001),
        min_notional: market_info.as_ref().map(|m| m.min_notional).unwrap_or(10.0),
        maintenance_margin_ratio: market_info.as_ref().map(|m| m.maintenance_margin_ratio).unwrap_or(0.005),
        spread_bps: accepted[0].spread_bps,
        order_book_imbalance: 0.0,
        funding_rate: 0.0,
        oi_change_pct: 0.0,
    };

    match planner::build_plan(setup, &primary_candles, &zones, market, config.risk) {
        Ok(plan) => SymbolOutcome { symbol, plan: Some(plan), rejection: None, synthetic, errored: false },
        Err(e) => SymbolOutcome {
            symbol: symbol.clone(),
            plan: None,
            rejection: Some((symbol, e.to_string())),
            synthetic,
            errored: false,
        },
    }
}

/// Run one full scan across `universe`, bounded to `config.max_concurrency`
/// concurrent symbol pipelines. `cancel` lets a caller interrupt a scan
/// already in flight; partial results from symbols that completed before
/// cancellation are still returned, with `stats.cancelled = true`.
pub async fn run_scan(
    adapter: Arc<dyn ExchangeAdapter>,
    universe: Vec<String>,
    config: ScanConfig,
    cancel: CancellationToken,
) -> ScanBundle {
    let start = std::time::Instant::now();

    let filtered = pair_filter::filter(&universe, &config.extra_exclusions);
    let symbols: Vec<String> = filtered.into_iter().take(config.max_pairs).collect();
    let symbols_considered = symbols.len();

    let semaphore = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
    let mut join_set: JoinSet<SymbolOutcome> = JoinSet::new();

    for symbol in symbols {
        let permit_semaphore = semaphore.clone();
        let adapter = adapter.clone();
        let config = config.clone();
        let cancel = cancel.clone();

        join_set.spawn(async move {
            let _permit = match permit_semaphore.acquire_owned().await {
                Ok(p) => p,
                Err(_) => {
                    return SymbolOutcome { symbol, plan: None, rejection: None, synthetic: false, errored: true };
                }
            };

            if cancel.is_cancelled() {
                return SymbolOutcome { symbol, plan: None, rejection: None, synthetic: false, errored: false };
            }

            tokio::select! {
                outcome = scan_one_symbol(adapter, symbol.clone(), config) => outcome,
                _ = cancel.cancelled() => {
                    SymbolOutcome { symbol, plan: None, rejection: None, synthetic: false, errored: false }
                }
            }
        });
    }

    let mut plans = Vec::new();
    let mut rejections = Vec::new();
    let mut symbols_scored = 0usize;
    let mut symbols_synthetic = 0usize;
    let mut symbols_errored = 0usize;

    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(outcome) => {
                if outcome.synthetic {
                    symbols_synthetic += 1;
                }
                if outcome.errored {
                    symbols_errored += 1;
                }
                if let Some(plan) = outcome.plan {
                    symbols_scored += 1;
                    plans.push(plan);
                } else if let Some(rej) = outcome.rejection {
                    debug!(symbol = %rej.0, reason = %rej.1, "candidate rejected by quality gates");
                    rejections.push(rej);
                }
            }
            Err(e) => {
                warn!(error = %e, "symbol scan task panicked");
                symbols_errored += 1;
            }
        }
    }

    // Deterministic ordering: highest score first, ties broken by symbol so
    // repeated scans over identical inputs always produce the same order.
    plans.sort_by(|a, b| {
        b.setup
            .score
            .partial_cmp(&a.setup.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.setup.symbol.cmp(&b.setup.symbol))
    });
    plans.truncate(config.result_limit.max(1));
    rejections.sort_by(|a, b| a.0.cmp(&b.0));

    let cancelled = cancel.is_cancelled();
    if cancelled {
        info!("scan cancelled; returning partial results");
    }

    ScanBundle {
        plans,
        rejections,
        stats: ScanStats {
            symbols_considered,
            symbols_scored,
            symbols_synthetic,
            symbols_errored,
            cancelled,
            duration_ms: start.elapsed().as_millis() as i64,
        },
    }
}

/// Small helper so CLI callers don't need to construct a `Duration`
/// themselves when wiring a scan-level timeout onto the cancellation token.
pub fn cancel_after(duration: Duration) -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(duration).await;
        child.cancel();
    });
    token
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_candles_are_deterministic() {
        let a = synthetic_candles("BTC/USDT", "15m", 60, 100.0);
        let b = synthetic_candles("BTC/USDT", "15m", 60, 100.0);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.close, y.close);
            assert_eq!(x.open_time, y.open_time);
        }
    }

    #[test]
    fn synthetic_candles_differ_by_symbol() {
        let a = synthetic_candles("BTC/USDT", "15m", 30, 100.0);
        let b = synthetic_candles("ETH/USDT", "15m", 30, 100.0);
        assert_ne!(a[5].close, b[5].close);
    }

    #[test]
    fn synthetic_candles_have_well_formed_ranges() {
        let candles = synthetic_candles("SOL/USDT", "1h", 40, 50.0);
        for c in &candles {
            assert!(c.high >= c.open.max(c.close));
            assert!(c.low <= c.open.min(c.close));
            assert!(c.volume > 0.0);
        }
    }
}
