// =============================================================================
// Aurora Scanner — entry point
// =============================================================================
//
// One-shot `scan`/`trade` CLI contract, with `tracing_subscriber` `EnvFilter`
// init and `dotenv().ok()` load on startup.

mod binance;
mod cache;
mod cli;
mod config;
mod error;
mod exchange;
mod executor;
mod gates;
mod indicators;
mod journal;
mod liquidation;
mod market_data;
mod pair_filter;
mod planner;
mod regime;
mod scheduler;
mod scorer;
mod telemetry;
mod types;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::binance::BinanceClient;
use crate::cli::{Cli, Command, ScanArgs, TradeArgs};
use crate::config::Config;
use crate::exchange::{BinanceAdapter, ExchangeAdapter};
use crate::executor::{ExecutionOutcome, Executor, Policy, PortfolioState};
use crate::gates::QualityGateConfig;
use crate::journal::Journal;
use crate::planner::{RiskContext, TradePlan};
use crate::scheduler::{run_scan, ScanBundle, ScanConfig};
use crate::telemetry::Telemetry;

#[derive(Debug, Serialize)]
struct ScanFilters {
    symbols: String,
    timeframes: Vec<String>,
    min_score: f64,
    limit: usize,
    leverage: f64,
    risk_usd: f64,
}

#[derive(Debug, Serialize)]
struct ScanStatsDoc {
    pairs: usize,
    qualified: usize,
    returned: usize,
}

#[derive(Debug, Serialize)]
struct ScanMeta {
    scan_id: String,
    generated_at: String,
    elapsed_seconds: f64,
    filters: ScanFilters,
    stats: ScanStatsDoc,
    notes: Vec<String>,
}

#[derive(Debug, Serialize, serde::Deserialize)]
struct ScanBundleDoc {
    meta: ScanMeta,
    results: Vec<TradePlan>,
}

/// Parse a `topN:venue` universe spec, e.g. `top50:binance`.
fn parse_top_spec(spec: &str) -> Option<usize> {
    let rest = spec.strip_prefix("top")?;
    let (n, _venue) = rest.split_once(':')?;
    n.parse::<usize>().ok()
}

async fn resolve_universe(adapter: &Arc<dyn ExchangeAdapter>, spec: &str, fallback_n: usize) -> Vec<String> {
    if let Some(n) = parse_top_spec(spec) {
        return adapter.top_pairs("USDT", n).await.unwrap_or_default();
    }
    let explicit: Vec<String> = spec
        .split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect();
    if !explicit.is_empty() {
        return explicit;
    }
    adapter.top_pairs("USDT", fallback_n).await.unwrap_or_default()
}

fn scan_notes(bundle: &ScanBundle) -> Vec<String> {
    let mut notes = Vec::new();
    if bundle.stats.symbols_synthetic > 0 {
        notes.push(format!(
            "{} symbol(s) used synthetic candle fallback",
            bundle.stats.symbols_synthetic
        ));
    }
    if bundle.stats.symbols_errored > 0 {
        notes.push(format!("{} symbol(s) errored during scan", bundle.stats.symbols_errored));
    }
    if bundle.stats.cancelled {
        notes.push("scan was cancelled before completion; results are partial".to_string());
    }
    if !bundle.rejections.is_empty() {
        notes.push(format!(
            "{} candidate(s) rejected by quality gates (see debug logs for per-symbol reasons)",
            bundle.rejections.len()
        ));
    }
    notes
}

/// OHLCV history depth fetched per timeframe, independent of the
/// top-setups result limit.
const CANDLE_FETCH_LIMIT: usize = 300;

async fn cmd_scan(config: Config, args: ScanArgs) -> Result<i32> {
    let api_key = std::env::var("BINANCE_API_KEY").unwrap_or_default();
    let secret = std::env::var("BINANCE_API_SECRET").unwrap_or_default();
    let client = BinanceClient::new(api_key, secret);
    let adapter: Arc<dyn ExchangeAdapter> = Arc::new(BinanceAdapter::new(client));

    let timeframes = args.timeframes.clone().unwrap_or_else(|| config.timeframes.clone());
    let min_score = args.min_score.unwrap_or(config.min_score);
    let leverage = args.leverage.unwrap_or(config.leverage);
    let risk_usd = args.risk_usd.unwrap_or(config.risk_usd);
    let result_limit = args.limit.unwrap_or(config.max_setups).max(1);

    let symbols_spec = args
        .symbols
        .clone()
        .unwrap_or_else(|| format!("top{}:binance", config.top_n));
    let universe = resolve_universe(&adapter, &symbols_spec, config.top_n).await;

    if universe.is_empty() {
        error!("no symbols resolved for scan; check --symbols or exchange connectivity");
        return Ok(1);
    }

    let gate_config = QualityGateConfig {
        min_score,
        max_spread_bps: config.max_spread_bps,
        min_volume_usd: config.min_volume_usd,
        max_setups: result_limit,
        ..QualityGateConfig::default()
    };

    let scan_config = ScanConfig {
        timeframes: timeframes.clone(),
        extra_exclusions: config.extra_exclusions.clone(),
        max_concurrency: config.max_concurrency,
        max_pairs: config.top_n,
        candle_limit: CANDLE_FETCH_LIMIT,
        result_limit,
        risk: RiskContext {
            risk_usd,
            leverage,
            liq_buffer_pct: config.liq_buffer_pct,
            liq_buffer_atr_mult: config.liq_buffer_atr_mult,
            reduce_on_unsafe: config.reduce_on_unsafe,
            skip_on_unsafe: config.skip_on_unsafe,
            maker_timeout_ms: config.maker_timeout_sec as i64 * 1000,
        },
        gate_config,
    };

    let cancel = CancellationToken::new();
    let start = Utc::now();
    let bundle: ScanBundle = run_scan(adapter, universe, scan_config, cancel).await;

    let doc = ScanBundleDoc {
        meta: ScanMeta {
            scan_id: uuid::Uuid::new_v4().to_string(),
            generated_at: start.to_rfc3339(),
            elapsed_seconds: bundle.stats.duration_ms as f64 / 1000.0,
            filters: ScanFilters {
                symbols: symbols_spec,
                timeframes,
                min_score,
                limit: result_limit,
                leverage,
                risk_usd,
            },
            stats: ScanStatsDoc {
                pairs: bundle.stats.symbols_considered,
                qualified: bundle.stats.symbols_scored,
                returned: bundle.plans.len(),
            },
            notes: scan_notes(&bundle),
        },
        results: bundle.plans,
    };

    std::fs::create_dir_all(&args.out)
        .with_context(|| format!("failed to create output directory {}", args.out.display()))?;
    let out_path = args.out.join(format!("{}.json", doc.meta.scan_id));
    let content = serde_json::to_string_pretty(&doc).context("failed to serialise scan bundle")?;
    std::fs::write(&out_path, content)
        .with_context(|| format!("failed to write scan bundle to {}", out_path.display()))?;

    info!(
        scan_id = %doc.meta.scan_id,
        qualified = doc.meta.stats.qualified,
        returned = doc.meta.stats.returned,
        out = %out_path.display(),
        "scan complete"
    );

    Ok(0)
}

fn scale_plan(mut plan: TradePlan, fraction: f64) -> TradePlan {
    if fraction > 0.0 && fraction < 1.0 {
        plan.sizing.qty *= fraction;
        plan.sizing.notional *= fraction;
    }
    plan
}

async fn cmd_trade(config: Config, args: TradeArgs) -> Result<i32> {
    let content = std::fs::read_to_string(&args.plan)
        .with_context(|| format!("failed to read plan from {}", args.plan.display()))?;

    let plan: TradePlan = match serde_json::from_str::<TradePlan>(&content) {
        Ok(p) => p,
        Err(_) => {
            let doc: ScanBundleDoc = serde_json::from_str(&content)
                .with_context(|| format!("failed to parse a trade plan from {}", args.plan.display()))?;
            doc.results
                .into_iter()
                .next()
                .context("scan bundle contains no results")?
        }
    };

    let api_key = std::env::var("BINANCE_API_KEY").unwrap_or_default();
    let secret = std::env::var("BINANCE_API_SECRET").unwrap_or_default();
    let client = Arc::new(BinanceClient::new(api_key, secret));
    let journal = Arc::new(Journal::new(Path::new(&config.journal_path)));
    let telemetry = Arc::new(Telemetry::new());
    let executor = Executor::with_idempotency_prefix(
        client,
        journal,
        telemetry,
        Path::new(&config.state_path),
        config.idempotency_prefix.clone(),
    );

    let policy = Policy::from_config(&config);
    let portfolio = PortfolioState::default();
    let dry_run = !args.mode.is_live();

    let scaled_plan = scale_plan(plan, args.mode.size_fraction());

    match executor.execute(&scaled_plan, &policy, &portfolio, dry_run).await? {
        ExecutionOutcome::Placed { client_order_id, .. } => {
            info!(client_order_id, "trade placed");
            Ok(0)
        }
        ExecutionOutcome::AlreadyRecorded => {
            info!("trade already recorded for this plan; no duplicate order placed");
            Ok(0)
        }
        ExecutionOutcome::Skipped(reason) => {
            warn!(reason, "trade blocked by policy");
            Ok(2)
        }
        ExecutionOutcome::Failed(reason) => {
            error!(reason, "trade execution failed");
            Ok(2)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let config = match Config::resolve(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "fatal configuration error");
            std::process::exit(1);
        }
    };

    let outcome = match cli.command {
        Command::Scan(args) => cmd_scan(config, args).await,
        Command::Trade(args) => cmd_trade(config, args).await,
    };

    match outcome {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!(error = %e, "runtime failure");
            std::process::exit(2);
        }
    }
}
