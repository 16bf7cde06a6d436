// =============================================================================
// CLI surface — `scan` / `trade` subcommands
// =============================================================================
//
// `clap`'s derive API backs a one-shot `scan`/`trade` command contract
// rather than an always-on background process.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::types::TradeMode;

#[derive(Debug, Parser)]
#[command(name = "aurora-scanner", version, about = "Crypto perpetual-futures market scanner and trade-plan factory")]
pub struct Cli {
    /// Path to a JSON config file; falls back to defaults if absent.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one end-to-end scan over the symbol universe.
    Scan(ScanArgs),
    /// Policy-check and (optionally) execute a single pre-built trade plan.
    Trade(TradeArgs),
}

#[derive(Debug, Parser)]
pub struct ScanArgs {
    /// Comma-separated symbol list, or `topN:venue` (e.g. `top50:binance`).
    #[arg(long)]
    pub symbols: Option<String>,

    /// Comma-separated timeframe list, overriding the config default.
    #[arg(long, value_delimiter = ',')]
    pub timeframes: Option<Vec<String>>,

    /// Maximum number of top-scoring setups to keep in the scan bundle,
    /// overriding `max_setups` from config.
    #[arg(long)]
    pub limit: Option<usize>,

    /// Minimum composite score a setup must clear to be kept.
    #[arg(long)]
    pub min_score: Option<f64>,

    /// Leverage assumed for sizing/liquidation-safety calculations.
    #[arg(long)]
    pub leverage: Option<f64>,

    /// Risk budget in quote currency per setup.
    #[arg(long)]
    pub risk_usd: Option<f64>,

    /// Reserved for a future notification integration; accepted for
    /// CLI-surface compatibility, currently a no-op.
    #[arg(long, default_value_t = 0)]
    pub telegram: u8,

    /// Comma-separated output formats (json,csv,md). Only `json` is
    /// implemented; other values are accepted and ignored.
    #[arg(long, default_value = "json")]
    pub formats: String,

    /// Directory the scan bundle and journal/state files are written under.
    #[arg(long, default_value = "data")]
    pub out: PathBuf,
}

#[derive(Debug, Parser)]
pub struct TradeArgs {
    /// Path to a previously persisted scan bundle or single trade plan.
    #[arg(long)]
    pub plan: PathBuf,

    /// Execution aggressiveness: dry, paper, live25, live50, live100.
    #[arg(long)]
    pub mode: TradeMode,
}
