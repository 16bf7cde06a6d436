// =============================================================================
// Configuration — defaults / file / env / CLI resolution
// =============================================================================
//
// Grounded on `runtime_config::RuntimeConfig`: `#[serde(default = "...")]`
// floors on every tunable and the same atomic tmp + rename persistence.
// Resolution order is defaults -> file -> env -> CLI
// overrides, each layer only replacing what the previous one left unset.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::types::TradingMode;

fn default_exchange() -> String {
    "binance".to_string()
}

fn default_timeframes() -> Vec<String> {
    vec!["15m".to_string(), "1h".to_string(), "4h".to_string()]
}

fn default_max_concurrency() -> usize {
    8
}

fn default_top_n() -> usize {
    50
}

fn default_risk_usd() -> f64 {
    25.0
}

fn default_leverage() -> f64 {
    3.0
}

fn default_min_score() -> f64 {
    60.0
}

fn default_max_setups() -> usize {
    5
}

fn default_liq_buffer_pct() -> f64 {
    5.0
}

fn default_liq_buffer_atr_mult() -> f64 {
    1.0
}

fn default_max_spread_bps() -> f64 {
    20.0
}

fn default_min_volume_usd() -> f64 {
    100_000.0
}

fn default_journal_path() -> String {
    "data/orders.jsonl".to_string()
}

fn default_state_path() -> String {
    "data/order_state.json".to_string()
}

fn default_max_daily_loss_usd() -> f64 {
    100.0
}

fn default_max_concurrent_positions() -> u32 {
    3
}

fn default_per_trade_risk_usd() -> f64 {
    50.0
}

fn default_per_symbol_exposure_usd_max() -> f64 {
    500.0
}

fn default_total_exposure_usd_max() -> f64 {
    2_000.0
}

fn default_maker_timeout_sec() -> u64 {
    45
}

fn default_idempotency_prefix() -> String {
    "aur".to_string()
}

/// Scanner + trade-plan-factory configuration, resolved once at process
/// startup. Every field carries a default so an empty or
/// partial config file never fails to load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_exchange")]
    pub exchange: String,

    #[serde(default = "default_timeframes")]
    pub timeframes: Vec<String>,

    #[serde(default)]
    pub extra_exclusions: Vec<String>,

    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    #[serde(default = "default_top_n")]
    pub top_n: usize,

    #[serde(default = "default_min_score")]
    pub min_score: f64,

    #[serde(default = "default_max_setups")]
    pub max_setups: usize,

    #[serde(default = "default_max_spread_bps")]
    pub max_spread_bps: f64,

    #[serde(default = "default_min_volume_usd")]
    pub min_volume_usd: f64,

    #[serde(default = "default_risk_usd")]
    pub risk_usd: f64,

    #[serde(default = "default_leverage")]
    pub leverage: f64,

    #[serde(default = "default_liq_buffer_pct")]
    pub liq_buffer_pct: f64,

    #[serde(default = "default_liq_buffer_atr_mult")]
    pub liq_buffer_atr_mult: f64,

    #[serde(default)]
    pub reduce_on_unsafe: bool,

    #[serde(default)]
    pub skip_on_unsafe: bool,

    #[serde(default = "default_max_daily_loss_usd")]
    pub max_daily_loss_usd: f64,

    #[serde(default = "default_max_concurrent_positions")]
    pub max_concurrent_positions: u32,

    /// `TRADING_WINDOWS_UTC`: zero or more `(start_hour, end_hour)` windows,
    /// UTC. A trade is allowed if no windows are configured, or the current
    /// hour falls in at least one of them (end < start wraps past midnight).
    #[serde(default)]
    pub trading_windows_utc: Vec<(u32, u32)>,

    #[serde(default)]
    pub symbol_allowlist: Vec<String>,

    /// `BLOCKLIST_DAYS`: UTC calendar dates (`YYYY-MM-DD`) on which the
    /// executor refuses to place anything.
    #[serde(default)]
    pub blocklist_days: Vec<String>,

    /// `AUTOTRADE_ENABLED`: master switch. `false` blocks every placement
    /// regardless of `autotrade_mode`.
    #[serde(default)]
    pub autotrade_enabled: bool,

    /// `AUTOTRADE_MODE`: must resolve to `Live` for the executor to place
    /// orders; `Paused`/`Killed` block with a reason.
    #[serde(default)]
    pub autotrade_mode: TradingMode,

    /// `PER_TRADE_RISK_USD`.
    #[serde(default = "default_per_trade_risk_usd")]
    pub per_trade_risk_usd: f64,

    /// `PER_SYMBOL_EXPOSURE_USD_MAX`.
    #[serde(default = "default_per_symbol_exposure_usd_max")]
    pub per_symbol_exposure_usd_max: f64,

    /// `TOTAL_EXPOSURE_USD_MAX`.
    #[serde(default = "default_total_exposure_usd_max")]
    pub total_exposure_usd_max: f64,

    /// `MAKER_TIMEOUT_SEC`.
    #[serde(default = "default_maker_timeout_sec")]
    pub maker_timeout_sec: u64,

    /// `IDEMPOTENCY_PREFIX`.
    #[serde(default = "default_idempotency_prefix")]
    pub idempotency_prefix: String,

    #[serde(default = "default_journal_path")]
    pub journal_path: String,

    #[serde(default = "default_state_path")]
    pub state_path: String,

    #[serde(default)]
    pub dry_run: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            exchange: default_exchange(),
            timeframes: default_timeframes(),
            extra_exclusions: Vec::new(),
            max_concurrency: default_max_concurrency(),
            top_n: default_top_n(),
            min_score: default_min_score(),
            max_setups: default_max_setups(),
            max_spread_bps: default_max_spread_bps(),
            min_volume_usd: default_min_volume_usd(),
            risk_usd: default_risk_usd(),
            leverage: default_leverage(),
            liq_buffer_pct: default_liq_buffer_pct(),
            liq_buffer_atr_mult: default_liq_buffer_atr_mult(),
            reduce_on_unsafe: true,
            skip_on_unsafe: true,
            max_daily_loss_usd: default_max_daily_loss_usd(),
            max_concurrent_positions: default_max_concurrent_positions(),
            trading_windows_utc: Vec::new(),
            symbol_allowlist: Vec::new(),
            blocklist_days: Vec::new(),
            autotrade_enabled: false,
            autotrade_mode: TradingMode::default(),
            per_trade_risk_usd: default_per_trade_risk_usd(),
            per_symbol_exposure_usd_max: default_per_symbol_exposure_usd_max(),
            total_exposure_usd_max: default_total_exposure_usd_max(),
            maker_timeout_sec: default_maker_timeout_sec(),
            idempotency_prefix: default_idempotency_prefix(),
            journal_path: default_journal_path(),
            state_path: default_state_path(),
            dry_run: true,
        }
    }
}

impl Config {
    /// Load from a JSON file. Missing fields fall back to their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config from {}", path.display()))?;
        info!(path = %path.display(), exchange = %config.exchange, "config loaded");
        Ok(config)
    }

    /// Persist via an atomic tmp + rename write.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self).context("failed to serialise config to JSON")?;
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;
        info!(path = %path.display(), "config saved (atomic)");
        Ok(())
    }

    /// Overlay environment variables (`SCANNER_*`) onto whatever defaults or
    /// file contents are already loaded. Only variables that are actually
    /// set are applied; everything else keeps its current value.
    pub fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("SCANNER_EXCHANGE") {
            self.exchange = v;
        }
        if let Ok(v) = std::env::var("SCANNER_MAX_CONCURRENCY") {
            match v.parse() {
                Ok(n) => self.max_concurrency = n,
                Err(_) => warn!(value = %v, "SCANNER_MAX_CONCURRENCY is not a valid integer, ignoring"),
            }
        }
        if let Ok(v) = std::env::var("SCANNER_RISK_USD") {
            match v.parse() {
                Ok(n) => self.risk_usd = n,
                Err(_) => warn!(value = %v, "SCANNER_RISK_USD is not a valid number, ignoring"),
            }
        }
        if let Ok(v) = std::env::var("SCANNER_DRY_RUN") {
            self.dry_run = matches!(v.as_str(), "1" | "true" | "yes");
        }
        if let Ok(v) = std::env::var("AUTOTRADE_ENABLED") {
            self.autotrade_enabled = matches!(v.as_str(), "1" | "true" | "yes");
        }
        if let Ok(v) = std::env::var("AUTOTRADE_MODE") {
            self.autotrade_mode = match v.to_lowercase().as_str() {
                "live" => TradingMode::Live,
                "paused" => TradingMode::Paused,
                "killed" => TradingMode::Killed,
                other => {
                    warn!(value = %other, "AUTOTRADE_MODE not recognised, leaving unchanged");
                    self.autotrade_mode
                }
            };
        }
        if let Ok(v) = std::env::var("MAX_CONCURRENT_TRADES") {
            match v.parse() {
                Ok(n) => self.max_concurrent_positions = n,
                Err(_) => warn!(value = %v, "MAX_CONCURRENT_TRADES is not a valid integer, ignoring"),
            }
        }
        if let Ok(v) = std::env::var("DAILY_RISK_USD_LIMIT") {
            match v.parse() {
                Ok(n) => self.max_daily_loss_usd = n,
                Err(_) => warn!(value = %v, "DAILY_RISK_USD_LIMIT is not a valid number, ignoring"),
            }
        }
        if let Ok(v) = std::env::var("PER_TRADE_RISK_USD") {
            match v.parse() {
                Ok(n) => self.per_trade_risk_usd = n,
                Err(_) => warn!(value = %v, "PER_TRADE_RISK_USD is not a valid number, ignoring"),
            }
        }
        if let Ok(v) = std::env::var("PER_SYMBOL_EXPOSURE_USD_MAX") {
            match v.parse() {
                Ok(n) => self.per_symbol_exposure_usd_max = n,
                Err(_) => warn!(value = %v, "PER_SYMBOL_EXPOSURE_USD_MAX is not a valid number, ignoring"),
            }
        }
        if let Ok(v) = std::env::var("TOTAL_EXPOSURE_USD_MAX") {
            match v.parse() {
                Ok(n) => self.total_exposure_usd_max = n,
                Err(_) => warn!(value = %v, "TOTAL_EXPOSURE_USD_MAX is not a valid number, ignoring"),
            }
        }
        if let Ok(v) = std::env::var("ALLOWLIST_SYMBOLS") {
            self.symbol_allowlist = v.split(',').map(|s| s.trim().to_uppercase()).filter(|s| !s.is_empty()).collect();
        }
        if let Ok(v) = std::env::var("BLOCKLIST_DAYS") {
            self.blocklist_days = v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
        }
        if let Ok(v) = std::env::var("TRADING_WINDOWS_UTC") {
            self.trading_windows_utc = v
                .split(',')
                .filter_map(|w| {
                    let (start, end) = w.trim().split_once('-')?;
                    Some((start.trim().parse().ok()?, end.trim().parse().ok()?))
                })
                .collect();
        }
        if let Ok(v) = std::env::var("MAKER_TIMEOUT_SEC") {
            match v.parse() {
                Ok(n) => self.maker_timeout_sec = n,
                Err(_) => warn!(value = %v, "MAKER_TIMEOUT_SEC is not a valid integer, ignoring"),
            }
        }
        if let Ok(v) = std::env::var("IDEMPOTENCY_PREFIX") {
            self.idempotency_prefix = v;
        }
    }

    /// Resolve a full configuration: defaults, overlaid by an optional
    /// config file, overlaid by environment variables. CLI flags are
    /// applied by the caller afterward, since `clap` already
    /// owns their precedence over everything else.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) if p.exists() => Self::load(p)?,
            Some(p) => {
                warn!(path = %p.display(), "config file not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_internally_consistent() {
        let config = Config::default();
        assert!(config.max_concurrency > 0);
        assert!(config.risk_usd > 0.0);
        assert!(!config.timeframes.is_empty());
    }

    #[test]
    fn env_overrides_apply_selectively() {
        std::env::set_var("SCANNER_RISK_USD", "42.5");
        let mut config = Config::default();
        config.apply_env();
        assert_eq!(config.risk_usd, 42.5);
        std::env::remove_var("SCANNER_RISK_USD");
    }

    #[test]
    fn resolve_falls_back_to_defaults_when_no_file_given() {
        let config = Config::resolve(None).unwrap();
        assert_eq!(config.exchange, default_exchange());
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = std::env::temp_dir().join(format!("scanner_cfg_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        let config = Config { risk_usd: 77.0, ..Config::default() };
        config.save(&path).unwrap();
        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.risk_usd, 77.0);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
