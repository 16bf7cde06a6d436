// =============================================================================
// Executor — policy gate, idempotent placement, state persistence
// =============================================================================
//
// Grounded on `risk::RiskEngine`'s circuit-breaker shape (several independent
// boolean checks AND-chained into one `can_trade()` verdict) redirected from
// drawdown/consecutive-loss breakers onto the policy predicates
// §4.9 names (exposure cap, daily loss cap, trading window, allowlist); and
// on `runtime_config::RuntimeConfig::save`'s atomic tmp + rename persistence,
// applied here to the live `OrderState` document instead of config. Order
// placement itself reuses `binance::client::BinanceClient`, the same client
// `exchange::binance::BinanceAdapter` uses for market data.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::binance::client::BinanceClient;
use crate::config::Config;
use crate::journal::{Journal, JournalEventKind};
use crate::planner::entries::EntryType;
use crate::planner::TradePlan;
use crate::telemetry::Telemetry;
use crate::types::{Direction, TradingMode};

#[derive(Debug, Clone)]
pub struct Policy {
    pub autotrade_enabled: bool,
    pub autotrade_mode: TradingMode,
    pub max_daily_loss_usd: f64,
    pub max_concurrent_positions: u32,
    pub trading_windows_utc: Vec<(u32, u32)>,
    pub symbol_allowlist: Vec<String>,
    pub blocklist_days: Vec<String>,
    pub per_trade_risk_usd: f64,
    pub per_symbol_exposure_usd_max: f64,
    pub total_exposure_usd_max: f64,
}

impl Policy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            autotrade_enabled: config.autotrade_enabled,
            autotrade_mode: config.autotrade_mode,
            max_daily_loss_usd: config.max_daily_loss_usd,
            max_concurrent_positions: config.max_concurrent_positions,
            trading_windows_utc: config.trading_windows_utc.clone(),
            symbol_allowlist: config.symbol_allowlist.clone(),
            blocklist_days: config.blocklist_days.clone(),
            per_trade_risk_usd: config.per_trade_risk_usd,
            per_symbol_exposure_usd_max: config.per_symbol_exposure_usd_max,
            total_exposure_usd_max: config.total_exposure_usd_max,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PortfolioState {
    pub realized_loss_usd_today: f64,
    pub open_positions: u32,
    pub symbol_exposure_usd: HashMap<String, f64>,
    pub total_exposure_usd: f64,
}

/// A single candidate placement's sizing facts, as seen by the policy gate.
#[derive(Debug, Clone, Copy)]
pub struct TradeRequest<'a> {
    pub symbol: &'a str,
    pub notional_usd: f64,
    pub trade_risk_usd: f64,
}

/// Hard AND-chain policy gate, checked in order:
/// master switch, mode, symbol shape, allowlist, blocklist date, trading
/// window, daily loss cap, concurrency cap, notional sanity, per-symbol
/// exposure cap, total exposure cap, per-trade risk cap. Returns the first
/// failing reason, or `None` if every predicate passes.
pub fn check_policy(
    policy: &Policy,
    portfolio: &PortfolioState,
    request: TradeRequest,
    today_utc: &str,
    now_hour: u32,
) -> Option<String> {
    if !policy.autotrade_enabled {
        return Some("autotrade master switch is off".to_string());
    }
    if policy.autotrade_mode != TradingMode::Live {
        return Some(format!("autotrade mode is {}, not Live", policy.autotrade_mode));
    }
    if request.symbol.trim().is_empty() {
        return Some("symbol is empty".to_string());
    }
    if !policy.symbol_allowlist.is_empty() && !policy.symbol_allowlist.iter().any(|s| s == request.symbol) {
        return Some(format!("{} is not on the symbol allowlist", request.symbol));
    }
    if policy.blocklist_days.iter().any(|d| d == today_utc) {
        return Some(format!("{today_utc} is on the trading blocklist"));
    }
    if !policy.trading_windows_utc.is_empty() {
        let in_window = policy.trading_windows_utc.iter().any(|&(start, end)| {
            if start <= end {
                now_hour >= start && now_hour < end
            } else {
                now_hour >= start || now_hour < end
            }
        });
        if !in_window {
            return Some(format!("hour {now_hour} is outside every configured trading window"));
        }
    }
    if portfolio.realized_loss_usd_today >= policy.max_daily_loss_usd {
        return Some(format!(
            "daily realized loss {:.2} has reached the cap {:.2}",
            portfolio.realized_loss_usd_today, policy.max_daily_loss_usd
        ));
    }
    if portfolio.open_positions >= policy.max_concurrent_positions {
        return Some(format!(
            "{} open positions at the concurrency cap {}",
            portfolio.open_positions, policy.max_concurrent_positions
        ));
    }
    if request.notional_usd <= 0.0 {
        return Some("plan notional is not positive".to_string());
    }
    let existing_symbol_exposure = portfolio.symbol_exposure_usd.get(request.symbol).copied().unwrap_or(0.0);
    if existing_symbol_exposure + request.notional_usd > policy.per_symbol_exposure_usd_max {
        return Some(format!(
            "symbol exposure {:.2} would exceed the per-symbol cap {:.2}",
            existing_symbol_exposure + request.notional_usd,
            policy.per_symbol_exposure_usd_max
        ));
    }
    if portfolio.total_exposure_usd + request.notional_usd > policy.total_exposure_usd_max {
        return Some(format!(
            "total exposure {:.2} would exceed the total cap {:.2}",
            portfolio.total_exposure_usd + request.notional_usd,
            policy.total_exposure_usd_max
        ));
    }
    if request.trade_risk_usd > policy.per_trade_risk_usd {
        return Some(format!(
            "trade risk {:.2} exceeds the per-trade cap {:.2}",
            request.trade_risk_usd, policy.per_trade_risk_usd
        ));
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Submitted,
    Filled,
    FallbackSubmitted,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRecord {
    pub client_order_id: String,
    pub symbol: String,
    pub direction: Direction,
    pub quantity: f64,
    pub price: f64,
    pub status: OrderStatus,
    pub exchange_order_id: Option<u64>,
    pub submitted_at_ms: i64,
    /// Realized PnL in quote currency, recorded once the fill is confirmed
    /// against the venue's reported execution price. `None` until then.
    #[serde(default)]
    pub realized_pnl_usd: Option<f64>,
}

/// Durable snapshot of in-flight orders, persisted after every mutation via
/// an atomic tmp + rename write so a crash mid-write never corrupts it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderState {
    pub orders: HashMap<String, OrderRecord>,
}

impl OrderState {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read order state from {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("failed to parse order state from {}", path.display()))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create order state directory {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(self).context("failed to serialise order state")?;
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp order state to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp order state to {}", path.display()))?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// An order for this `client_order_id` was already recorded; no new
    /// order was placed (idempotent replay).
    AlreadyRecorded,
    Skipped(String),
    Placed { client_order_id: String, exchange_order_id: Option<u64> },
    Failed(String),
}

pub struct Executor {
    client: Arc<BinanceClient>,
    journal: Arc<Journal>,
    telemetry: Arc<Telemetry>,
    state_path: PathBuf,
    idempotency_prefix: String,
}

impl Executor {
    pub fn new(client: Arc<BinanceClient>, journal: Arc<Journal>, telemetry: Arc<Telemetry>, state_path: impl Into<PathBuf>) -> Self {
        Self::with_idempotency_prefix(client, journal, telemetry, state_path, "aur")
    }

    pub fn with_idempotency_prefix(
        client: Arc<BinanceClient>,
        journal: Arc<Journal>,
        telemetry: Arc<Telemetry>,
        state_path: impl Into<PathBuf>,
        idempotency_prefix: impl Into<String>,
    ) -> Self {
        Self {
            client,
            journal,
            telemetry,
            state_path: state_path.into(),
            idempotency_prefix: idempotency_prefix.into(),
        }
    }

    /// Deterministic `plan_id` derived from the plan's content, so replaying
    /// an identical plan (e.g. on an executor retry) derives the same
    /// idempotency keys instead of minting a fresh one every time.
    fn plan_id(plan: &TradePlan) -> String {
        format!("{}-{}", plan.setup.symbol.replace(['/', '-'], ""), plan.setup.time_ms)
    }

    fn client_order_id(&self, plan: &TradePlan) -> String {
        format!("{}_{}_limit", self.idempotency_prefix, Self::plan_id(plan))
    }

    /// Evaluate the policy gate and, if it passes, place the near-leg order.
    /// Idempotent: replaying the same plan (same derived `client_order_id`)
    /// never double-submits.
    pub async fn execute(&self, plan: &TradePlan, policy: &Policy, portfolio: &PortfolioState, dry_run: bool) -> Result<ExecutionOutcome> {
        let symbol = plan.setup.symbol.replace('/', "");
        let now = Utc::now();
        let trade_risk_usd = plan.sizing.qty * (plan.entries.near.price - plan.setup.stop_loss).abs();
        let request = TradeRequest {
            symbol: &symbol,
            notional_usd: plan.sizing.notional,
            trade_risk_usd,
        };

        if let Some(reason) = check_policy(policy, portfolio, request, &now.format("%Y-%m-%d").to_string(), now.hour()) {
            self.journal.record_simple(&plan.setup.symbol, JournalEventKind::PolicyRejected, "-", reason.clone())?;
            return Ok(ExecutionOutcome::Skipped(reason));
        }

        if !plan.safe {
            let reason = plan.rejection_reason.clone().unwrap_or_else(|| "plan marked unsafe".to_string());
            self.journal.record_simple(&plan.setup.symbol, JournalEventKind::PolicyRejected, "-", reason.clone())?;
            return Ok(ExecutionOutcome::Skipped(reason));
        }

        let client_order_id = self.client_order_id(plan);

        let mut state = OrderState::load(&self.state_path)?;
        if state.orders.contains_key(&client_order_id) {
            info!(client_order_id, "order already recorded, skipping duplicate submission");
            self.telemetry.record_order_recorded();
            return Ok(ExecutionOutcome::AlreadyRecorded);
        }

        self.telemetry.record_order_attempt();

        let side = match plan.setup.direction {
            Direction::Long => "BUY",
            Direction::Short => "SELL",
            Direction::Neutral => {
                return Ok(ExecutionOutcome::Skipped("neutral direction cannot be executed".to_string()));
            }
        };

        let (order_type, price, tif) = match plan.entries.near.kind {
            EntryType::Limit => ("LIMIT", Some(plan.entries.near.price), Some("GTC")),
            EntryType::Stop => ("MARKET", None, None),
        };

        self.journal.record_simple(
            &plan.setup.symbol,
            JournalEventKind::PlanBuilt,
            &client_order_id,
            format!("near={:?} qty={:.6} price={:.6}", plan.entries.near.kind, plan.sizing.qty, plan.entries.near.price),
        )?;

        // Persist the intent before any placement attempt, so a crash
        // between minting the plan_id and hearing back from the venue still
        // leaves a durable record that this order was meant to go out.
        let intent_price = price.unwrap_or(plan.entries.near.price);
        let intent = OrderRecord {
            client_order_id: client_order_id.clone(),
            symbol: symbol.clone(),
            direction: plan.setup.direction,
            quantity: plan.sizing.qty,
            price: intent_price,
            status: OrderStatus::Pending,
            exchange_order_id: None,
            submitted_at_ms: Utc::now().timestamp_millis(),
            realized_pnl_usd: None,
        };
        state.orders.insert(client_order_id.clone(), intent);
        state.save(&self.state_path)?;

        if dry_run {
            let record = OrderRecord {
                client_order_id: client_order_id.clone(),
                symbol: symbol.clone(),
                direction: plan.setup.direction,
                quantity: plan.sizing.qty,
                price: intent_price,
                status: OrderStatus::Submitted,
                exchange_order_id: None,
                submitted_at_ms: Utc::now().timestamp_millis(),
                realized_pnl_usd: None,
            };
            state.orders.insert(client_order_id.clone(), record);
            state.save(&self.state_path)?;
            self.journal.record_simple(&plan.setup.symbol, JournalEventKind::OrderSubmitted, &client_order_id, "dry run, no live order placed")?;
            return Ok(ExecutionOutcome::Placed { client_order_id, exchange_order_id: None });
        }

        match self
            .client
            .place_order(&symbol, side, order_type, plan.sizing.qty, price, tif, Some(&client_order_id))
            .await
        {
            Ok(body) => {
                let exchange_order_id = body.get("orderId").and_then(|v| v.as_u64());
                let record = OrderRecord {
                    client_order_id: client_order_id.clone(),
                    symbol,
                    direction: plan.setup.direction,
                    quantity: plan.sizing.qty,
                    price: intent_price,
                    status: OrderStatus::Submitted,
                    exchange_order_id,
                    submitted_at_ms: Utc::now().timestamp_millis(),
                    realized_pnl_usd: None,
                };
                state.orders.insert(client_order_id.clone(), record);
                state.save(&self.state_path)?;
                self.journal.record_simple(&plan.setup.symbol, JournalEventKind::OrderSubmitted, &client_order_id, "submitted to exchange, awaiting fill confirmation")?;
                Ok(ExecutionOutcome::Placed { client_order_id, exchange_order_id })
            }
            Err(e) => {
                warn!(error = %e, client_order_id, "order placement failed");
                let mut failed = state.orders.get(&client_order_id).cloned().unwrap_or(OrderRecord {
                    client_order_id: client_order_id.clone(),
                    symbol: symbol.clone(),
                    direction: plan.setup.direction,
                    quantity: plan.sizing.qty,
                    price: intent_price,
                    status: OrderStatus::Pending,
                    exchange_order_id: None,
                    submitted_at_ms: Utc::now().timestamp_millis(),
                    realized_pnl_usd: None,
                });
                failed.status = OrderStatus::Failed;
                state.orders.insert(client_order_id.clone(), failed);
                state.save(&self.state_path)?;
                self.journal.record_simple(&plan.setup.symbol, JournalEventKind::OrderFailed, &client_order_id, e.to_string())?;
                self.telemetry.record_order_failed();
                Ok(ExecutionOutcome::Failed(e.to_string()))
            }
        }
    }

    /// Query the venue for `client_order_id`'s current status and, if it has
    /// actually filled, transition the persisted record from `Submitted` to
    /// `Filled`, record realized PnL (fill price vs. the planned entry
    /// price), and write the terminal journal events. This is the only path
    /// that increments the `orders_filled` counter — placement alone does
    /// not mean the order filled.
    pub async fn confirm_fill(&self, plan: &TradePlan, client_order_id: &str) -> Result<ExecutionOutcome> {
        let symbol = plan.setup.symbol.replace('/', "");
        let mut state = OrderState::load(&self.state_path)?;

        let Some(record) = state.orders.get(client_order_id).cloned() else {
            return Ok(ExecutionOutcome::Failed(format!("no order state recorded for {client_order_id}")));
        };

        if matches!(record.status, OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Failed) {
            return Ok(ExecutionOutcome::AlreadyRecorded);
        }

        let body = self.client.get_order(&symbol, client_order_id).await.context("failed to query order status")?;
        let exchange_status = body.get("status").and_then(|v| v.as_str()).unwrap_or("");
        let executed_qty: f64 = body
            .get("executedQty")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .unwrap_or(record.quantity);
        let fill_price: f64 = body
            .get("price")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .filter(|p| *p > 0.0)
            .unwrap_or(record.price);

        match exchange_status {
            "FILLED" => {
                let pnl_usd = match plan.setup.direction {
                    Direction::Long => (fill_price - record.price) * executed_qty,
                    Direction::Short => (record.price - fill_price) * executed_qty,
                    Direction::Neutral => 0.0,
                };

                let mut filled = record.clone();
                filled.status = OrderStatus::Filled;
                filled.realized_pnl_usd = Some(pnl_usd);
                state.orders.insert(client_order_id.to_string(), filled);
                state.save(&self.state_path)?;

                self.journal.record_simple(
                    &plan.setup.symbol,
                    JournalEventKind::OrderFilled,
                    client_order_id,
                    format!("filled qty={executed_qty:.6} price={fill_price:.6}"),
                )?;
                self.journal.record_simple(
                    &plan.setup.symbol,
                    JournalEventKind::PositionClosed,
                    client_order_id,
                    format!("realized_pnl_usd={pnl_usd:.2}"),
                )?;
                self.telemetry.record_order_filled();
                Ok(ExecutionOutcome::Placed { client_order_id: client_order_id.to_string(), exchange_order_id: record.exchange_order_id })
            }
            "CANCELED" | "EXPIRED" | "REJECTED" => {
                let mut cancelled = record;
                cancelled.status = OrderStatus::Cancelled;
                state.orders.insert(client_order_id.to_string(), cancelled);
                state.save(&self.state_path)?;
                self.journal.record_simple(
                    &plan.setup.symbol,
                    JournalEventKind::OrderCancelled,
                    client_order_id,
                    format!("exchange reported {exchange_status}"),
                )?;
                Ok(ExecutionOutcome::Skipped(format!("order {exchange_status} on exchange")))
            }
            other => Ok(ExecutionOutcome::Skipped(format!("order still {other}, not yet filled"))),
        }
    }

    /// Cancel a resting maker order and resubmit as a taker order once its
    /// timeout has elapsed, per the `ExecutionBundle` fallback hint.
    pub async fn apply_maker_timeout_fallback(&self, plan: &TradePlan, exchange_order_id: u64) -> Result<ExecutionOutcome> {
        let symbol = plan.setup.symbol.replace('/', "");
        let Some(fallback) = &plan.execution.near.fallback else {
            return Ok(ExecutionOutcome::Skipped("near leg has no fallback configured".to_string()));
        };

        self.client.cancel_order(&symbol, exchange_order_id).await.context("failed to cancel timed-out maker order")?;
        self.journal.record_simple(&plan.setup.symbol, JournalEventKind::OrderCancelled, &exchange_order_id.to_string(), "maker timeout elapsed")?;

        let side = match plan.setup.direction {
            Direction::Long => "BUY",
            Direction::Short => "SELL",
            Direction::Neutral => return Ok(ExecutionOutcome::Skipped("neutral direction cannot be executed".to_string())),
        };

        let client_order_id = format!("{}_{}_fallback", self.idempotency_prefix, Self::plan_id(plan));
        match self
            .client
            .place_order(&symbol, side, "MARKET", plan.sizing.qty, None, None, Some(&client_order_id))
            .await
        {
            Ok(body) => {
                let new_id = body.get("orderId").and_then(|v| v.as_u64());
                self.journal.record_simple(
                    &plan.setup.symbol,
                    JournalEventKind::MakerTimeoutFallback,
                    &client_order_id,
                    format!("fallback price {:.6}", fallback.fallback_price),
                )?;
                Ok(ExecutionOutcome::Placed { client_order_id, exchange_order_id: new_id })
            }
            Err(e) => {
                self.journal.record_simple(&plan.setup.symbol, JournalEventKind::OrderFailed, &client_order_id, e.to_string())?;
                Ok(ExecutionOutcome::Failed(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> Policy {
        Policy {
            autotrade_enabled: true,
            autotrade_mode: TradingMode::Live,
            max_daily_loss_usd: 100.0,
            max_concurrent_positions: 3,
            trading_windows_utc: Vec::new(),
            symbol_allowlist: Vec::new(),
            blocklist_days: Vec::new(),
            per_trade_risk_usd: 1_000.0,
            per_symbol_exposure_usd_max: 5_000.0,
            total_exposure_usd_max: 20_000.0,
        }
    }

    fn request(symbol: &str) -> TradeRequest<'_> {
        TradeRequest { symbol, notional_usd: 100.0, trade_risk_usd: 20.0 }
    }

    #[test]
    fn passes_when_all_predicates_clear() {
        let portfolio = PortfolioState::default();
        assert!(check_policy(&policy(), &portfolio, request("BTCUSDT"), "2026-07-27", 12).is_none());
    }

    #[test]
    fn rejects_when_master_switch_off() {
        let mut p = policy();
        p.autotrade_enabled = false;
        let portfolio = PortfolioState::default();
        assert!(check_policy(&p, &portfolio, request("BTCUSDT"), "2026-07-27", 12).is_some());
    }

    #[test]
    fn rejects_when_mode_is_not_live() {
        let mut p = policy();
        p.autotrade_mode = TradingMode::Paused;
        let portfolio = PortfolioState::default();
        assert!(check_policy(&p, &portfolio, request("BTCUSDT"), "2026-07-27", 12).is_some());
    }

    #[test]
    fn rejects_blocklisted_date() {
        let mut p = policy();
        p.blocklist_days = vec!["2026-07-27".to_string()];
        let portfolio = PortfolioState::default();
        assert!(check_policy(&p, &portfolio, request("BTCUSDT"), "2026-07-27", 12).is_some());
        assert!(check_policy(&p, &portfolio, request("BTCUSDT"), "2026-07-28", 12).is_none());
    }

    #[test]
    fn rejects_past_daily_loss_cap() {
        let portfolio = PortfolioState { realized_loss_usd_today: 150.0, ..Default::default() };
        assert!(check_policy(&policy(), &portfolio, request("BTCUSDT"), "2026-07-27", 12).is_some());
    }

    #[test]
    fn rejects_at_concurrency_cap() {
        let portfolio = PortfolioState { open_positions: 3, ..Default::default() };
        assert!(check_policy(&policy(), &portfolio, request("BTCUSDT"), "2026-07-27", 12).is_some());
    }

    #[test]
    fn rejects_outside_trading_window() {
        let mut p = policy();
        p.trading_windows_utc = vec![(8, 16)];
        let portfolio = PortfolioState::default();
        assert!(check_policy(&p, &portfolio, request("BTCUSDT"), "2026-07-27", 22).is_some());
        assert!(check_policy(&p, &portfolio, request("BTCUSDT"), "2026-07-27", 10).is_none());
    }

    #[test]
    fn overnight_window_wraps_midnight() {
        let mut p = policy();
        p.trading_windows_utc = vec![(22, 4)];
        let portfolio = PortfolioState::default();
        assert!(check_policy(&p, &portfolio, request("BTCUSDT"), "2026-07-27", 23).is_none());
        assert!(check_policy(&p, &portfolio, request("BTCUSDT"), "2026-07-27", 2).is_none());
        assert!(check_policy(&p, &portfolio, request("BTCUSDT"), "2026-07-27", 12).is_some());
    }

    #[test]
    fn rejects_symbol_off_allowlist() {
        let mut p = policy();
        p.symbol_allowlist = vec!["ETHUSDT".to_string()];
        let portfolio = PortfolioState::default();
        assert!(check_policy(&p, &portfolio, request("BTCUSDT"), "2026-07-27", 12).is_some());
        assert!(check_policy(&p, &portfolio, request("ETHUSDT"), "2026-07-27", 12).is_none());
    }

    #[test]
    fn rejects_nonpositive_notional() {
        let portfolio = PortfolioState::default();
        let req = TradeRequest { symbol: "BTCUSDT", notional_usd: 0.0, trade_risk_usd: 20.0 };
        assert!(check_policy(&policy(), &portfolio, req, "2026-07-27", 12).is_some());
    }

    #[test]
    fn rejects_per_symbol_exposure_over_cap() {
        let mut p = policy();
        p.per_symbol_exposure_usd_max = 150.0;
        let mut portfolio = PortfolioState::default();
        portfolio.symbol_exposure_usd.insert("BTCUSDT".to_string(), 100.0);
        assert!(check_policy(&p, &portfolio, request("BTCUSDT"), "2026-07-27", 12).is_some());
    }

    #[test]
    fn rejects_total_exposure_over_cap() {
        let mut p = policy();
        p.total_exposure_usd_max = 150.0;
        let portfolio = PortfolioState { total_exposure_usd: 100.0, ..Default::default() };
        assert!(check_policy(&p, &portfolio, request("BTCUSDT"), "2026-07-27", 12).is_some());
    }

    #[test]
    fn rejects_trade_risk_over_per_trade_cap() {
        let mut p = policy();
        p.per_trade_risk_usd = 10.0;
        let portfolio = PortfolioState::default();
        assert!(check_policy(&p, &portfolio, request("BTCUSDT"), "2026-07-27", 12).is_some());
    }

    #[test]
    fn order_state_roundtrips_through_disk() {
        let path = std::env::temp_dir().join(format!("scanner_order_state_test_{}.json", std::process::id()));
        let mut state = OrderState::default();
        state.orders.insert(
            "abc".to_string(),
            OrderRecord {
                client_order_id: "abc".to_string(),
                symbol: "BTCUSDT".to_string(),
                direction: Direction::Long,
                quantity: 0.01,
                price: 100.0,
                status: OrderStatus::Submitted,
                exchange_order_id: Some(1),
                submitted_at_ms: 0,
                realized_pnl_usd: None,
            },
        );
        state.save(&path).unwrap();
        let loaded = OrderState::load(&path).unwrap();
        assert!(loaded.orders.contains_key("abc"));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn pending_record_has_no_realized_pnl_until_filled() {
        let record = OrderRecord {
            client_order_id: "abc".to_string(),
            symbol: "BTCUSDT".to_string(),
            direction: Direction::Long,
            quantity: 0.01,
            price: 100.0,
            status: OrderStatus::Pending,
            exchange_order_id: None,
            submitted_at_ms: 0,
            realized_pnl_usd: None,
        };
        assert_eq!(record.status, OrderStatus::Pending);
        assert!(record.realized_pnl_usd.is_none());
    }

    #[test]
    fn realized_pnl_deserializes_as_none_when_absent_from_legacy_state() {
        let legacy = r#"{"orders":{"abc":{"client_order_id":"abc","symbol":"BTCUSDT","direction":"Long","quantity":0.01,"price":100.0,"status":"submitted","exchange_order_id":1,"submitted_at_ms":0}}}"#;
        let state: OrderState = serde_json::from_str(legacy).unwrap();
        assert_eq!(state.orders["abc"].realized_pnl_usd, None);
    }
}
