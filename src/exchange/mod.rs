// =============================================================================
// Exchange adapter — venue-facing data layer
// =============================================================================
//
// Wraps a venue client (here, Binance) behind the `ExchangeAdapter` trait
// adding the TTL cache, symbol normalisation,
// timeframe parsing, and the retry/backoff loop the venue client itself does
// not provide.

pub mod binance;
pub mod normalize;
pub mod quality;
pub mod retry;

pub use binance::BinanceAdapter;
pub use normalize::{normalize, parse_tf_to_ms};

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ScannerError;
use crate::market_data::Candle;

/// Static metadata for one tradable market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketInfo {
    pub symbol: String,
    pub base: String,
    pub quote: String,
    pub tick_size: f64,
    pub lot_size: f64,
    pub min_notional: f64,
    pub maintenance_margin_ratio: f64,
    pub listed: bool,
}

/// A point-in-time quote snapshot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Ticker {
    pub last: f64,
    pub bid: f64,
    pub ask: f64,
    pub quote_volume_24h: f64,
}

impl Ticker {
    pub fn spread_bps(&self) -> f64 {
        let mid = (self.bid + self.ask) / 2.0;
        if mid <= 0.0 || self.bid <= 0.0 || self.ask <= 0.0 {
            f64::INFINITY
        } else {
            ((self.ask - self.bid) / mid) * 10_000.0
        }
    }
}

/// Venue-facing data operations, independent of any specific exchange.
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    async fn fetch_markets(
        &self,
        force_refresh: bool,
    ) -> Result<HashMap<String, MarketInfo>, ScannerError>;

    async fn fetch_candles(
        &self,
        symbol: &str,
        tf: &str,
        limit: usize,
        since: Option<i64>,
    ) -> Result<Vec<Candle>, ScannerError>;

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, ScannerError>;

    /// Current price derived from `last`, falling back to `close` of the most
    /// recent cached candle when no ticker is available.
    async fn current_price(&self, symbol: &str) -> Result<f64, ScannerError> {
        match self.fetch_ticker(symbol).await {
            Ok(t) if t.last > 0.0 => Ok(t.last),
            _ => {
                let candles = self.fetch_candles(symbol, "15m", 1, None).await?;
                candles
                    .last()
                    .map(|c| c.close)
                    .ok_or_else(|| ScannerError::DataShape(format!("no price available for {symbol}")))
            }
        }
    }

    async fn top_pairs(&self, quote: &str, n: usize) -> Result<Vec<String>, ScannerError>;
}
