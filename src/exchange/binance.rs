// =============================================================================
// BinanceAdapter — ExchangeAdapter over a signed-request Binance REST client
// =============================================================================
//
// Wraps `binance::client::BinanceClient` behind the `ExchangeAdapter` trait,
// adding the pieces the raw client does not provide: a TTL cache per
// resource kind, symbol normalisation, timeframe parsing, and the
// retry/backoff loop from `exchange::retry`.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::warn;

use crate::binance::client::BinanceClient;
use crate::cache::{ttl, CacheKey, TtlCache};
use crate::error::ScannerError;
use crate::exchange::normalize::normalize;
use crate::exchange::retry::{with_retry, RetryConfig};
use crate::exchange::{ExchangeAdapter, MarketInfo, Ticker};
use crate::market_data::Candle;

pub struct BinanceAdapter {
    client: BinanceClient,
    cache: TtlCache,
    retry_cfg: RetryConfig,
}

impl BinanceAdapter {
    pub fn new(client: BinanceClient) -> Self {
        Self {
            client,
            cache: TtlCache::new(),
            retry_cfg: RetryConfig::default(),
        }
    }

    /// Venue wire symbol for a canonical `BASE/QUOTE` pair, e.g. `BTC/USDT`
    /// -> `BTCUSDT`.
    fn wire_symbol(symbol: &str) -> String {
        normalize(symbol).replace('/', "")
    }

    fn parse_market(entry: &serde_json::Value) -> Option<MarketInfo> {
        let symbol = entry["symbol"].as_str()?.to_string();
        let base = entry["baseAsset"].as_str().unwrap_or_default().to_string();
        let quote = entry["quoteAsset"].as_str().unwrap_or_default().to_string();
        let listed = entry["status"].as_str() == Some("TRADING");

        let mut tick_size = 0.0;
        let mut lot_size = 0.0;
        let mut min_notional = 0.0;

        if let Some(filters) = entry["filters"].as_array() {
            for f in filters {
                match f["filterType"].as_str() {
                    Some("PRICE_FILTER") => {
                        tick_size = f["tickSize"]
                            .as_str()
                            .and_then(|s| s.parse().ok())
                            .unwrap_or(0.0);
                    }
                    Some("LOT_SIZE") => {
                        lot_size = f["stepSize"]
                            .as_str()
                            .and_then(|s| s.parse().ok())
                            .unwrap_or(0.0);
                    }
                    Some("MIN_NOTIONAL") | Some("NOTIONAL") => {
                        min_notional = f["minNotional"]
                            .as_str()
                            .and_then(|s| s.parse().ok())
                            .unwrap_or(0.0);
                    }
                    _ => {}
                }
            }
        }

        Some(MarketInfo {
            symbol: format!("{base}/{quote}"),
            base,
            quote,
            tick_size,
            lot_size,
            min_notional,
            // Spot exchangeInfo carries no maintenance-margin data; a
            // conservative default is applied until a futures-specific
            // source is wired in.
            maintenance_margin_ratio: 0.005,
            listed,
        })
    }

    fn parse_ticker(entry: &serde_json::Value) -> Option<Ticker> {
        let last = entry["lastPrice"].as_str()?.parse().ok()?;
        let bid = entry["bidPrice"]
            .as_str()
            .and_then(|s| s.parse().ok())
            .unwrap_or(last);
        let ask = entry["askPrice"]
            .as_str()
            .and_then(|s| s.parse().ok())
            .unwrap_or(last);
        let quote_volume_24h = entry["quoteVolume"]
            .as_str()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.0);
        Some(Ticker {
            last,
            bid,
            ask,
            quote_volume_24h,
        })
    }
}

#[async_trait]
impl ExchangeAdapter for BinanceAdapter {
    async fn fetch_markets(
        &self,
        force_refresh: bool,
    ) -> Result<HashMap<String, MarketInfo>, ScannerError> {
        let key = CacheKey {
            resource: "markets".to_string(),
            symbol: "*".to_string(),
            timeframe: String::new(),
            limit: 0,
        };

        if !force_refresh {
            if let Some(cached) = self.cache.get(&key.to_string()) {
                if let Ok(map) = serde_json::from_value(cached) {
                    return Ok(map);
                }
            }
        }

        let entries = with_retry(&self.retry_cfg, || self.client.get_all_symbols_info())
            .await
            .map_err(|e| ScannerError::ExchangeFatal(e.to_string()))?;

        let mut markets = HashMap::new();
        for entry in &entries {
            match Self::parse_market(entry) {
                Some(m) => {
                    markets.insert(m.symbol.clone(), m);
                }
                None => warn!("skipping unparseable exchangeInfo entry"),
            }
        }

        if let Ok(value) = serde_json::to_value(&markets) {
            self.cache.set(&key.to_string(), value, ttl::MARKETS);
        }

        Ok(markets)
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        tf: &str,
        limit: usize,
        _since: Option<i64>,
    ) -> Result<Vec<Candle>, ScannerError> {
        let wire = Self::wire_symbol(symbol);
        let key = CacheKey {
            resource: "candles".to_string(),
            symbol: wire.clone(),
            timeframe: tf.to_string(),
            limit,
        };

        if let Some(cached) = self.cache.get(&key.to_string()) {
            if let Ok(candles) = serde_json::from_value::<Vec<Candle>>(cached) {
                return Ok(candles);
            }
        }

        let limit_u32 = limit.min(1000) as u32;
        let candles = with_retry(&self.retry_cfg, || {
            self.client.get_klines(&wire, tf, limit_u32)
        })
        .await
        .map_err(|e| ScannerError::ExchangeFatal(e.to_string()))?;

        let mut candles = candles;
        if candles.len() > limit {
            candles = candles.split_off(candles.len() - limit);
        }

        if let Ok(value) = serde_json::to_value(&candles) {
            self.cache.set(&key.to_string(), value, ttl::OHLCV);
        }

        Ok(candles)
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, ScannerError> {
        let wire = Self::wire_symbol(symbol);
        let key = CacheKey {
            resource: "ticker".to_string(),
            symbol: wire.clone(),
            timeframe: String::new(),
            limit: 0,
        };

        if let Some(cached) = self.cache.get(&key.to_string()) {
            if let Ok(ticker) = serde_json::from_value::<Ticker>(cached) {
                return Ok(ticker);
            }
        }

        let entry = with_retry(&self.retry_cfg, || self.client.get_ticker_24hr(&wire))
            .await
            .map_err(|e| ScannerError::ExchangeFatal(e.to_string()))?;

        let ticker = Self::parse_ticker(&entry)
            .ok_or_else(|| ScannerError::DataShape(format!("unparseable ticker for {symbol}")))?;

        if let Ok(value) = serde_json::to_value(ticker) {
            self.cache.set(&key.to_string(), value, ttl::TICKERS);
        }

        Ok(ticker)
    }

    async fn top_pairs(&self, quote: &str, n: usize) -> Result<Vec<String>, ScannerError> {
        let key = CacheKey {
            resource: "top_pairs".to_string(),
            symbol: quote.to_string(),
            timeframe: String::new(),
            limit: n,
        };

        if let Some(cached) = self.cache.get(&key.to_string()) {
            if let Ok(pairs) = serde_json::from_value::<Vec<String>>(cached) {
                return Ok(pairs);
            }
        }

        let tickers = with_retry(&self.retry_cfg, || self.client.get_all_tickers_24hr()).await;

        let pairs = match tickers {
            Ok(entries) => {
                let mut ranked: Vec<(String, f64)> = entries
                    .iter()
                    .filter_map(|e| {
                        let wire_symbol = e["symbol"].as_str()?;
                        if !wire_symbol.ends_with(quote) {
                            return None;
                        }
                        let base = &wire_symbol[..wire_symbol.len() - quote.len()];
                        let volume: f64 = e["quoteVolume"].as_str()?.parse().ok()?;
                        Some((format!("{base}/{quote}"), volume))
                    })
                    .collect();
                ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
                ranked.into_iter().take(n).map(|(s, _)| s).collect()
            }
            Err(_) => {
                // Fall back to static market metadata, sorted alphabetically
                // so the result stays deterministic.
                let markets = self.fetch_markets(false).await?;
                let mut symbols: Vec<String> = markets
                    .values()
                    .filter(|m| m.listed && m.quote == quote)
                    .map(|m| m.symbol.clone())
                    .collect();
                symbols.sort();
                symbols.truncate(n);
                symbols
            }
        };

        if let Ok(value) = serde_json::to_value(&pairs) {
            self.cache.set(&key.to_string(), value, ttl::TICKERS);
        }

        Ok(pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_symbol_strips_separator() {
        assert_eq!(BinanceAdapter::wire_symbol("BTC/USDT"), "BTCUSDT");
        assert_eq!(BinanceAdapter::wire_symbol("btc-usdt"), "BTCUSDT");
    }

    #[test]
    fn parse_market_extracts_filters() {
        let entry = serde_json::json!({
            "symbol": "BTCUSDT",
            "baseAsset": "BTC",
            "quoteAsset": "USDT",
            "status": "TRADING",
            "filters": [
                {"filterType": "PRICE_FILTER", "tickSize": "0.01"},
                {"filterType": "LOT_SIZE", "stepSize": "0.00001"},
                {"filterType": "MIN_NOTIONAL", "minNotional": "10.0"}
            ]
        });
        let market = BinanceAdapter::parse_market(&entry).unwrap();
        assert_eq!(market.symbol, "BTC/USDT");
        assert_eq!(market.tick_size, 0.01);
        assert_eq!(market.lot_size, 0.00001);
        assert_eq!(market.min_notional, 10.0);
        assert!(market.listed);
    }

    #[test]
    fn parse_ticker_falls_back_to_last_when_quotes_missing() {
        let entry = serde_json::json!({
            "lastPrice": "50000.0",
            "quoteVolume": "1000000.0"
        });
        let ticker = BinanceAdapter::parse_ticker(&entry).unwrap();
        assert_eq!(ticker.last, 50000.0);
        assert_eq!(ticker.bid, 50000.0);
        assert_eq!(ticker.ask, 50000.0);
    }

    #[test]
    fn parse_ticker_rejects_missing_last_price() {
        let entry = serde_json::json!({"quoteVolume": "1000.0"});
        assert!(BinanceAdapter::parse_ticker(&entry).is_none());
    }
}
