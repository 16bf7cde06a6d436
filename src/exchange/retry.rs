// =============================================================================
// Retry / backoff — jittered exponential backoff over a classified error
// =============================================================================
//
// Classifies a raised `anyhow::Error` into the error taxonomy and retries
// the classes that are actually transient with a jittered exponential
// backoff sleep loop.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::error::ScannerError;

#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub base: Duration,
    pub cap: Duration,
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            cap: Duration::from_secs(10),
            max_attempts: 5,
        }
    }
}

/// Exponential backoff for attempt `n` (0-indexed), capped, multiplied by a
/// uniform jitter in `[0.5, 1.5]`.
fn backoff_delay(cfg: &RetryConfig, attempt: u32) -> Duration {
    let exp = cfg.base.as_secs_f64() * 2f64.powi(attempt as i32);
    let capped = exp.min(cfg.cap.as_secs_f64());
    let jitter = rand::thread_rng().gen_range(0.5..=1.5);
    Duration::from_secs_f64(capped * jitter)
}

/// Classify an `anyhow::Error` surfaced from an exchange call into the
/// error taxonomy. Inspects the formatted message for markers such as
/// HTTP status codes and "rate limit".
pub fn classify(err: &anyhow::Error) -> ScannerError {
    let msg = format!("{err:#}");
    let lower = msg.to_lowercase();
    if lower.contains("429") || lower.contains("rate limit") {
        ScannerError::ExchangeRateLimit(msg)
    } else if lower.contains("timed out")
        || lower.contains("timeout")
        || lower.contains("connection")
        || lower.contains("request failed")
        || lower.contains("502")
        || lower.contains("503")
        || lower.contains("504")
    {
        ScannerError::ExchangeTransient(msg)
    } else {
        ScannerError::ExchangeFatal(msg)
    }
}

/// Run `op` under the retry policy: retries `ExchangeRateLimit` and
/// `ExchangeTransient` failures with jittered exponential backoff up to
/// `cfg.max_attempts`; any other classification (or exhausted budget)
/// surfaces immediately.
pub async fn with_retry<T, F, Fut>(cfg: &RetryConfig, mut op: F) -> Result<T, ScannerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                let classified = classify(&e);
                if !classified.is_retryable() || attempt + 1 >= cfg.max_attempts {
                    warn!(attempt, error = %classified, "exchange call failed, giving up");
                    return Err(classified);
                }
                let delay = backoff_delay(cfg, attempt);
                debug!(attempt, delay_ms = delay.as_millis() as u64, error = %classified, "retrying exchange call");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_rate_limit() {
        let err = anyhow::anyhow!("Binance GET returned 429 Too Many Requests: {{}}");
        assert!(matches!(classify(&err), ScannerError::ExchangeRateLimit(_)));
    }

    #[test]
    fn classifies_transient_timeout() {
        let err = anyhow::anyhow!("GET /api/v3/klines request failed: operation timed out");
        assert!(matches!(classify(&err), ScannerError::ExchangeTransient(_)));
    }

    #[test]
    fn classifies_fatal_by_default() {
        let err = anyhow::anyhow!("Binance GET returned 401 Unauthorized: bad signature");
        assert!(matches!(classify(&err), ScannerError::ExchangeFatal(_)));
    }

    #[test]
    fn backoff_is_capped() {
        let cfg = RetryConfig::default();
        let delay = backoff_delay(&cfg, 20);
        assert!(delay.as_secs_f64() <= cfg.cap.as_secs_f64() * 1.5 + 0.001);
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let cfg = RetryConfig {
            base: Duration::from_millis(1),
            cap: Duration::from_millis(5),
            max_attempts: 5,
        };
        let mut calls = 0;
        let result = with_retry(&cfg, || {
            calls += 1;
            let call = calls;
            async move {
                if call < 3 {
                    Err(anyhow::anyhow!("request failed: timeout"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn non_retryable_fails_immediately() {
        let cfg = RetryConfig::default();
        let mut calls = 0;
        let result: Result<i32, ScannerError> = with_retry(&cfg, || {
            calls += 1;
            async { Err(anyhow::anyhow!("Binance GET returned 404: not found")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn exhausts_attempt_budget() {
        let cfg = RetryConfig {
            base: Duration::from_millis(1),
            cap: Duration::from_millis(2),
            max_attempts: 3,
        };
        let mut calls = 0;
        let result: Result<i32, ScannerError> = with_retry(&cfg, || {
            calls += 1;
            async { Err(anyhow::anyhow!("request failed: timeout")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 3);
    }
}
