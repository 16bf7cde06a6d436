// =============================================================================
// Error taxonomy for the scanner and trade-plan factory
// =============================================================================
//
// Kinds, not names: each variant maps to one of the error kinds a careful
// reader of the pipeline cares about, not to a specific call site. Library
// code returns `Result<T, ScannerError>`; command handlers in main.rs collect
// these into `anyhow::Result` with `.context(...)`, same layering the bot
// uses between its internal modules and `main.rs`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScannerError {
    #[error("config error: {0}")]
    Config(String),

    #[error("exchange rate limited: {0}")]
    ExchangeRateLimit(String),

    #[error("exchange transient failure: {0}")]
    ExchangeTransient(String),

    #[error("exchange fatal error: {0}")]
    ExchangeFatal(String),

    #[error("malformed data shape: {0}")]
    DataShape(String),

    #[error("invalid setup: {0}")]
    InvalidSetup(String),

    #[error("order placement failed after retries: {0}")]
    ExecutorFailure(String),
}

impl ScannerError {
    /// Whether the retry loop should attempt this call again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ExchangeRateLimit(_) | Self::ExchangeTransient(_)
        )
    }
}
