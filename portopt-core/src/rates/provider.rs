//! Rate provider trait and structured error types.
//!
//! The RateProvider trait abstracts over quote sources so the cache can be
//! exercised against a stub in tests and the live service in production.

use thiserror::Error;

use super::pair::CurrencyPair;

/// Failure of a single live rate lookup.
///
/// Never reaches callers of the rate cache: every variant is absorbed by the
/// fallback path.
#[derive(Debug, Error)]
pub enum RateError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by quote service (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("quote service returned a non-positive rate {rate} for {pair}")]
    NonPositiveRate { pair: String, rate: f64 },

    #[error("quote service blocked (circuit breaker tripped)")]
    CircuitBreakerTripped,

    #[error("rate lookup failed: {0}")]
    Other(String),
}

/// Source of live exchange rates.
pub trait RateProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch the current rate for `pair` (units of `to` per one `from`).
    fn fetch_rate(&self, pair: &CurrencyPair) -> Result<f64, RateError>;

    /// Whether the provider is currently accepting requests.
    fn is_available(&self) -> bool {
        true
    }
}
