//! Exchange rates: live quote provider, circuit breaker, and TTL cache.

pub mod cache;
pub mod circuit_breaker;
pub mod pair;
pub mod provider;
pub mod service;
pub mod yahoo;

pub use cache::{CachedRate, RateCache, RateQuote, RateSource, RATE_TTL};
pub use circuit_breaker::CircuitBreaker;
pub use pair::CurrencyPair;
pub use provider::{RateError, RateProvider};
pub use service::ExchangeRates;
pub use yahoo::{QuoteServiceConfig, YahooRateProvider, MAX_RETRIES};
