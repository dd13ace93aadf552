use std::sync::Arc;

use tracing::debug;

use super::cache::{RateCache, RateQuote};
use super::pair::CurrencyPair;
use super::provider::{RateError, RateProvider};
use crate::clock::{Clock, SystemClock};

/// Exchange-rate lookup: TTL cache in front of a live provider.
///
/// `rate` never fails; see [`RateCache::get_or_fetch`].
pub struct ExchangeRates<C: Clock = SystemClock> {
    cache: RateCache<C>,
    provider: Arc<dyn RateProvider>,
}

impl ExchangeRates<SystemClock> {
    pub fn new(provider: Arc<dyn RateProvider>) -> Self {
        Self::with_cache(RateCache::new(), provider)
    }
}

impl<C: Clock> ExchangeRates<C> {
    pub fn with_cache(cache: RateCache<C>, provider: Arc<dyn RateProvider>) -> Self {
        Self { cache, provider }
    }

    pub fn cache(&self) -> &RateCache<C> {
        &self.cache
    }

    pub fn quote(&self, pair: &CurrencyPair) -> RateQuote {
        self.cache.get_or_fetch(pair, |p| {
            if !self.provider.is_available() {
                return Err(RateError::CircuitBreakerTripped);
            }
            debug!(provider = self.provider.name(), %p, "live rate lookup");
            self.provider.fetch_rate(p)
        })
    }

    pub fn rate(&self, from: &str, to: &str) -> RateQuote {
        self.quote(&CurrencyPair::new(from, to))
    }

    pub fn usd_krw(&self) -> RateQuote {
        self.quote(&CurrencyPair::usd_krw())
    }
}
