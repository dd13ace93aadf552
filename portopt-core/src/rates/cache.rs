//! Time-bounded exchange-rate cache.
//!
//! An entry is valid only while `now - fetched_at < ttl`. Stale or absent
//! entries force a live lookup; a failed lookup degrades to the pair's
//! fallback rate and is never cached. Entries are replaced wholesale.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use super::pair::CurrencyPair;
use super::provider::RateError;
use crate::clock::{Clock, SystemClock};

/// Validity window of a cached rate.
pub const RATE_TTL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CachedRate {
    pub rate: f64,
    pub fetched_at: Instant,
    pub fetched_wall: DateTime<Utc>,
}

/// Where a returned rate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateSource {
    Live,
    Cache,
    Fallback,
}

/// A rate as handed to callers, with provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateQuote {
    pub from: String,
    pub to: String,
    pub rate: f64,
    pub source: RateSource,
    pub as_of: DateTime<Utc>,
}

impl RateQuote {
    fn new(pair: &CurrencyPair, rate: f64, source: RateSource, as_of: DateTime<Utc>) -> Self {
        Self {
            from: pair.from.clone(),
            to: pair.to.clone(),
            rate,
            source,
            as_of,
        }
    }

    /// `true` unless the rate is the hard-coded fallback.
    pub fn is_live_or_cached(&self) -> bool {
        self.source != RateSource::Fallback
    }
}

pub struct RateCache<C: Clock = SystemClock> {
    entries: DashMap<CurrencyPair, CachedRate>,
    ttl: Duration,
    clock: C,
}

impl RateCache<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(RATE_TTL, SystemClock)
    }
}

impl Default for RateCache<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> RateCache<C> {
    pub fn with_clock(ttl: Duration, clock: C) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The cached entry for `pair`, if still within the TTL.
    pub fn get_entry(&self, pair: &CurrencyPair) -> Option<CachedRate> {
        let now = self.clock.now();
        let entry = *self.entries.get(pair)?;
        if now.saturating_duration_since(entry.fetched_at) < self.ttl {
            Some(entry)
        } else {
            None
        }
    }

    pub fn get(&self, pair: &CurrencyPair) -> Option<f64> {
        self.get_entry(pair).map(|e| e.rate)
    }

    /// Store `rate` stamped with the current time, replacing any prior entry.
    ///
    /// Expired entries for other pairs are swept first, so the map holds at
    /// most the pairs looked up within one TTL window.
    pub fn put(&self, pair: &CurrencyPair, rate: f64) {
        self.purge_expired();
        self.entries.insert(
            pair.clone(),
            CachedRate {
                rate,
                fetched_at: self.clock.now(),
                fetched_wall: Utc::now(),
            },
        );
    }

    /// Drop every entry past its TTL. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.fetched_at) < self.ttl);
        before.saturating_sub(self.entries.len())
    }

    pub fn invalidate(&self, pair: &CurrencyPair) {
        self.entries.remove(pair);
    }

    /// Number of stored entries, stale ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cached rate if valid, else `fetch`; on fetch failure the fallback rate.
    ///
    /// Never fails. Only a usable live rate (finite, > 0) is cached.
    pub fn get_or_fetch<F>(&self, pair: &CurrencyPair, fetch: F) -> RateQuote
    where
        F: FnOnce(&CurrencyPair) -> Result<f64, RateError>,
    {
        if let Some(entry) = self.get_entry(pair) {
            info!(%pair, rate = entry.rate, "exchange rate served from cache");
            return RateQuote::new(pair, entry.rate, RateSource::Cache, entry.fetched_wall);
        }

        let fetched = fetch(pair).and_then(|rate| {
            if rate > 0.0 && rate.is_finite() {
                Ok(rate)
            } else {
                Err(RateError::NonPositiveRate {
                    pair: pair.to_string(),
                    rate,
                })
            }
        });

        match fetched {
            Ok(rate) => {
                self.put(pair, rate);
                info!(%pair, rate, "exchange rate fetched");
                RateQuote::new(pair, rate, RateSource::Live, Utc::now())
            }
            Err(e) => {
                let rate = pair.fallback_rate();
                warn!(%pair, error = %e, fallback = rate, "exchange rate lookup failed; using fallback");
                RateQuote::new(pair, rate, RateSource::Fallback, Utc::now())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn usd_krw() -> CurrencyPair {
        "USD_KRW".parse().unwrap()
    }

    fn manual_cache() -> (RateCache<Arc<ManualClock>>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (RateCache::with_clock(RATE_TTL, Arc::clone(&clock)), clock)
    }

    #[test]
    fn put_then_get_hits() {
        let (cache, _) = manual_cache();
        cache.put(&usd_krw(), 1456.0);
        assert_eq!(cache.get(&usd_krw()), Some(1456.0));
    }

    #[test]
    fn entry_expires_after_ttl() {
        let (cache, clock) = manual_cache();
        cache.put(&usd_krw(), 1456.0);
        clock.advance(RATE_TTL - Duration::from_secs(1));
        assert_eq!(cache.get(&usd_krw()), Some(1456.0));
        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get(&usd_krw()), None);
    }

    #[test]
    fn put_replaces_and_restarts_ttl() {
        let (cache, clock) = manual_cache();
        cache.put(&usd_krw(), 1400.0);
        clock.advance(Duration::from_secs(9 * 60));
        cache.put(&usd_krw(), 1410.0);
        clock.advance(Duration::from_secs(2 * 60));
        assert_eq!(cache.get(&usd_krw()), Some(1410.0));
    }

    #[test]
    fn put_sweeps_expired_pairs() {
        let (cache, clock) = manual_cache();
        for code in ["EUR", "JPY", "GBP"] {
            cache.put(&CurrencyPair::new("USD", code), 1.5);
        }
        assert_eq!(cache.len(), 3);

        clock.advance(RATE_TTL);
        cache.put(&usd_krw(), 1456.0);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&usd_krw()), Some(1456.0));
        assert_eq!(cache.purge_expired(), 0);

        clock.advance(RATE_TTL);
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn get_or_fetch_uses_cache_within_ttl() {
        let (cache, _) = manual_cache();
        let calls = AtomicUsize::new(0);
        let fetch = |_: &CurrencyPair| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(1390.0)
        };
        let first = cache.get_or_fetch(&usd_krw(), fetch);
        let second = cache.get_or_fetch(&usd_krw(), |_| Ok(9999.0));
        assert_eq!(first.source, RateSource::Live);
        assert_eq!(second.source, RateSource::Cache);
        assert_eq!(second.rate, 1390.0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn get_or_fetch_refreshes_after_expiry() {
        let (cache, clock) = manual_cache();
        cache.put(&usd_krw(), 1300.0);
        clock.advance(RATE_TTL);
        let quote = cache.get_or_fetch(&usd_krw(), |_| Ok(1350.0));
        assert_eq!(quote.source, RateSource::Live);
        assert_eq!(cache.get(&usd_krw()), Some(1350.0));
    }

    #[test]
    fn fetch_failure_degrades_to_fallback_and_is_not_cached() {
        let (cache, _) = manual_cache();
        let quote = cache.get_or_fetch(&usd_krw(), |_| {
            Err(RateError::ResponseFormatChanged("no meta".into()))
        });
        assert_eq!(quote.rate, 1456.0);
        assert_eq!(quote.source, RateSource::Fallback);
        assert!(!quote.is_live_or_cached());
        assert!(cache.is_empty());
    }

    #[test]
    fn unusable_live_value_degrades_to_fallback() {
        let (cache, _) = manual_cache();
        let eur_jpy = CurrencyPair::new("EUR", "JPY");
        let quote = cache.get_or_fetch(&eur_jpy, |_| Ok(f64::NAN));
        assert_eq!(quote.rate, 1.0);
        assert_eq!(quote.source, RateSource::Fallback);
        assert_eq!(cache.get(&eur_jpy), None);
    }

    #[test]
    fn concurrent_writers_do_not_lose_pairs() {
        let cache = Arc::new(RateCache::new());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    let pair = CurrencyPair::new(&format!("C{i:02}"), "KRW");
                    for n in 0..100 {
                        cache.put(&pair, f64::from(n + 1));
                        assert!(cache.get(&pair).is_some());
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cache.len(), 16);
        assert_eq!(cache.get(&CurrencyPair::new("C07", "KRW")), Some(100.0));
    }
}
