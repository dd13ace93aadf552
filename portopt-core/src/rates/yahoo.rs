//! Yahoo Finance quote provider for currency pairs.
//!
//! Queries the v8 chart endpoint for the `{FROM}{TO}=X` ticker and reads
//! `chart.result[0].meta.regularMarketPrice`. Any deviation from that shape is
//! a [`RateError`], which the rate cache turns into its fallback rate.

use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::circuit_breaker::CircuitBreaker;
use super::pair::CurrencyPair;
use super::provider::{RateError, RateProvider};

pub const DEFAULT_CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

/// Upper bound on retries per lookup; larger configured values are clamped.
pub const MAX_RETRIES: u32 = 5;

/// Upper bound on a single backoff sleep.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    meta: Option<ChartMeta>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    regular_market_price: Option<Value>,
}

/// Connection settings for the quote service.
#[derive(Debug, Clone)]
pub struct QuoteServiceConfig {
    pub base_url: String,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for QuoteServiceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CHART_URL.to_string(),
            request_timeout: Duration::from_secs(10),
            max_retries: 2,
            base_delay: Duration::from_millis(500),
        }
    }
}

pub struct YahooRateProvider {
    client: reqwest::blocking::Client,
    base_url: String,
    circuit_breaker: Arc<CircuitBreaker>,
    max_retries: u32,
    base_delay: Duration,
}

impl YahooRateProvider {
    pub fn new(
        config: QuoteServiceConfig,
        circuit_breaker: Arc<CircuitBreaker>,
    ) -> Result<Self, RateError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.request_timeout)
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| RateError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            circuit_breaker,
            max_retries: config.max_retries.min(MAX_RETRIES),
            base_delay: config.base_delay,
        })
    }

    fn quote_url(&self, pair: &CurrencyPair) -> String {
        format!("{}/{}?interval=1d&range=1d", self.base_url, pair.ticker())
    }

    /// Extract the market price from a chart response body.
    pub fn parse_quote(pair: &CurrencyPair, body: &str) -> Result<f64, RateError> {
        let resp: ChartResponse = serde_json::from_str(body).map_err(|e| {
            RateError::ResponseFormatChanged(format!("unparseable chart response for {pair}: {e}"))
        })?;

        let results = resp.chart.result.ok_or_else(|| match resp.chart.error {
            Some(err) => {
                RateError::ResponseFormatChanged(format!("{}: {}", err.code, err.description))
            }
            None => RateError::ResponseFormatChanged("empty result with no error".into()),
        })?;

        let price = results
            .into_iter()
            .next()
            .ok_or_else(|| RateError::ResponseFormatChanged("result array is empty".into()))?
            .meta
            .and_then(|m| m.regular_market_price)
            .ok_or_else(|| RateError::ResponseFormatChanged("no regularMarketPrice".into()))?;

        let rate = price.as_f64().ok_or_else(|| {
            RateError::ResponseFormatChanged(format!("regularMarketPrice is not a number: {price}"))
        })?;

        if rate > 0.0 && rate.is_finite() {
            Ok(rate)
        } else {
            Err(RateError::NonPositiveRate {
                pair: pair.to_string(),
                rate,
            })
        }
    }

    fn fetch_with_retry(&self, pair: &CurrencyPair) -> Result<f64, RateError> {
        let url = self.quote_url(pair);
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                std::thread::sleep(backoff_delay(self.base_delay, attempt));
            }

            if !self.circuit_breaker.is_allowed() {
                return Err(RateError::CircuitBreakerTripped);
            }

            debug!(%pair, attempt, "requesting quote");
            match self.client.get(&url).send() {
                Ok(resp) => {
                    let status = resp.status();

                    if status == reqwest::StatusCode::FORBIDDEN {
                        self.circuit_breaker.trip();
                        return Err(RateError::CircuitBreakerTripped);
                    }

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        self.circuit_breaker.record_failure();
                        let retry_after = resp
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<u64>().ok())
                            .unwrap_or(60);
                        last_error = Some(RateError::RateLimited {
                            retry_after_secs: retry_after,
                        });
                        continue;
                    }

                    if status.is_server_error() {
                        self.circuit_breaker.record_failure();
                        last_error = Some(RateError::Other(format!("HTTP {status} for {pair}")));
                        continue;
                    }

                    if !status.is_success() {
                        return Err(RateError::Other(format!("HTTP {status} for {pair}")));
                    }

                    let body = resp
                        .text()
                        .map_err(|e| RateError::NetworkUnreachable(e.to_string()))?;
                    let rate = Self::parse_quote(pair, &body)?;
                    self.circuit_breaker.record_success();
                    return Ok(rate);
                }
                Err(e) => {
                    if e.is_connect() || e.is_timeout() {
                        last_error = Some(RateError::NetworkUnreachable(e.to_string()));
                        continue;
                    }
                    return Err(RateError::NetworkUnreachable(e.to_string()));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| RateError::Other("max retries exceeded".into())))
    }
}

impl RateProvider for YahooRateProvider {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn fetch_rate(&self, pair: &CurrencyPair) -> Result<f64, RateError> {
        self.fetch_with_retry(pair)
    }

    fn is_available(&self) -> bool {
        self.circuit_breaker.is_allowed()
    }
}

/// Exponential backoff before retry `attempt` (1-based), capped at [`MAX_BACKOFF`].
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32
        .checked_pow(attempt.saturating_sub(1))
        .unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(MAX_BACKOFF)
}
