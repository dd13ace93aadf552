//! Upstream operations: gateway, holdings store and exchange rates together.

use std::sync::Arc;
use tracing::{info, info_span};

use portopt_core::clock::{Clock, SystemClock};
use portopt_core::domain::request::PRICE_PERIOD;
use portopt_core::domain::{
    resolve_method, Holding, HoldingInput, MarketData, OptimizationRequest, OptimizationResult,
    SessionId,
};
use portopt_core::rates::{
    CircuitBreaker, ExchangeRates, RateCache, RateProvider, RateQuote, YahooRateProvider,
};

use crate::config::{AppConfig, ConfigError};
use crate::error::OrchestrationError;
use crate::gateway::Gateway;
use crate::invoker::CancelFlag;
use crate::store::{FileHoldingsStore, HoldingsStore, InMemoryHoldingsStore};

/// Outcome of [`Orchestrator::optimize_in_session`].
#[derive(Debug, Clone)]
pub struct OptimizationRun {
    pub session: SessionId,
    pub holdings: Vec<Holding>,
    pub result: OptimizationResult,
}

pub struct Orchestrator<C: Clock = SystemClock> {
    gateway: Gateway,
    store: Arc<dyn HoldingsStore>,
    rates: ExchangeRates<C>,
}

impl Orchestrator<SystemClock> {
    /// Wire up the live gateway, the configured store and the quote service.
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let store: Arc<dyn HoldingsStore> = if config.store.in_memory {
            Arc::new(InMemoryHoldingsStore::new())
        } else {
            Arc::new(FileHoldingsStore::new(&config.store.path))
        };

        let provider = YahooRateProvider::new(
            config.rates.quote_service(),
            Arc::new(CircuitBreaker::quote_service()),
        )
        .map_err(|e| ConfigError::Invalid(format!("quote service: {e}")))?;
        let rates = ExchangeRates::with_cache(
            RateCache::with_clock(config.rates.ttl(), SystemClock),
            Arc::new(provider) as Arc<dyn RateProvider>,
        );

        Ok(Self::new(Gateway::new(config.gateway.clone()), store, rates))
    }
}

impl<C: Clock> Orchestrator<C> {
    pub fn new(gateway: Gateway, store: Arc<dyn HoldingsStore>, rates: ExchangeRates<C>) -> Self {
        Self {
            gateway,
            store,
            rates,
        }
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Latest market data for `symbol` (period `1d`).
    pub fn fetch_price(&self, symbol: &str) -> Result<MarketData, OrchestrationError> {
        Ok(self.gateway.fetch_market_data(symbol, PRICE_PERIOD)?)
    }

    pub fn save_holdings(
        &self,
        inputs: &[HoldingInput],
        session: &SessionId,
    ) -> Result<Vec<Holding>, OrchestrationError> {
        let shaped: Vec<Holding> = inputs.iter().map(Holding::from_input).collect();
        Ok(self.store.save_all(&shaped, session)?)
    }

    pub fn list_holdings(&self, session: &SessionId) -> Result<Vec<Holding>, OrchestrationError> {
        Ok(self.store.list_by_session(session)?)
    }

    pub fn delete_holdings(&self, session: &SessionId) -> Result<(), OrchestrationError> {
        self.store.delete_by_session(session)?;
        Ok(())
    }

    /// Persist the request's holdings under a fresh session, then optimize.
    pub fn optimize(
        &self,
        request: &OptimizationRequest,
        method: Option<&str>,
    ) -> Result<OptimizationResult, OrchestrationError> {
        self.optimize_in_session(request, method, None)
            .map(|run| run.result)
    }

    /// [`Orchestrator::optimize`], also returning the session and the stored
    /// holdings, with optional cancellation.
    ///
    /// The holdings stay persisted when the computation fails.
    pub fn optimize_in_session(
        &self,
        request: &OptimizationRequest,
        method: Option<&str>,
        cancel: Option<CancelFlag>,
    ) -> Result<OptimizationRun, OrchestrationError> {
        let session = SessionId::generate();
        let method = resolve_method(method);
        let _span =
            info_span!("orchestrate_optimize", session = %session, method = %method).entered();

        info!(stocks = request.stocks.len(), "starting portfolio optimization");
        let holdings = self.save_holdings(&request.stocks, &session)?;

        let result = self.gateway.optimize_portfolio_with_cancel(
            request,
            &session,
            Some(&method),
            cancel,
        )?;

        info!("portfolio optimization completed");
        Ok(OptimizationRun {
            session,
            holdings,
            result,
        })
    }

    /// Never fails; degrades to the fallback rate.
    pub fn exchange_rate(&self, from: &str, to: &str) -> RateQuote {
        self.rates.rate(from, to)
    }
}
