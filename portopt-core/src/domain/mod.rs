//! Domain types: holdings, optimization requests and results, session ids.

pub mod holding;
pub mod ids;
pub mod request;
pub mod result;

pub use holding::{Holding, HoldingInput, Market, DEFAULT_RISK_LEVEL};
pub use ids::{HoldingId, SessionId};
pub use request::{
    resolve_method, MarketDataRequest, OptimizationPayload, OptimizationRequest, SCHEMA_VERSION,
};
pub use result::{MarketData, OptimizationResult};
