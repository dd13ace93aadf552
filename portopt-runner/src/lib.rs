//! Portopt Runner: the out-of-process computation boundary.
//!
//! This crate builds on `portopt-core` to provide:
//! - Request artifacts handed to the external scripts through files
//! - Process invocation with concurrent output draining, deadline and cancel
//! - Classification of process results into typed values or failures
//! - The `FetchMarketData` / `OptimizePortfolio` gateway
//! - Session-scoped holdings stores (in-memory and JSON file)
//! - TOML configuration and the upstream orchestrator

pub mod config;
pub mod decoder;
pub mod error;
pub mod exchange;
pub mod gateway;
pub mod invoker;
pub mod orchestrator;
pub mod store;

pub use config::{AppConfig, ConfigError, GatewayConfig, LoggingConfig, RatesConfig, StoreConfig};
pub use decoder::decode;
pub use error::{GatewayError, OrchestrationError, StoreError};
pub use exchange::{Artifact, ArtifactExchange};
pub use gateway::Gateway;
pub use invoker::{CancelFlag, InvokeOptions, ProcessInvoker, ProcessOutput, SystemInvoker};
pub use orchestrator::{OptimizationRun, Orchestrator};
pub use store::{FileHoldingsStore, HoldingsStore, InMemoryHoldingsStore};
