//! Portopt Core: domain types and exchange rates.
//!
//! This crate holds everything that does not touch the external optimizer:
//! - Holdings, optimization requests and results (the JSON wire shapes)
//! - Request shaping and defaulting
//! - Exchange-rate lookup with a 10-minute TTL cache and fixed fallbacks
//! - A pluggable clock so TTL behaviour is testable

pub mod clock;
pub mod domain;
pub mod rates;
